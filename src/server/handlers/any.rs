//! Commands valid in any state: CAPABILITY, NOOP, LOGOUT, ID.
//!
//! NOOP has no handler of its own; its entire effect is the session update
//! flush every command gets at emission time.

use log::info;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    backend::{Directory, Storage},
    server::{
        command::{PostAction, QueuedCommand},
        connection::Connection,
    },
    types::{
        core::{IString, NString},
        response::{Data, Response, Status},
        state::ConnectionState,
    },
};

impl<S, B> Connection<S, B>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    B: Storage + Directory,
{
    pub(crate) fn capability(&mut self, cmd: &mut QueuedCommand) {
        cmd.responses
            .push(Response::Data(Data::Capability(self.capabilities())));
        cmd.ok(None);
    }

    pub(crate) fn logout(&mut self, cmd: &mut QueuedCommand) {
        // Safety: the text is valid response text.
        let bye = Status::bye(None, "logging out").unwrap();
        cmd.responses.push(Response::Status(bye));
        cmd.ok(None);
        cmd.action = Some(PostAction::Logout);

        self.session = None;
        self.state = ConnectionState::Logout;
    }

    /// ID (RFC 2971). The client parameters are logged, ours are returned.
    pub(crate) fn id(
        &mut self,
        cmd: &mut QueuedCommand,
        parameters: Option<Vec<(IString, NString)>>,
    ) {
        if let Some(parameters) = parameters {
            for (key, value) in &parameters {
                info!(
                    "client ID: {} = {}",
                    String::from_utf8_lossy(key.as_bytes()),
                    value
                        .as_bytes()
                        .map(String::from_utf8_lossy)
                        .unwrap_or_else(|| "NIL".into()),
                );
            }
        }

        // Safety: the literals are valid quoted strings.
        let server_id = vec![
            (
                IString::try_from("name").unwrap(),
                NString::try_from("imapd").unwrap(),
            ),
            (
                IString::try_from("version").unwrap(),
                NString::try_from(env!("CARGO_PKG_VERSION")).unwrap(),
            ),
        ];

        cmd.responses.push(Response::Data(Data::Id {
            parameters: Some(server_id),
        }));
        cmd.ok(None);
    }
}
