//! The command registry and the per-connection command queue entry.
//!
//! Every command name maps to a [`CommandSpec`] giving the states in which it
//! is legal and its concurrency group. Group 0 commands run alone; commands
//! with the same nonzero group may run concurrently with each other on one
//! connection.

use crate::types::{
    command::Command,
    core::Tag,
    response::{Response, Status},
    state::ConnectionState,
};

/// Which states a command is legal in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ValidIn {
    Any,
    NotAuthenticated,
    AuthenticatedOrSelected,
    Selected,
}

impl ValidIn {
    pub fn allows(self, state: ConnectionState) -> bool {
        match self {
            Self::Any => state != ConnectionState::Logout,
            Self::NotAuthenticated => state == ConnectionState::NotAuthenticated,
            Self::AuthenticatedOrSelected => matches!(
                state,
                ConnectionState::Authenticated | ConnectionState::Selected
            ),
            Self::Selected => state == ConnectionState::Selected,
        }
    }
}

/// Static per-command metadata.
#[derive(Debug)]
pub(crate) struct CommandSpec {
    pub name: &'static str,
    pub valid_in: ValidIn,
    /// 0 = runs alone. 1 = read-only selected commands. 2 = mutating
    /// selected commands.
    pub group: u8,
}

macro_rules! spec {
    ($name:literal, $valid_in:ident, $group:literal) => {
        CommandSpec {
            name: $name,
            valid_in: ValidIn::$valid_in,
            group: $group,
        }
    };
}

static COMMANDS: &[CommandSpec] = &[
    spec!("CAPABILITY", Any, 0),
    spec!("NOOP", Any, 0),
    spec!("LOGOUT", Any, 0),
    spec!("ID", Any, 0),
    spec!("STARTTLS", NotAuthenticated, 0),
    spec!("AUTHENTICATE", NotAuthenticated, 0),
    spec!("LOGIN", NotAuthenticated, 0),
    spec!("SELECT", AuthenticatedOrSelected, 0),
    spec!("EXAMINE", AuthenticatedOrSelected, 0),
    spec!("CREATE", AuthenticatedOrSelected, 0),
    spec!("DELETE", AuthenticatedOrSelected, 0),
    spec!("RENAME", AuthenticatedOrSelected, 0),
    spec!("SUBSCRIBE", AuthenticatedOrSelected, 0),
    spec!("UNSUBSCRIBE", AuthenticatedOrSelected, 0),
    spec!("LIST", AuthenticatedOrSelected, 0),
    spec!("LSUB", AuthenticatedOrSelected, 0),
    spec!("STATUS", AuthenticatedOrSelected, 0),
    spec!("APPEND", AuthenticatedOrSelected, 0),
    spec!("NAMESPACE", AuthenticatedOrSelected, 0),
    spec!("GETACL", AuthenticatedOrSelected, 0),
    spec!("SETACL", AuthenticatedOrSelected, 0),
    spec!("CHECK", Selected, 1),
    spec!("SEARCH", Selected, 1),
    spec!("FETCH", Selected, 1),
    spec!("UID SEARCH", Selected, 1),
    spec!("UID FETCH", Selected, 1),
    spec!("IDLE", Selected, 1),
    spec!("CLOSE", Selected, 2),
    spec!("UNSELECT", Selected, 2),
    spec!("EXPUNGE", Selected, 2),
    spec!("UID EXPUNGE", Selected, 2),
    spec!("STORE", Selected, 2),
    spec!("UID STORE", Selected, 2),
    spec!("COPY", Selected, 2),
    spec!("UID COPY", Selected, 2),
];

/// Looks up a command by its normalized name, e.g. `UID FETCH`.
pub(crate) fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

/// Lifecycle of a queued command.
///
/// Commands progress strictly forward: Unparsed → Blocked → Executing →
/// Finished → Retired, skipping states where possible. They retire in the
/// order they were received.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Progress {
    /// Received, argument parsing deferred (e.g. until an earlier SELECT
    /// finished and made MSN arguments meaningful).
    Unparsed,
    /// Parsed, waiting for the concurrency group to allow execution.
    Blocked,
    /// The handler is running, or the command waits for reserved input
    /// (AUTHENTICATE exchange, IDLE).
    Executing,
    /// Responses are ready but not emitted yet.
    Finished,
    /// Responses emitted; the command can be dropped from the queue.
    Retired,
}

/// Follow-up work the connection performs after a command's responses went
/// out.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum PostAction {
    /// Replace the byte stream with a TLS stream.
    StartTls,
    /// Close the connection.
    Logout,
}

/// A command in the per-connection queue.
#[derive(Debug)]
pub(crate) struct QueuedCommand {
    pub id: u64,
    /// The complete command byte image (line fragments and literals).
    pub raw: Vec<u8>,
    pub tag: Tag,
    pub spec: &'static CommandSpec,
    pub parsed: Option<Command>,
    pub progress: Progress,
    /// Untagged responses to emit before the completion.
    pub responses: Vec<Response>,
    /// The tagged completion result.
    pub completion: Option<Status>,
    pub action: Option<PostAction>,
}

impl QueuedCommand {
    pub fn new(id: u64, raw: Vec<u8>, tag: Tag, spec: &'static CommandSpec) -> Self {
        Self {
            id,
            raw,
            tag,
            spec,
            parsed: None,
            progress: Progress::Unparsed,
            responses: Vec::new(),
            completion: None,
            action: None,
        }
    }

    /// Finishes the command with a tagged OK whose text is the command name.
    pub fn ok(&mut self, code: Option<crate::types::response::Code>) {
        // Safety: command names are valid response text.
        self.completion = Some(Status::ok(Some(self.tag.clone()), code, self.spec.name).unwrap());
        self.progress = Progress::Finished;
    }

    /// Finishes the command with a tagged NO.
    pub fn no(&mut self, code: Option<crate::types::response::Code>, text: &str) {
        self.completion = Some(
            Status::no(Some(self.tag.clone()), code, text)
                .unwrap_or_else(|_| Status::no(Some(self.tag.clone()), None, "failed").unwrap()),
        );
        self.progress = Progress::Finished;
    }

    /// Finishes the command with a tagged BAD.
    pub fn bad(&mut self, text: &str) {
        self.completion = Some(
            Status::bad(Some(self.tag.clone()), None, text)
                .unwrap_or_else(|_| Status::bad(Some(self.tag.clone()), None, "invalid").unwrap()),
        );
        self.progress = Progress::Finished;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("noop").unwrap().name, "NOOP");
        assert_eq!(lookup("UID FETCH").unwrap().group, 1);
        assert_eq!(lookup("uid store").unwrap().group, 2);
        assert!(lookup("XFROBNICATE").is_none());
    }

    #[test]
    fn test_validity_mask() {
        let select = lookup("SELECT").unwrap();
        assert!(select.valid_in.allows(ConnectionState::Authenticated));
        assert!(select.valid_in.allows(ConnectionState::Selected));
        assert!(!select.valid_in.allows(ConnectionState::NotAuthenticated));

        let fetch = lookup("FETCH").unwrap();
        assert!(!fetch.valid_in.allows(ConnectionState::Authenticated));
        assert!(fetch.valid_in.allows(ConnectionState::Selected));

        let login = lookup("LOGIN").unwrap();
        assert!(!login.valid_in.allows(ConnectionState::Selected));
    }

    #[test]
    fn test_group_zero_for_state_changing_commands() {
        for name in ["LOGIN", "AUTHENTICATE", "STARTTLS", "SELECT", "APPEND"] {
            assert_eq!(lookup(name).unwrap().group, 0, "{name}");
        }

        for name in ["FETCH", "SEARCH", "STORE", "COPY", "EXPUNGE"] {
            assert_ne!(lookup(name).unwrap().group, 0, "{name}");
        }
    }
}
