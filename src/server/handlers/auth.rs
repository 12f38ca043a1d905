//! Commands valid once authenticated: mailbox management, LIST, STATUS,
//! APPEND, NAMESPACE, ACL.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    backend::{BackendError, Directory, Storage, User},
    server::{
        command::QueuedCommand,
        connection::Connection,
        handlers::backend_error_text,
        session::Session,
    },
    types::{
        acl::Right,
        command::AclModification,
        core::{AString, IString, Literal, QuotedChar},
        datetime::DateTime,
        flag::{Flag, FlagNameAttribute, FlagPerm},
        mailbox::{ListMailbox, Mailbox, MailboxOther},
        response::{Code, Data, Response, Status},
        state::ConnectionState,
        status::StatusDataItemName,
    },
};

impl<S, B> Connection<S, B>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    B: Storage + Directory,
{
    /// The authenticated user, or `None` with the command already failed.
    pub(crate) fn require_user(&mut self, cmd: &mut QueuedCommand) -> Option<User> {
        match self.user.clone() {
            Some(user) => Some(user),
            None => {
                cmd.bad("Not permitted in this state");
                None
            }
        }
    }

    /// Checks one right on a mailbox; fails the command when missing.
    pub(crate) async fn require_right(
        &mut self,
        cmd: &mut QueuedCommand,
        user: &User,
        mailbox: &str,
        right: Right,
    ) -> bool {
        match self.engine.backend.permissions(user, mailbox).await {
            Ok(rights) if rights.contains(right) => true,
            Ok(_) => {
                cmd.no(None, "Permission denied");
                false
            }
            Err(error) => {
                cmd.no(None, backend_error_text(&error));
                false
            }
        }
    }

    pub(crate) async fn select(
        &mut self,
        cmd: &mut QueuedCommand,
        mailbox: Mailbox,
        read_only: bool,
    ) {
        let Some(user) = self.require_user(cmd) else {
            return;
        };

        // Selecting drops the previous session first; its buffered EXPUNGE
        // output is discarded, and a failed SELECT leaves nothing selected.
        self.session = None;
        if self.state == ConnectionState::Selected {
            self.state = ConnectionState::Authenticated;
        }

        let name = mailbox.name();

        let permissions = match self.engine.backend.permissions(&user, name).await {
            Ok(permissions) => permissions,
            Err(error) => {
                cmd.no(None, backend_error_text(&error));
                return;
            }
        };

        if !permissions.contains(Right::Lookup) || !permissions.contains(Right::Read) {
            cmd.no(None, "Permission denied");
            return;
        }

        let snapshot = match self.engine.backend.select(&user, name, read_only).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                cmd.no(None, backend_error_text(&error));
                return;
            }
        };

        let events = match self.engine.backend.subscribe_events(snapshot.id) {
            Ok(events) => events,
            Err(error) => {
                cmd.no(None, backend_error_text(&error));
                return;
            }
        };

        let session = Session::new(snapshot, read_only, permissions, events);

        cmd.responses
            .push(Response::Data(Data::Exists(session.exists())));
        cmd.responses
            .push(Response::Data(Data::Recent(session.recent.len() as u32)));

        if let Some(first_unseen) = session.first_unseen.and_then(|uid| session.msn_of(uid)) {
            cmd.responses.push(Response::Status(
                // Safety: the texts below are valid response text.
                Status::ok(None, Some(Code::Unseen(first_unseen)), "First unseen").unwrap(),
            ));
        }

        cmd.responses.push(Response::Status(
            Status::ok(
                None,
                Some(Code::UidValidity(session.uid_validity)),
                "UIDs valid",
            )
            .unwrap(),
        ));
        cmd.responses.push(Response::Status(
            Status::ok(
                None,
                Some(Code::UidNext(session.uid_next)),
                "Predicted next UID",
            )
            .unwrap(),
        ));

        let permanent = if session.read_only {
            Vec::new()
        } else {
            let mut permanent: Vec<FlagPerm> = session
                .flags
                .iter()
                .cloned()
                .map(FlagPerm::Flag)
                .collect();
            permanent.push(FlagPerm::Asterisk);
            permanent
        };
        cmd.responses.push(Response::Status(
            Status::ok(
                None,
                Some(Code::PermanentFlags(permanent)),
                "Flags permitted",
            )
            .unwrap(),
        ));

        cmd.responses.push(Response::Status(
            Status::ok(
                None,
                Some(Code::HighestModSeq(session.highest_modseq)),
                "Highest",
            )
            .unwrap(),
        ));

        cmd.responses
            .push(Response::Data(Data::Flags(session.flags.clone())));

        let code = if session.read_only {
            Code::ReadOnly
        } else {
            Code::ReadWrite
        };

        self.session = Some(session);
        self.state = ConnectionState::Selected;
        cmd.ok(Some(code));
    }

    pub(crate) async fn create(&mut self, cmd: &mut QueuedCommand, mailbox: Mailbox) {
        let Some(user) = self.require_user(cmd) else {
            return;
        };

        if mailbox == Mailbox::Inbox {
            cmd.no(None, "INBOX always exists");
            return;
        }

        if !self
            .require_right(cmd, &user, mailbox.name(), Right::CreateMailboxes)
            .await
        {
            return;
        }

        match self
            .engine
            .backend
            .create_mailbox(&user, mailbox.name())
            .await
        {
            Ok(()) => cmd.ok(None),
            Err(error) => cmd.no(None, backend_error_text(&error)),
        }
    }

    pub(crate) async fn delete(&mut self, cmd: &mut QueuedCommand, mailbox: Mailbox) {
        let Some(user) = self.require_user(cmd) else {
            return;
        };

        if mailbox == Mailbox::Inbox {
            cmd.no(None, "INBOX may not be deleted");
            return;
        }

        if !self
            .require_right(cmd, &user, mailbox.name(), Right::DeleteMailbox)
            .await
        {
            return;
        }

        match self
            .engine
            .backend
            .delete_mailbox(&user, mailbox.name())
            .await
        {
            Ok(()) => cmd.ok(None),
            Err(error) => cmd.no(None, backend_error_text(&error)),
        }
    }

    pub(crate) async fn rename(&mut self, cmd: &mut QueuedCommand, from: Mailbox, to: Mailbox) {
        let Some(user) = self.require_user(cmd) else {
            return;
        };

        if !self
            .require_right(cmd, &user, from.name(), Right::DeleteMailbox)
            .await
        {
            return;
        }
        if !self
            .require_right(cmd, &user, to.name(), Right::CreateMailboxes)
            .await
        {
            return;
        }

        match self
            .engine
            .backend
            .rename_mailbox(&user, from.name(), to.name())
            .await
        {
            Ok(()) => cmd.ok(None),
            Err(error) => cmd.no(None, backend_error_text(&error)),
        }
    }

    pub(crate) async fn subscribe(
        &mut self,
        cmd: &mut QueuedCommand,
        mailbox: Mailbox,
        subscribed: bool,
    ) {
        let Some(user) = self.require_user(cmd) else {
            return;
        };

        if !self
            .require_right(cmd, &user, mailbox.name(), Right::Lookup)
            .await
        {
            return;
        }

        match self
            .engine
            .backend
            .subscribe(&user, mailbox.name(), subscribed)
            .await
        {
            Ok(()) => cmd.ok(None),
            Err(error) => cmd.no(None, backend_error_text(&error)),
        }
    }

    pub(crate) async fn list(
        &mut self,
        cmd: &mut QueuedCommand,
        reference: Option<Mailbox>,
        pattern: ListMailbox,
        subscribed_only: bool,
    ) {
        let Some(user) = self.require_user(cmd) else {
            return;
        };

        let Ok(pattern) = pattern.to_pattern() else {
            cmd.bad("Invalid list pattern");
            return;
        };

        let reference = reference
            .map(|mailbox| mailbox.name().to_owned())
            .unwrap_or_default();

        // Safety: '/' is a valid quoted char.
        let delimiter = QuotedChar::try_from('/').unwrap();

        if pattern.is_empty() {
            // An empty pattern asks for the hierarchy delimiter and the root
            // of the reference.
            let root = match reference.split_once('/') {
                Some((root, _)) => format!("{root}/"),
                None => String::new(),
            };

            cmd.responses.push(Response::Data(Data::List {
                items: vec![FlagNameAttribute::Noselect],
                delimiter: Some(delimiter),
                // An empty root is representable on the wire but not as a
                // regular name; build it directly.
                mailbox: Mailbox::Other(MailboxOther(root)),
            }));
            cmd.ok(None);
            return;
        }

        let listing = if subscribed_only {
            self.engine
                .backend
                .list_subscribed(&user, &reference, &pattern)
                .await
        } else {
            self.engine.backend.list(&user, &reference, &pattern).await
        };

        match listing {
            Ok(items) => {
                for item in items {
                    let Ok(mailbox) = Mailbox::try_from(item.name) else {
                        continue;
                    };
                    let Ok(delimiter) = QuotedChar::try_from(item.delimiter) else {
                        continue;
                    };

                    let data = if subscribed_only {
                        Data::Lsub {
                            items: item.attributes,
                            delimiter: Some(delimiter),
                            mailbox,
                        }
                    } else {
                        Data::List {
                            items: item.attributes,
                            delimiter: Some(delimiter),
                            mailbox,
                        }
                    };

                    cmd.responses.push(Response::Data(data));
                }

                cmd.ok(None);
            }
            Err(error) => cmd.no(None, backend_error_text(&error)),
        }
    }

    pub(crate) async fn status(
        &mut self,
        cmd: &mut QueuedCommand,
        mailbox: Mailbox,
        item_names: Vec<StatusDataItemName>,
    ) {
        let Some(user) = self.require_user(cmd) else {
            return;
        };

        if !self
            .require_right(cmd, &user, mailbox.name(), Right::Read)
            .await
        {
            return;
        }

        match self
            .engine
            .backend
            .status(&user, mailbox.name(), &item_names)
            .await
        {
            Ok(items) => {
                cmd.responses
                    .push(Response::Data(Data::Status { mailbox, items }));
                cmd.ok(None);
            }
            Err(error) => cmd.no(None, backend_error_text(&error)),
        }
    }

    pub(crate) async fn append(
        &mut self,
        cmd: &mut QueuedCommand,
        mailbox: Mailbox,
        flags: Vec<Flag>,
        date: Option<DateTime>,
        message: Literal,
    ) {
        let Some(user) = self.require_user(cmd) else {
            return;
        };

        if !self
            .require_right(cmd, &user, mailbox.name(), Right::Insert)
            .await
        {
            return;
        }

        match self
            .engine
            .backend
            .append(&user, mailbox.name(), message.data(), &flags, date)
            .await
        {
            Ok(outcome) => cmd.ok(Some(Code::AppendUid {
                uid_validity: outcome.uid_validity,
                uid: outcome.uid,
            })),
            Err(BackendError::NoSuchMailbox) => {
                cmd.no(Some(Code::TryCreate), "No such mailbox")
            }
            Err(error) => cmd.no(None, backend_error_text(&error)),
        }
    }

    /// NAMESPACE (RFC 2342). One personal namespace with an empty prefix;
    /// no other-user and no shared namespaces.
    pub(crate) fn namespace(&mut self, cmd: &mut QueuedCommand) {
        // Safety: the empty string is a valid quoted string, '/' a valid
        // quoted char.
        let personal = vec![(
            IString::try_from("").unwrap(),
            Some(QuotedChar::try_from('/').unwrap()),
        )];

        cmd.responses.push(Response::Data(Data::Namespace {
            personal,
            other: Vec::new(),
            shared: Vec::new(),
        }));
        cmd.ok(None);
    }

    pub(crate) async fn getacl(&mut self, cmd: &mut QueuedCommand, mailbox: Mailbox) {
        let Some(user) = self.require_user(cmd) else {
            return;
        };

        if !self
            .require_right(cmd, &user, mailbox.name(), Right::Admin)
            .await
        {
            return;
        }

        match self.engine.backend.get_acl(&user, mailbox.name()).await {
            Ok(entries) => {
                let entries = entries
                    .into_iter()
                    .filter_map(|(identifier, rights)| {
                        IString::try_from(identifier).ok().map(|id| (id, rights))
                    })
                    .collect();

                cmd.responses
                    .push(Response::Data(Data::Acl { mailbox, entries }));
                cmd.ok(None);
            }
            Err(error) => cmd.no(None, backend_error_text(&error)),
        }
    }

    pub(crate) async fn setacl(
        &mut self,
        cmd: &mut QueuedCommand,
        mailbox: Mailbox,
        identifier: AString,
        modification: AclModification,
    ) {
        let Some(user) = self.require_user(cmd) else {
            return;
        };

        if !self
            .require_right(cmd, &user, mailbox.name(), Right::Admin)
            .await
        {
            return;
        }

        let Some(identifier) = identifier.to_str() else {
            cmd.bad("Invalid identifier");
            return;
        };

        match self
            .engine
            .backend
            .set_acl(&user, mailbox.name(), identifier, &modification)
            .await
        {
            Ok(()) => cmd.ok(None),
            Err(error) => cmd.no(None, backend_error_text(&error)),
        }
    }
}
