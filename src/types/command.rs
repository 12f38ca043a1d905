//! Client commands.

use crate::types::{
    acl::RightSet,
    auth::AuthMechanism,
    core::{AString, Charset, IString, Literal, NString, Secret, Tag},
    datetime::DateTime,
    fetch::MacroOrMessageDataItemNames,
    flag::{Flag, StoreResponse, StoreType},
    mailbox::{ListMailbox, Mailbox},
    search::SearchKey,
    sequence::SequenceSet,
    status::StatusDataItemName,
};

/// A parsed command: a tag and a typed argument payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Command {
    pub tag: Tag,
    pub body: CommandBody,
}

impl Command {
    pub fn new(tag: Tag, body: CommandBody) -> Self {
        Self { tag, body }
    }

    pub fn name(&self) -> &'static str {
        self.body.name()
    }
}

/// The rights argument of SETACL: replace, grant or revoke.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AclModification {
    Replace(RightSet),
    Add(RightSet),
    Remove(RightSet),
}

/// The typed argument payload of each command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandBody {
    // ----- Valid in all states -----
    Capability,
    Noop,
    Logout,
    /// RFC 2971. `None` means the client sent `ID NIL`.
    Id {
        parameters: Option<Vec<(IString, NString)>>,
    },

    // ----- Valid only when not authenticated -----
    StartTls,
    Authenticate {
        mechanism: AuthMechanism,
        /// SASL initial response, when the client used SASL-IR syntax.
        initial_response: Option<Secret<Vec<u8>>>,
    },
    Login {
        username: AString,
        password: Secret<AString>,
    },

    // ----- Valid in authenticated (and selected) state -----
    Select {
        mailbox: Mailbox,
    },
    Examine {
        mailbox: Mailbox,
    },
    Create {
        mailbox: Mailbox,
    },
    Delete {
        mailbox: Mailbox,
    },
    Rename {
        from: Mailbox,
        to: Mailbox,
    },
    Subscribe {
        mailbox: Mailbox,
    },
    Unsubscribe {
        mailbox: Mailbox,
    },
    List {
        /// `None` is the empty reference `""`.
        reference: Option<Mailbox>,
        mailbox_wildcard: ListMailbox,
    },
    Lsub {
        reference: Option<Mailbox>,
        mailbox_wildcard: ListMailbox,
    },
    Status {
        mailbox: Mailbox,
        item_names: Vec<StatusDataItemName>,
    },
    Append {
        mailbox: Mailbox,
        flags: Vec<Flag>,
        date: Option<DateTime>,
        message: Literal,
    },
    Namespace,
    GetAcl {
        mailbox: Mailbox,
    },
    SetAcl {
        mailbox: Mailbox,
        identifier: AString,
        modification: AclModification,
    },

    // ----- Valid only in selected state -----
    Check,
    Close,
    Unselect,
    Expunge,
    /// UID EXPUNGE (UIDPLUS).
    ExpungeUid {
        sequence_set: SequenceSet,
    },
    Search {
        charset: Option<Charset>,
        criteria: SearchKey,
        uid: bool,
    },
    Fetch {
        sequence_set: SequenceSet,
        macro_or_item_names: MacroOrMessageDataItemNames,
        /// CHANGEDSINCE modifier (CONDSTORE).
        changed_since: Option<u64>,
        uid: bool,
    },
    Store {
        sequence_set: SequenceSet,
        kind: StoreType,
        response: StoreResponse,
        flags: Vec<Flag>,
        /// UNCHANGEDSINCE modifier (CONDSTORE).
        unchanged_since: Option<u64>,
        uid: bool,
    },
    Copy {
        sequence_set: SequenceSet,
        mailbox: Mailbox,
        uid: bool,
    },
    Idle,
}

impl CommandBody {
    /// The command name, as used in command completion texts.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::Id { .. } => "ID",
            Self::StartTls => "STARTTLS",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::Login { .. } => "LOGIN",
            Self::Select { .. } => "SELECT",
            Self::Examine { .. } => "EXAMINE",
            Self::Create { .. } => "CREATE",
            Self::Delete { .. } => "DELETE",
            Self::Rename { .. } => "RENAME",
            Self::Subscribe { .. } => "SUBSCRIBE",
            Self::Unsubscribe { .. } => "UNSUBSCRIBE",
            Self::List { .. } => "LIST",
            Self::Lsub { .. } => "LSUB",
            Self::Status { .. } => "STATUS",
            Self::Append { .. } => "APPEND",
            Self::Namespace => "NAMESPACE",
            Self::GetAcl { .. } => "GETACL",
            Self::SetAcl { .. } => "SETACL",
            Self::Check => "CHECK",
            Self::Close => "CLOSE",
            Self::Unselect => "UNSELECT",
            Self::Expunge => "EXPUNGE",
            Self::ExpungeUid { .. } => "UID EXPUNGE",
            Self::Search { uid: false, .. } => "SEARCH",
            Self::Search { uid: true, .. } => "UID SEARCH",
            Self::Fetch { uid: false, .. } => "FETCH",
            Self::Fetch { uid: true, .. } => "UID FETCH",
            Self::Store { uid: false, .. } => "STORE",
            Self::Store { uid: true, .. } => "UID STORE",
            Self::Copy { uid: false, .. } => "COPY",
            Self::Copy { uid: true, .. } => "UID COPY",
            Self::Idle => "IDLE",
        }
    }

    /// Whether this command takes a sequence-set in MSN form, i.e., is only
    /// meaningful with a selected mailbox.
    pub fn uses_msn(&self) -> bool {
        match self {
            Self::Search { uid, .. } | Self::Fetch { uid, .. } | Self::Store { uid, .. }
            | Self::Copy { uid, .. } => !uid,
            _ => false,
        }
    }
}

/// Convenience constructors used in tests and in the demo binary.
impl CommandBody {
    pub fn login<U, P>(username: U, password: P) -> Result<Self, crate::types::error::ValidationError>
    where
        U: TryInto<AString, Error = crate::types::error::ValidationError>,
        P: TryInto<AString, Error = crate::types::error::ValidationError>,
    {
        Ok(Self::Login {
            username: username.try_into()?,
            password: Secret::new(password.try_into()?),
        })
    }

    pub fn select(mailbox: &str) -> Result<Self, crate::types::error::ValidationError> {
        Ok(Self::Select {
            mailbox: Mailbox::try_from(mailbox)?,
        })
    }

    pub fn fetch(
        sequence_set: &str,
        items: MacroOrMessageDataItemNames,
        uid: bool,
    ) -> Result<Self, crate::types::error::ValidationError> {
        Ok(Self::Fetch {
            sequence_set: sequence_set.parse()?,
            macro_or_item_names: items,
            changed_since: None,
            uid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name() {
        assert_eq!(CommandBody::Capability.name(), "CAPABILITY");
        assert_eq!(
            CommandBody::fetch("1:*", MacroOrMessageDataItemNames::Macro(crate::types::fetch::Macro::Fast), true)
                .unwrap()
                .name(),
            "UID FETCH"
        );
    }

    #[test]
    fn test_uses_msn() {
        let fetch = CommandBody::fetch(
            "1",
            MacroOrMessageDataItemNames::MessageDataItemNames(vec![]),
            false,
        )
        .unwrap();
        assert!(fetch.uses_msn());

        let uid_fetch = CommandBody::fetch(
            "1",
            MacroOrMessageDataItemNames::MessageDataItemNames(vec![]),
            true,
        )
        .unwrap();
        assert!(!uid_fetch.uses_msn());
    }
}
