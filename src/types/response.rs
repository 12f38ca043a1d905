//! Server responses.

use std::num::NonZeroU32;

use crate::types::{
    acl::RightSet,
    auth::AuthMechanism,
    core::{Atom, Charset, IString, NString, QuotedChar, Tag, Text, Vec1},
    error::ValidationError,
    fetch::MessageDataItem,
    flag::{Flag, FlagNameAttribute, FlagPerm},
    mailbox::Mailbox,
    sequence::SequenceSet,
    status::StatusDataItem,
};

/// The greeting a server sends when the connection is established.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Greeting {
    pub kind: GreetingKind,
    pub code: Option<Code>,
    pub text: Text,
}

impl Greeting {
    pub fn ok(code: Option<Code>, text: &str) -> Result<Self, ValidationError> {
        Ok(Greeting {
            kind: GreetingKind::Ok,
            code,
            text: text.try_into()?,
        })
    }

    pub fn bye(code: Option<Code>, text: &str) -> Result<Self, ValidationError> {
        Ok(Greeting {
            kind: GreetingKind::Bye,
            code,
            text: text.try_into()?,
        })
    }
}

/// IMAP4rev1 defines three possible greetings at connection startup.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GreetingKind {
    /// The connection is not yet authenticated.
    Ok,
    /// The connection has already been authenticated by external means.
    PreAuth,
    /// The server is not willing to accept a connection from this client.
    Bye,
}

/// Any response the server can send after the greeting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    /// Tagged status responses indicate the completion result of a command;
    /// untagged ones carry server status, e.g., an impending shutdown.
    Status(Status),
    /// All server data is untagged, indicated by the token `*`.
    Data(Data),
    /// Command continuation request responses use the token `+`.
    Continue(Continue),
}

/// Status responses: OK, NO, BAD and BYE.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Status {
    /// An information message; when tagged, successful command completion.
    Ok {
        tag: Option<Tag>,
        code: Option<Code>,
        text: Text,
    },

    /// An operational error; when tagged, unsuccessful command completion.
    No {
        tag: Option<Tag>,
        code: Option<Code>,
        text: Text,
    },

    /// A protocol-level error, e.g., a command that could not be parsed.
    Bad {
        tag: Option<Tag>,
        code: Option<Code>,
        text: Text,
    },

    /// Always untagged; the server is about to close the connection.
    Bye { code: Option<Code>, text: Text },
}

impl Status {
    pub fn ok<T>(tag: Option<Tag>, code: Option<Code>, text: T) -> Result<Self, T::Error>
    where
        T: TryInto<Text>,
    {
        Ok(Status::Ok {
            tag,
            code,
            text: text.try_into()?,
        })
    }

    pub fn no<T>(tag: Option<Tag>, code: Option<Code>, text: T) -> Result<Self, T::Error>
    where
        T: TryInto<Text>,
    {
        Ok(Status::No {
            tag,
            code,
            text: text.try_into()?,
        })
    }

    pub fn bad<T>(tag: Option<Tag>, code: Option<Code>, text: T) -> Result<Self, T::Error>
    where
        T: TryInto<Text>,
    {
        Ok(Status::Bad {
            tag,
            code,
            text: text.try_into()?,
        })
    }

    pub fn bye<T>(code: Option<Code>, text: T) -> Result<Self, T::Error>
    where
        T: TryInto<Text>,
    {
        Ok(Status::Bye {
            code,
            text: text.try_into()?,
        })
    }

    pub fn tag(&self) -> Option<&Tag> {
        match self {
            Status::Ok { tag, .. } | Status::No { tag, .. } | Status::Bad { tag, .. } => {
                tag.as_ref()
            }
            Status::Bye { .. } => None,
        }
    }
}

/// Untagged data responses.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Data {
    /// `* CAPABILITY ...`
    Capability(Vec1<Capability>),

    /// `* LIST (<attrs>) <delimiter> <name>`
    List {
        items: Vec<FlagNameAttribute>,
        delimiter: Option<QuotedChar>,
        mailbox: Mailbox,
    },

    /// `* LSUB (<attrs>) <delimiter> <name>`
    Lsub {
        items: Vec<FlagNameAttribute>,
        delimiter: Option<QuotedChar>,
        mailbox: Mailbox,
    },

    /// `* STATUS <name> (<items>)`
    Status {
        mailbox: Mailbox,
        items: Vec<StatusDataItem>,
    },

    /// `* SEARCH <numbers>`
    Search(Vec<NonZeroU32>),

    /// `* FLAGS (<flags>)`
    Flags(Vec<Flag>),

    /// `* <n> EXISTS`
    Exists(u32),

    /// `* <n> RECENT`
    Recent(u32),

    /// `* <msn> EXPUNGE`
    Expunge(NonZeroU32),

    /// `* <msn> FETCH (<items>)`
    Fetch {
        seq: NonZeroU32,
        items: Vec1<MessageDataItem>,
    },

    /// `* NAMESPACE <personal> <other> <shared>` (RFC 2342)
    Namespace {
        personal: Vec<(IString, Option<QuotedChar>)>,
        other: Vec<(IString, Option<QuotedChar>)>,
        shared: Vec<(IString, Option<QuotedChar>)>,
    },

    /// `* ACL <name> <identifier> <rights> ...` (RFC 4314)
    Acl {
        mailbox: Mailbox,
        entries: Vec<(IString, RightSet)>,
    },

    /// `* ID <parameters>` (RFC 2971)
    Id {
        parameters: Option<Vec<(IString, NString)>>,
    },
}

/// A command continuation request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Continue {
    Basic { code: Option<Code>, text: Text },
    /// A base64-encoded server challenge during AUTHENTICATE.
    Base64(Vec<u8>),
}

impl Continue {
    pub fn basic<T>(code: Option<Code>, text: T) -> Result<Self, T::Error>
    where
        T: TryInto<Text>,
    {
        Ok(Continue::Basic {
            code,
            text: text.try_into()?,
        })
    }
}

/// A response code, e.g., `[UIDNEXT 7]`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Code {
    /// The human-readable text contains a special alert.
    Alert,

    /// The SEARCH charset is not supported; optionally lists supported ones.
    BadCharset { allowed: Vec<Charset> },

    /// Capabilities, e.g., in the greeting.
    Capability(Vec1<Capability>),

    /// The human-readable text represents an error in parsing the RFC 2822
    /// header or MIME headers of a message.
    Parse,

    /// Flags the client can change permanently.
    PermanentFlags(Vec<FlagPerm>),

    /// The mailbox is selected read-only.
    ReadOnly,

    /// The mailbox is selected read-write.
    ReadWrite,

    /// An APPEND or COPY failed because the target mailbox does not exist.
    TryCreate,

    /// The next unique identifier value.
    UidNext(NonZeroU32),

    /// The unique identifier validity value.
    UidValidity(NonZeroU32),

    /// The message sequence number of the first unseen message.
    Unseen(NonZeroU32),

    /// `[APPENDUID <uidvalidity> <uid>]` (UIDPLUS)
    AppendUid {
        uid_validity: NonZeroU32,
        uid: NonZeroU32,
    },

    /// `[COPYUID <uidvalidity> <source-set> <destination-set>]` (UIDPLUS)
    CopyUid {
        uid_validity: NonZeroU32,
        source: SequenceSet,
        destination: SequenceSet,
    },

    /// The highest mod-sequence of the mailbox (CONDSTORE).
    HighestModSeq(u64),

    /// Messages not updated because of UNCHANGEDSINCE (CONDSTORE).
    Modified(SequenceSet),

    /// The mailbox does not persist mod-sequences (CONDSTORE).
    NoModSeq,

    /// An unknown code, possibly with a payload.
    Other(Atom, Option<String>),
}

/// A capability advertised in `CAPABILITY`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Capability {
    Imap4Rev1,
    Auth(AuthMechanism),
    StartTls,
    /// LOGIN is refused while the connection is still plaintext.
    LoginDisabled,
    /// Non-synchronizing literals (RFC 7888).
    LiteralPlus,
    /// RFC 2177.
    Idle,
    /// RFC 2971.
    Id,
    /// RFC 2342.
    Namespace,
    /// RFC 4315.
    UidPlus,
    /// RFC 3691.
    Unselect,
    /// \HasChildren and \HasNoChildren (RFC 3348).
    Children,
    /// RFC 7162.
    CondStore,
    /// RFC 4314.
    Acl,
    /// The rights beyond RFC 2086 understood by this server.
    Rights(String),
    Other(Atom),
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => f.write_str("IMAP4rev1"),
            Self::Auth(mechanism) => write!(f, "AUTH={mechanism}"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::LoginDisabled => f.write_str("LOGINDISABLED"),
            Self::LiteralPlus => f.write_str("LITERAL+"),
            Self::Idle => f.write_str("IDLE"),
            Self::Id => f.write_str("ID"),
            Self::Namespace => f.write_str("NAMESPACE"),
            Self::UidPlus => f.write_str("UIDPLUS"),
            Self::Unselect => f.write_str("UNSELECT"),
            Self::Children => f.write_str("CHILDREN"),
            Self::CondStore => f.write_str("CONDSTORE"),
            Self::Acl => f.write_str("ACL"),
            Self::Rights(rights) => write!(f, "RIGHTS={rights}"),
            Self::Other(atom) => f.write_str(atom.as_ref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_display() {
        let tests: [(Capability, &str); 4] = [
            (Capability::Imap4Rev1, "IMAP4rev1"),
            (Capability::Auth(AuthMechanism::CramMd5), "AUTH=CRAM-MD5"),
            (Capability::LiteralPlus, "LITERAL+"),
            (Capability::Rights("ekntx".into()), "RIGHTS=ekntx"),
        ];

        for (test, expected) in tests {
            assert_eq!(test.to_string(), expected);
        }
    }

    #[test]
    fn test_status_tag() {
        let status = Status::ok(Some(Tag::try_from("A001").unwrap()), None, "done").unwrap();
        assert_eq!(status.tag().unwrap().as_ref(), "A001");

        let bye = Status::bye(None, "autologout").unwrap();
        assert_eq!(bye.tag(), None);
    }
}
