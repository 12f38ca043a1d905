//! Flag-related types.

use std::fmt::{Display, Formatter};

use crate::types::{core::Atom, error::ValidationError};

/// There are two types of flags in IMAP4rev1: system and keyword flags.
///
/// A system flag is pre-defined in RFC 3501 and begins with "\". Flags that
/// begin with "\" but are not pre-defined system flags are extension flags.
/// A keyword is defined by the server implementation and does not begin with "\".
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Flag {
    /// Message has been answered (`\Answered`).
    Answered,
    /// Message is "deleted" for removal by later EXPUNGE (`\Deleted`).
    Deleted,
    /// Message has not completed composition (`\Draft`).
    Draft,
    /// Message is "flagged" for urgent/special attention (`\Flagged`).
    Flagged,
    /// Message has been read (`\Seen`).
    Seen,
    /// A future expansion of a system flag.
    Extension(Atom),
    /// A keyword.
    Keyword(Atom),
}

impl Flag {
    pub fn system(atom: Atom) -> Self {
        match atom.as_ref().to_ascii_lowercase().as_ref() {
            "answered" => Self::Answered,
            "deleted" => Self::Deleted,
            "draft" => Self::Draft,
            "flagged" => Self::Flagged,
            "seen" => Self::Seen,
            _ => Self::Extension(atom),
        }
    }

    pub fn keyword(atom: Atom) -> Self {
        Self::Keyword(atom)
    }
}

impl TryFrom<&str> for Flag {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(if let Some(value) = value.strip_prefix('\\') {
            Self::system(Atom::try_from(value)?)
        } else {
            Self::keyword(Atom::try_from(value)?)
        })
    }
}

impl Display for Flag {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Flag::Answered => f.write_str("\\Answered"),
            Flag::Deleted => f.write_str("\\Deleted"),
            Flag::Draft => f.write_str("\\Draft"),
            Flag::Flagged => f.write_str("\\Flagged"),
            Flag::Seen => f.write_str("\\Seen"),
            Flag::Extension(other) => write!(f, "\\{other}"),
            Flag::Keyword(atom) => write!(f, "{atom}"),
        }
    }
}

/// A flag in a FETCH FLAGS item. Includes `\Recent`, which a client can never set.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum FlagFetch {
    Flag(Flag),

    /// Message "recently" arrived in this mailbox (`\Recent`).
    ///
    /// This session is the first session to have been notified about this
    /// message; subsequent sessions will not see \Recent set for it.
    Recent,
}

impl From<Flag> for FlagFetch {
    fn from(flag: Flag) -> Self {
        Self::Flag(flag)
    }
}

/// A flag in a PERMANENTFLAGS response code.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum FlagPerm {
    Flag(Flag),

    /// It is possible to create new keywords by attempting to store them (`\*`).
    Asterisk,
}

impl From<Flag> for FlagPerm {
    fn from(flag: Flag) -> Self {
        Self::Flag(flag)
    }
}

/// Name attributes in LIST/LSUB responses.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum FlagNameAttribute {
    /// No child levels exist now and none can be created (`\Noinferiors`).
    Noinferiors,

    /// It is not possible to use this name as a selectable mailbox (`\Noselect`).
    Noselect,

    /// The mailbox has been marked "interesting" by the server (`\Marked`).
    Marked,

    /// No additional messages since the mailbox was last selected (`\Unmarked`).
    Unmarked,

    /// The mailbox has at least one child (`\HasChildren`).
    HasChildren,

    /// The mailbox has no children (`\HasNoChildren`).
    HasNoChildren,

    /// An extension attribute.
    Extension(Atom),
}

impl From<Atom> for FlagNameAttribute {
    fn from(atom: Atom) -> Self {
        match atom.as_ref().to_ascii_lowercase().as_ref() {
            "noinferiors" => Self::Noinferiors,
            "noselect" => Self::Noselect,
            "marked" => Self::Marked,
            "unmarked" => Self::Unmarked,
            "haschildren" => Self::HasChildren,
            "hasnochildren" => Self::HasNoChildren,
            _ => Self::Extension(atom),
        }
    }
}

impl Display for FlagNameAttribute {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Noinferiors => f.write_str("\\Noinferiors"),
            Self::Noselect => f.write_str("\\Noselect"),
            Self::Marked => f.write_str("\\Marked"),
            Self::Unmarked => f.write_str("\\Unmarked"),
            Self::HasChildren => f.write_str("\\HasChildren"),
            Self::HasNoChildren => f.write_str("\\HasNoChildren"),
            Self::Extension(extension) => write!(f, "\\{extension}"),
        }
    }
}

/// How STORE changes the flag set of a message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StoreType {
    Replace,
    Add,
    Remove,
}

/// Whether STORE confirms the change with untagged FETCH responses.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StoreResponse {
    Answer,
    Silent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_flags_are_recognized_case_insensitively() {
        assert_eq!(Flag::try_from("\\SEEN").unwrap(), Flag::Seen);
        assert_eq!(Flag::try_from("\\seen").unwrap(), Flag::Seen);
        assert_eq!(
            Flag::try_from("\\Forwarded").unwrap(),
            Flag::Extension(Atom::try_from("Forwarded").unwrap())
        );
        assert_eq!(
            Flag::try_from("$Junk").unwrap(),
            Flag::Keyword(Atom::try_from("$Junk").unwrap())
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Flag::Seen.to_string(), "\\Seen");
        assert_eq!(Flag::try_from("$Junk").unwrap().to_string(), "$Junk");
        assert_eq!(
            FlagNameAttribute::HasNoChildren.to_string(),
            "\\HasNoChildren"
        );
    }
}
