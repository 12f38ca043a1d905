//! Access-control types (RFC 4314).
//!
//! The server advertises `ACL` and `RIGHTS=ekntx`. Rights are represented by
//! single lower-case letters on the wire; [`Right`] gives them names.

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use crate::types::error::{ValidationError, ValidationErrorKind};

/// A single right on a mailbox.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Right {
    /// `l`: mailbox is visible in LIST/LSUB; SUBSCRIBE is allowed.
    Lookup,
    /// `r`: SELECT/EXAMINE, FETCH, SEARCH, COPY from the mailbox.
    Read,
    /// `s`: keep `\Seen` across sessions.
    KeepSeen,
    /// `w`: set or clear flags other than `\Seen` and `\Deleted`.
    Write,
    /// `i`: APPEND and COPY into the mailbox.
    Insert,
    /// `p`: send mail to the submission address of the mailbox.
    Post,
    /// `k`: CREATE new child mailboxes.
    CreateMailboxes,
    /// `x`: DELETE or RENAME the mailbox itself.
    DeleteMailbox,
    /// `t`: set or clear the `\Deleted` flag.
    DeleteMessages,
    /// `e`: EXPUNGE and CLOSE.
    Expunge,
    /// `a`: administer the mailbox (SETACL/GETACL).
    Admin,
}

impl Right {
    pub fn letter(&self) -> char {
        match self {
            Self::Lookup => 'l',
            Self::Read => 'r',
            Self::KeepSeen => 's',
            Self::Write => 'w',
            Self::Insert => 'i',
            Self::Post => 'p',
            Self::CreateMailboxes => 'k',
            Self::DeleteMailbox => 'x',
            Self::DeleteMessages => 't',
            Self::Expunge => 'e',
            Self::Admin => 'a',
        }
    }
}

impl TryFrom<char> for Right {
    type Error = ValidationError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        Ok(match value.to_ascii_lowercase() {
            'l' => Self::Lookup,
            'r' => Self::Read,
            's' => Self::KeepSeen,
            'w' => Self::Write,
            'i' => Self::Insert,
            'p' => Self::Post,
            'k' | 'c' => Self::CreateMailboxes,
            'x' => Self::DeleteMailbox,
            't' => Self::DeleteMessages,
            'e' => Self::Expunge,
            'a' => Self::Admin,
            // 'd' is the obsolete RFC 2086 macro for "t", "e" and "x"; it is
            // handled by the caller since it expands to several rights.
            _ => return Err(ValidationError::new(ValidationErrorKind::Invalid)),
        })
    }
}

/// A set of rights.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct RightSet(BTreeSet<Right>);

impl RightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rights; granted to the mailbox owner.
    pub fn all() -> Self {
        Self(BTreeSet::from([
            Right::Lookup,
            Right::Read,
            Right::KeepSeen,
            Right::Write,
            Right::Insert,
            Right::Post,
            Right::CreateMailboxes,
            Right::DeleteMailbox,
            Right::DeleteMessages,
            Right::Expunge,
            Right::Admin,
        ]))
    }

    pub fn contains(&self, right: Right) -> bool {
        self.0.contains(&right)
    }

    pub fn insert(&mut self, right: Right) {
        self.0.insert(right);
    }

    pub fn remove(&mut self, right: Right) {
        self.0.remove(&right);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Right> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Right> for RightSet {
    fn from_iter<I: IntoIterator<Item = Right>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl TryFrom<&str> for RightSet {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut rights = BTreeSet::new();

        for c in value.chars() {
            if c == 'd' || c == 'D' {
                // Obsolete RFC 2086 macro.
                rights.insert(Right::DeleteMessages);
                rights.insert(Right::Expunge);
                rights.insert(Right::DeleteMailbox);
            } else {
                rights.insert(Right::try_from(c)?);
            }
        }

        Ok(Self(rights))
    }
}

impl Display for RightSet {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        for right in &self.0 {
            write!(f, "{}", right.letter())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let rights = RightSet::try_from("lrswi").unwrap();

        assert!(rights.contains(Right::Lookup));
        assert!(rights.contains(Right::Insert));
        assert!(!rights.contains(Right::Admin));
        assert_eq!(rights.to_string(), "lrswi");
    }

    #[test]
    fn test_obsolete_macros() {
        // "d" expands, "c" maps to "k".
        assert_eq!(
            RightSet::try_from("cd").unwrap(),
            RightSet::try_from("ketx").unwrap(),
        );
    }

    #[test]
    fn test_unknown_right_is_rejected() {
        assert!(RightSet::try_from("lrq").is_err());
    }
}
