//! Mailbox-related types.
//!
//! Mailbox names are 7-bit on the wire; non-ASCII names travel in modified
//! UTF-7 (RFC 3501, section 5.1.3). The types in this module hold the decoded
//! UTF-8 form. Decoding happens once at the parser boundary, encoding once at
//! the encoder boundary, so a valid name round-trips bit-exactly.

use std::fmt::{Display, Formatter};

use crate::{
    mutf7,
    types::{
        core::{AString, IString},
        error::{ValidationError, ValidationErrorKind},
    },
    utils::indicators::is_list_char,
};

/// A mailbox name.
///
/// The case-insensitive name INBOX is reserved to mean "the primary mailbox
/// for this user on this server" and gets its own variant.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Mailbox {
    Inbox,
    Other(MailboxOther),
}

impl Mailbox {
    /// The decoded (UTF-8) name. INBOX is always spelled `INBOX`.
    pub fn name(&self) -> &str {
        match self {
            Self::Inbox => "INBOX",
            Self::Other(other) => &other.0,
        }
    }

    /// Decodes a name from its wire form (modified UTF-7).
    pub fn from_wire(value: &AString) -> Result<Self, ValidationError> {
        let name = mutf7::decode(value.as_bytes())
            .map_err(|_| ValidationError::new(ValidationErrorKind::Invalid))?;

        Self::try_from(name)
    }

    /// Encodes the name into its wire form (modified UTF-7).
    pub fn to_wire(&self) -> String {
        mutf7::encode(self.name())
    }
}

impl TryFrom<&str> for Mailbox {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_owned())
    }
}

impl TryFrom<String> for Mailbox {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(ValidationError::new(ValidationErrorKind::Empty));
        }

        if value.eq_ignore_ascii_case("inbox") {
            return Ok(Self::Inbox);
        }

        Ok(Self::Other(MailboxOther(value)))
    }
}

impl Display for Mailbox {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A mailbox name other than INBOX, in decoded (UTF-8) form.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MailboxOther(pub(crate) String);

impl MailboxOther {
    pub fn inner(&self) -> &str {
        &self.0
    }
}

/// `list-char = ATOM-CHAR / list-wildcards / resp-specials`
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ListCharString(pub(crate) String);

impl ListCharString {
    pub fn verify(value: impl AsRef<[u8]>) -> Result<(), ValidationError> {
        let value = value.as_ref();

        if value.is_empty() {
            return Err(ValidationError::new(ValidationErrorKind::Empty));
        }

        if let Some(at) = value.iter().position(|b| !is_list_char(*b)) {
            return Err(ValidationError::new(ValidationErrorKind::InvalidByteAt {
                byte: value[at],
                at,
            }));
        };

        Ok(())
    }
}

impl TryFrom<&str> for ListCharString {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        Ok(Self(value.to_owned()))
    }
}

impl AsRef<str> for ListCharString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The mailbox argument of LIST/LSUB: a name pattern that may contain the
/// wildcards `%` (one hierarchy level) and `*` (any depth).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ListMailbox {
    Token(ListCharString),
    String(IString),
}

impl ListMailbox {
    /// The decoded (UTF-8) pattern. Wildcards are US-ASCII and unaffected by
    /// the decoding.
    pub fn to_pattern(&self) -> Result<String, ValidationError> {
        let raw = match self {
            Self::Token(token) => token.as_ref().as_bytes(),
            Self::String(istring) => istring.as_bytes(),
        };

        mutf7::decode(raw).map_err(|_| ValidationError::new(ValidationErrorKind::Invalid))
    }
}

impl TryFrom<&str> for ListMailbox {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.is_empty() {
            // An empty pattern is valid; it can only be a quoted string.
            return Ok(ListMailbox::String(IString::try_from(value)?));
        }

        if let Ok(token) = ListCharString::try_from(value) {
            return Ok(ListMailbox::Token(token));
        }

        Ok(ListMailbox::String(IString::try_from(value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::core::AString;

    #[test]
    fn test_inbox_is_case_insensitive() {
        for name in ["inbox", "Inbox", "INBOX", "iNbOx"] {
            assert_eq!(Mailbox::try_from(name).unwrap(), Mailbox::Inbox);
        }

        assert!(matches!(
            Mailbox::try_from("INBOX/child").unwrap(),
            Mailbox::Other(_)
        ));
    }

    #[test]
    fn test_wire_round_trip() {
        let wire = AString::try_from("Entw&APw-rfe").unwrap();
        let mailbox = Mailbox::from_wire(&wire).unwrap();

        assert_eq!(mailbox.name(), "Entwürfe");
        assert_eq!(mailbox.to_wire(), "Entw&APw-rfe");
    }

    #[test]
    fn test_non_canonical_wire_name_is_rejected() {
        let wire = AString::try_from("&U,BTFw-&ZeVnLIqe-").unwrap();

        assert!(Mailbox::from_wire(&wire).is_err());
    }
}
