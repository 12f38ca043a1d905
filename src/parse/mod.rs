//! nom parsers for the formal syntax of IMAP (RFC 3501, section 9) and the
//! supported extensions.
//!
//! Parser functions are named after the ABNF rule they implement. All parsers
//! work on `&[u8]` in streaming mode and return [`IMAPResult`], an extended
//! version of [`nom::IResult`] whose error type can carry IMAP-specific
//! context, most importantly a literal announcement (`{42}\r\n`) on which the
//! caller must act before more input arrives.

use nom::error::{ErrorKind, FromExternalError, ParseError};

use crate::types::{auth::AuthMechanism, core::LiteralMode};

pub mod command;
pub mod core;
pub mod datetime;
pub mod fetch;
pub mod flag;
pub mod mailbox;
pub mod search;
pub mod section;
pub mod sequence;
pub mod status;

/// An extended version of [`nom::IResult`].
pub(crate) type IMAPResult<'a, O> = Result<(&'a [u8], O), nom::Err<IMAPParseError<'a>>>;

/// An extended version of [`nom::error::Error`].
#[derive(Debug)]
pub(crate) struct IMAPParseError<'a> {
    pub input: &'a [u8],
    pub kind: IMAPErrorKind,
}

/// An extended version of [`nom::error::ErrorKind`].
#[derive(Debug)]
pub(crate) enum IMAPErrorKind {
    Literal {
        length: u32,
        mode: LiteralMode,
    },
    BadNumber,
    BadBase64,
    BadDateTime,
    BadMailbox,
    LiteralContainsNull,
    RecursionLimitExceeded,
    Nom(ErrorKind),
}

impl<'a> ParseError<&'a [u8]> for IMAPParseError<'a> {
    fn from_error_kind(input: &'a [u8], kind: ErrorKind) -> Self {
        Self {
            input,
            kind: IMAPErrorKind::Nom(kind),
        }
    }

    fn append(input: &'a [u8], kind: ErrorKind, _: Self) -> Self {
        Self {
            input,
            kind: IMAPErrorKind::Nom(kind),
        }
    }
}

impl<'a> FromExternalError<&'a [u8], std::num::ParseIntError> for IMAPParseError<'a> {
    fn from_external_error(input: &'a [u8], _: ErrorKind, _: std::num::ParseIntError) -> Self {
        Self {
            input,
            kind: IMAPErrorKind::BadNumber,
        }
    }
}

impl<'a> FromExternalError<&'a [u8], std::num::TryFromIntError> for IMAPParseError<'a> {
    fn from_external_error(input: &'a [u8], _: ErrorKind, _: std::num::TryFromIntError) -> Self {
        Self {
            input,
            kind: IMAPErrorKind::BadNumber,
        }
    }
}

impl<'a> FromExternalError<&'a [u8], base64::DecodeError> for IMAPParseError<'a> {
    fn from_external_error(input: &'a [u8], _: ErrorKind, _: base64::DecodeError) -> Self {
        Self {
            input,
            kind: IMAPErrorKind::BadBase64,
        }
    }
}

/// `auth-type = atom`
///
/// Note: Defined by [SASL]
pub(crate) fn auth_type(input: &[u8]) -> IMAPResult<AuthMechanism> {
    let (rem, mechanism) = self::core::atom(input)?;

    Ok((rem, AuthMechanism::from(mechanism)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_type() {
        let tests = [
            (b"plain ".as_ref(), AuthMechanism::Plain),
            (b"pLaiN ".as_ref(), AuthMechanism::Plain),
            (b"cram-md5 ".as_ref(), AuthMechanism::CramMd5),
            (b"anonymous ".as_ref(), AuthMechanism::Anonymous),
            (
                b"Xplain ".as_ref(),
                AuthMechanism::Other("Xplain".as_bytes().try_into().unwrap()),
            ),
        ];

        for (test, expected) in tests {
            let (rem, got) = auth_type(test).unwrap();
            assert_eq!(expected, got);
            assert_eq!(rem, b" ");
        }
    }
}
