use std::str::from_utf8;

use nom::{
    branch::alt,
    bytes::streaming::take_while1,
    combinator::map,
};

use crate::{
    parse::{
        core::{astring, string},
        IMAPErrorKind, IMAPParseError, IMAPResult,
    },
    types::mailbox::{ListCharString, ListMailbox, Mailbox},
    utils::indicators::is_list_char,
};

/// `list-mailbox = 1*list-char / string`
pub(crate) fn list_mailbox(input: &[u8]) -> IMAPResult<ListMailbox> {
    alt((
        map(take_while1(is_list_char), |bytes: &[u8]| {
            // Safety: `unwrap` is safe because `is_list_char` enforces ASCII.
            ListMailbox::Token(ListCharString(from_utf8(bytes).unwrap().to_owned()))
        }),
        map(string, ListMailbox::String),
    ))(input)
}

/// `mailbox = "INBOX" / astring`
///
/// The name is decoded from modified UTF-7 here; a name that is not valid
/// (canonical) modified UTF-7 is a parse error.
pub(crate) fn mailbox(input: &[u8]) -> IMAPResult<Mailbox> {
    let (remaining, raw) = astring(input)?;

    match Mailbox::from_wire(&raw) {
        Ok(mailbox) => Ok((remaining, mailbox)),
        Err(_) => Err(nom::Err::Failure(IMAPParseError {
            input,
            kind: IMAPErrorKind::BadMailbox,
        })),
    }
}

/// A mailbox name that may be empty: the reference argument of LIST/LSUB.
pub(crate) fn mailbox_reference(input: &[u8]) -> IMAPResult<Option<Mailbox>> {
    let (remaining, raw) = astring(input)?;

    if raw.as_bytes().is_empty() {
        return Ok((remaining, None));
    }

    match Mailbox::from_wire(&raw) {
        Ok(mailbox) => Ok((remaining, Some(mailbox))),
        Err(_) => Err(nom::Err::Failure(IMAPParseError {
            input,
            kind: IMAPErrorKind::BadMailbox,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox() {
        let (rem, got) = mailbox(b"inBoX ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(got, Mailbox::Inbox);

        let (_, got) = mailbox(b"Entw&APw-rfe ").unwrap();
        assert_eq!(got.name(), "Entwürfe");

        assert!(mailbox(b"Entw&APw ").is_err());
    }

    #[test]
    fn test_list_mailbox() {
        let (rem, got) = list_mailbox(b"%/* ").unwrap();
        assert_eq!(rem, b" ");
        assert!(matches!(got, ListMailbox::Token(_)));

        let (rem, got) = list_mailbox(b"\"two words\" ").unwrap();
        assert_eq!(rem, b" ");
        assert!(matches!(got, ListMailbox::String(_)));
    }

    #[test]
    fn test_mailbox_reference() {
        let (_, got) = mailbox_reference(b"\"\" ").unwrap();
        assert_eq!(got, None);

        let (_, got) = mailbox_reference(b"INBOX ").unwrap();
        assert_eq!(got, Some(Mailbox::Inbox));
    }
}
