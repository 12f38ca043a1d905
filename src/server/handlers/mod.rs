//! Command handlers.
//!
//! Handlers are grouped the way the grammar groups commands: valid in any
//! state, valid only before authentication, valid once authenticated, and
//! valid only with a selected mailbox. Each handler fills in the untagged
//! responses and the tagged completion of its [`QueuedCommand`]; the
//! connection driver decides when they are emitted.

mod any;
mod auth;
mod nonauth;
mod selected;

use crate::{
    backend::BackendError,
    types::core::{IString, Literal, NString},
};

/// The longest string still worth sending in quoted form; anything longer
/// (or anything a quoted string can't carry) goes out as a literal.
const QUOTED_LIMIT: usize = 64;

/// Wraps fetched message bytes for the wire.
pub(crate) fn body_nstring(data: Vec<u8>) -> NString {
    if data.len() <= QUOTED_LIMIT {
        if let Ok(istring) = IString::try_from(data.as_slice()) {
            return NString(Some(istring));
        }
    }

    match Literal::try_from(data) {
        Ok(literal) => NString(Some(IString::Literal(literal))),
        // A message containing NUL can't be transported in an IMAP string.
        Err(_) => NString::nil(),
    }
}

/// A NO text for a backend error.
pub(crate) fn backend_error_text(error: &BackendError) -> &'static str {
    match error {
        BackendError::NoSuchMailbox => "No such mailbox",
        BackendError::MailboxExists => "Mailbox exists",
        BackendError::NoSuchMessage => "No such message",
        BackendError::InvalidName => "Invalid mailbox name",
        BackendError::NotPermitted => "Not permitted",
        BackendError::Unavailable(_) => "Backend temporarily unavailable",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_nstring_picks_the_form() {
        assert!(matches!(
            body_nstring(b"short".to_vec()),
            NString(Some(IString::Quoted(_)))
        ));
        assert!(matches!(
            body_nstring(b"line\r\nbreak".to_vec()),
            NString(Some(IString::Literal(_)))
        ));
        assert!(matches!(
            body_nstring(vec![b'x'; 1000]),
            NString(Some(IString::Literal(_)))
        ));
        assert_eq!(body_nstring(b"nul\0".to_vec()), NString::nil());
    }
}
