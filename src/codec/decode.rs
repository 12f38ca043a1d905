//! Decoding of messages.
//!
//! IMAP literals make separating the framing logic from the parsing logic
//! difficult: when a server recognizes a literal (e.g. `{42}\r\n`) in a
//! command, it first needs to agree to receive more data by sending a command
//! continuation request. The [`Framer`](crate::framer::Framer) detects
//! literal announcements before parsing; the decoders here expect a complete
//! message and only report a dangling literal as [`CommandDecodeError::LiteralFound`].

use crate::{
    codec::{AuthenticateDataCodec, CommandCodec, IdleDoneCodec},
    parse::{command::authenticate_data, command::command, command::idle_done, IMAPErrorKind},
    types::{auth::AuthenticateData, command::Command, core::LiteralMode},
};

/// Decoder.
///
/// Implemented for types that know how to decode a specific IMAP message.
pub trait Decoder {
    type Message;
    type Error;

    fn decode<'a>(&self, input: &'a [u8]) -> Result<(&'a [u8], Self::Message), Self::Error>;
}

/// Error during command decoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandDecodeError {
    /// More data is needed.
    Incomplete,

    /// More data is needed (and further action may be necessary).
    ///
    /// The decoder stopped at the beginning of literal data. Typically, a
    /// server must send a command continuation request to agree to the
    /// receival of the remaining data, except when the literal is
    /// non-synchronizing.
    LiteralFound { length: u32, mode: LiteralMode },

    /// Decoding failed at the given byte offset.
    Failed { position: usize },
}

/// Error during authenticate data line decoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthenticateDataDecodeError {
    /// More data is needed.
    Incomplete,

    /// Decoding failed.
    Failed,
}

/// Error during idle done decoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IdleDoneDecodeError {
    /// More data is needed.
    Incomplete,

    /// Decoding failed.
    Failed,
}

impl Decoder for CommandCodec {
    type Message = Command;
    type Error = CommandDecodeError;

    fn decode<'a>(&self, input: &'a [u8]) -> Result<(&'a [u8], Self::Message), Self::Error> {
        match command(input) {
            Ok((remaining, command)) => Ok((remaining, command)),
            Err(nom::Err::Incomplete(_)) => Err(CommandDecodeError::Incomplete),
            Err(nom::Err::Error(error)) | Err(nom::Err::Failure(error)) => match error.kind {
                IMAPErrorKind::Literal { length, mode } => {
                    Err(CommandDecodeError::LiteralFound { length, mode })
                }
                _ => Err(CommandDecodeError::Failed {
                    position: input.len() - error.input.len(),
                }),
            },
        }
    }
}

impl Decoder for AuthenticateDataCodec {
    type Message = AuthenticateData;
    type Error = AuthenticateDataDecodeError;

    fn decode<'a>(&self, input: &'a [u8]) -> Result<(&'a [u8], Self::Message), Self::Error> {
        match authenticate_data(input) {
            Ok((remaining, data)) => Ok((remaining, data)),
            Err(nom::Err::Incomplete(_)) => Err(AuthenticateDataDecodeError::Incomplete),
            Err(_) => Err(AuthenticateDataDecodeError::Failed),
        }
    }
}

impl Decoder for IdleDoneCodec {
    type Message = ();
    type Error = IdleDoneDecodeError;

    fn decode<'a>(&self, input: &'a [u8]) -> Result<(&'a [u8], Self::Message), Self::Error> {
        match idle_done(input) {
            Ok((remaining, done)) => Ok((remaining, done)),
            Err(nom::Err::Incomplete(_)) => Err(IdleDoneDecodeError::Incomplete),
            Err(_) => Err(IdleDoneDecodeError::Failed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::command::CommandBody;

    #[test]
    fn test_decode_command() {
        let (rem, command) = CommandCodec.decode(b"a NOOP\r\n").unwrap();
        assert!(rem.is_empty());
        assert_eq!(command.body, CommandBody::Noop);

        assert_eq!(
            CommandCodec.decode(b"a NOOP"),
            Err(CommandDecodeError::Incomplete),
        );

        // The position names the byte where parsing stopped.
        assert_eq!(
            CommandCodec.decode(b"a FOO BAR\r\n"),
            Err(CommandDecodeError::Failed { position: 2 }),
        );
    }

    #[test]
    fn test_decode_command_literal_announcement() {
        assert_eq!(
            CommandCodec.decode(b"a LOGIN {5}\r\n"),
            Err(CommandDecodeError::LiteralFound {
                length: 5,
                mode: LiteralMode::Sync,
            }),
        );

        let (rem, command) = CommandCodec.decode(b"a LOGIN {5}\r\nalice secret\r\n").unwrap();
        assert!(rem.is_empty());
        assert_eq!(command.name(), "LOGIN");
    }

    #[test]
    fn test_decode_authenticate_data() {
        assert!(AuthenticateDataCodec.decode(b"dGVzdA==\r\n").is_ok());
        assert_eq!(
            AuthenticateDataCodec.decode(b"dGVzdA=="),
            Err(AuthenticateDataDecodeError::Incomplete),
        );
    }

    #[test]
    fn test_decode_idle_done() {
        assert!(IdleDoneCodec.decode(b"DONE\r\n").is_ok());
        assert_eq!(
            IdleDoneCodec.decode(b"no\r\n"),
            Err(IdleDoneDecodeError::Failed),
        );
    }
}
