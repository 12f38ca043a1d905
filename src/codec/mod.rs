//! Decoders and encoders gluing the [`parse`](crate::parse) layer and the
//! [`types`](crate::types) layer to the wire.
//!
//! Which decoder applies depends on the state of the IMAP conversation: a
//! server usually decodes [`Command`](crate::types::command::Command)s, but
//! while a SASL exchange is running it decodes
//! [`AuthenticateData`](crate::types::auth::AuthenticateData) lines, and while
//! the connection is idling it waits for
//! [`idle-done`](crate::parse::command::idle_done). The caller is responsible
//! for tracking this state and choosing the decoder.

mod decode;
mod encode;

pub use decode::{
    AuthenticateDataDecodeError, CommandDecodeError, Decoder, IdleDoneDecodeError,
};
pub use encode::{Encoded, Encoder, Fragment};

/// Decoder and encoder for [`Command`](crate::types::command::Command)s.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandCodec;

/// Decoder for lines of the AUTHENTICATE exchange.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AuthenticateDataCodec;

/// Decoder for the `DONE` line ending IDLE.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IdleDoneCodec;

/// Encoder for [`Greeting`](crate::types::response::Greeting)s.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GreetingCodec;

/// Encoder for [`Response`](crate::types::response::Response)s.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResponseCodec;
