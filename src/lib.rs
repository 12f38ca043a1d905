//! An IMAP4rev1 server engine.
//!
//! The crate is split the same way the protocol is: [`types`] contains
//! misuse-resistant data types for everything that can appear on the wire,
//! [`parse`] contains the formal-syntax parsers, [`codec`] ties both together
//! into decoders and encoders, and [`framer`] splits the raw byte stream into
//! lines and literals before any detailed parsing happens.
//!
//! Everything above the wire lives in [`server`]: the per-connection command
//! queue and state machine, the selected-mailbox session, and the command
//! handlers. The engine stores nothing itself; it talks to a [`backend`],
//! which can be anything that implements the [`backend::Storage`] and
//! [`backend::Directory`] contracts. A complete in-memory backend is bundled
//! for tests and for the `imapd` demo binary.

#![deny(missing_debug_implementations)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod codec;
pub mod framer;
pub mod mutf7;
pub mod parse;
pub mod server;
pub mod tls;
pub mod types;
pub mod utils;
