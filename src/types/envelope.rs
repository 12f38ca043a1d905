//! Envelope-related types.

use crate::types::core::NString;

/// The envelope structure of a message.
///
/// Computed by the storage layer from the RFC 2822 header, defaulting fields
/// as necessary.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Envelope {
    pub date: NString,
    pub subject: NString,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub in_reply_to: NString,
    pub message_id: NString,
}

/// A single address in an envelope.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Address {
    /// Personal name.
    pub name: NString,
    /// At-domain-list (source route).
    pub adl: NString,
    /// Mailbox name, i.e., the local part.
    pub mailbox: NString,
    /// Host name.
    pub host: NString,
}
