//! Fetch-related types.

use std::{
    fmt::{Display, Formatter},
    num::NonZeroU32,
};

use crate::types::{
    core::{AString, NString, Vec1},
    datetime::DateTime,
    envelope::Envelope,
    flag::FlagFetch,
};

/// Shorthands for commonly-used message data items.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Macro {
    /// Shorthand for `(FLAGS INTERNALDATE RFC822.SIZE)`.
    Fast,
    /// Shorthand for `(FLAGS INTERNALDATE RFC822.SIZE ENVELOPE)`.
    All,
    /// Shorthand for `(FLAGS INTERNALDATE RFC822.SIZE ENVELOPE BODY)`.
    ///
    /// The non-extensible BODY item is MIME structure data, which this server
    /// does not compute; FULL expands to the same items as ALL.
    Full,
}

impl Macro {
    pub fn expand(&self) -> Vec<MessageDataItemName> {
        use MessageDataItemName::*;

        match self {
            Self::Fast => vec![Flags, InternalDate, Rfc822Size],
            Self::All | Self::Full => vec![Flags, InternalDate, Rfc822Size, Envelope],
        }
    }
}

impl Display for Macro {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Macro::All => "ALL",
            Macro::Fast => "FAST",
            Macro::Full => "FULL",
        })
    }
}

/// Either a macro or a list of message data items.
///
/// A macro must be used by itself, and not in conjunction with other macros
/// or data items.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MacroOrMessageDataItemNames {
    Macro(Macro),
    MessageDataItemNames(Vec<MessageDataItemName>),
}

impl MacroOrMessageDataItemNames {
    pub fn expand(self) -> Vec<MessageDataItemName> {
        match self {
            Self::Macro(m) => m.expand(),
            Self::MessageDataItemNames(names) => names,
        }
    }
}

impl From<Macro> for MacroOrMessageDataItemNames {
    fn from(m: Macro) -> Self {
        Self::Macro(m)
    }
}

impl From<Vec<MessageDataItemName>> for MacroOrMessageDataItemNames {
    fn from(item_names: Vec<MessageDataItemName>) -> Self {
        Self::MessageDataItemNames(item_names)
    }
}

/// Message data item name used to request a message data item.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MessageDataItemName {
    /// The non-extensible form of the MIME body structure.
    ///
    /// Accepted by the parser; the server answers the request with NO since
    /// it does not compute MIME structure.
    Body,

    /// The MIME body structure of a message, including extension data.
    ///
    /// Accepted by the parser; the server answers the request with NO.
    BodyStructure,

    /// The text of a particular body section.
    ///
    /// ```imap
    /// BODY[<section>]<<partial>>
    /// ```
    ///
    /// `BODY[...]` implicitly sets the `\Seen` flag where `BODY.PEEK[...]`
    /// does not.
    BodyExt {
        section: Option<Section>,
        partial: Option<(u32, NonZeroU32)>,
        peek: bool,
    },

    /// The envelope structure of a message.
    Envelope,

    /// The flags that are set for a message.
    Flags,

    /// The internal date of a message.
    InternalDate,

    /// Functionally equivalent to `BODY[]`, differing in the syntax of the
    /// resulting untagged FETCH data.
    Rfc822,

    /// Functionally equivalent to `BODY.PEEK[HEADER]`.
    Rfc822Header,

    /// The RFC 2822 size of a message.
    Rfc822Size,

    /// Functionally equivalent to `BODY[TEXT]`.
    Rfc822Text,

    /// The unique identifier for a message.
    Uid,

    /// The mod-sequence of a message (CONDSTORE).
    ModSeq,
}

/// Message data item.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MessageDataItem {
    /// The text of a particular body section.
    BodyExt {
        section: Option<Section>,
        /// The origin octet, present iff a partial was requested.
        origin: Option<u32>,
        data: NString,
    },
    Envelope(Envelope),
    Flags(Vec<FlagFetch>),
    InternalDate(DateTime),
    Rfc822(NString),
    Rfc822Header(NString),
    Rfc822Size(u32),
    Rfc822Text(NString),
    Uid(NonZeroU32),
    ModSeq(u64),
}

/// A part specifier: a set of one or more part numbers delimited by periods.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Part(pub Vec1<NonZeroU32>);

/// A body section specification.
///
/// An empty section specification (`BODY[]`) refers to the entire message and
/// is represented as `None` at the use sites.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Section {
    /// A single part, e.g., `BODY[1.2]`.
    Part(Part),

    /// The message header, e.g., `BODY[HEADER]` or `BODY[1.2.HEADER]`.
    Header(Option<Part>),

    /// Header fields restricted to a list, e.g., `BODY[HEADER.FIELDS (Subject)]`.
    HeaderFields(Option<Part>, Vec1<AString>),

    /// All header fields except a list, e.g., `BODY[HEADER.FIELDS.NOT (To)]`.
    HeaderFieldsNot(Option<Part>, Vec1<AString>),

    /// The message text without the header, e.g., `BODY[TEXT]`.
    Text(Option<Part>),

    /// The MIME header of a part, e.g., `BODY[1.MIME]`.
    Mime(Part),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macro_expansion() {
        assert_eq!(
            Macro::Fast.expand(),
            vec![
                MessageDataItemName::Flags,
                MessageDataItemName::InternalDate,
                MessageDataItemName::Rfc822Size,
            ],
        );

        assert_eq!(Macro::Full.expand(), Macro::All.expand());
    }
}
