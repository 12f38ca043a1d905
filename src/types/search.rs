//! Search-related types.

use crate::types::{
    core::{AString, Atom, Vec1},
    datetime::NaiveDate,
    sequence::SequenceSet,
};

/// The defined search keys.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum SearchKey {
    // Not in the RFC: IMAP ANDs search keys by concatenating them with a
    // space. This variant distinguishes a single key from a conjunction.
    And(Vec1<SearchKey>),

    /// Messages with message sequence numbers corresponding to the specified
    /// message sequence number set.
    SequenceSet(SequenceSet),

    /// All messages in the mailbox; the default initial key for ANDing.
    All,

    /// Messages with the \Answered flag set.
    Answered,

    /// Messages that contain the specified string in the envelope
    /// structure's BCC field.
    Bcc(AString),

    /// Messages whose internal date (disregarding time and timezone) is
    /// earlier than the specified date.
    Before(NaiveDate),

    /// Messages that contain the specified string in the body of the message.
    Body(AString),

    /// Messages that contain the specified string in the envelope
    /// structure's CC field.
    Cc(AString),

    /// Messages with the \Deleted flag set.
    Deleted,

    /// Messages with the \Draft flag set.
    Draft,

    /// Messages with the \Flagged flag set.
    Flagged,

    /// Messages that contain the specified string in the envelope
    /// structure's FROM field.
    From(AString),

    /// Messages that have a header with the specified field-name and that
    /// contains the specified string in the text of the header. If the
    /// string to search is zero-length, this matches all messages that have
    /// a header line with the specified field-name.
    Header(AString, AString),

    /// Messages with the specified keyword flag set.
    Keyword(Atom),

    /// Messages with an RFC 2822 size larger than the specified number of
    /// octets.
    Larger(u32),

    /// Messages that have the \Recent flag set but not the \Seen flag.
    New,

    /// Messages that do not match the specified search key.
    Not(Box<SearchKey>),

    /// Messages that do not have the \Recent flag set.
    Old,

    /// Messages whose internal date (disregarding time and timezone) is
    /// within the specified date.
    On(NaiveDate),

    /// Messages that match either search key.
    Or(Box<SearchKey>, Box<SearchKey>),

    /// Messages that have the \Recent flag set.
    Recent,

    /// Messages that have the \Seen flag set.
    Seen,

    /// Messages whose Date: header (disregarding time and timezone) is
    /// earlier than the specified date.
    SentBefore(NaiveDate),

    /// Messages whose Date: header (disregarding time and timezone) is
    /// within the specified date.
    SentOn(NaiveDate),

    /// Messages whose Date: header (disregarding time and timezone) is
    /// within or later than the specified date.
    SentSince(NaiveDate),

    /// Messages whose internal date (disregarding time and timezone) is
    /// within or later than the specified date.
    Since(NaiveDate),

    /// Messages with an RFC 2822 size smaller than the specified number of
    /// octets.
    Smaller(u32),

    /// Messages that contain the specified string in the envelope
    /// structure's SUBJECT field.
    Subject(AString),

    /// Messages that contain the specified string in the header or body of
    /// the message.
    Text(AString),

    /// Messages that contain the specified string in the envelope
    /// structure's TO field.
    To(AString),

    /// Messages with unique identifiers corresponding to the specified
    /// unique identifier set.
    Uid(SequenceSet),

    /// Messages that do not have the \Answered flag set.
    Unanswered,

    /// Messages that do not have the \Deleted flag set.
    Undeleted,

    /// Messages that do not have the \Draft flag set.
    Undraft,

    /// Messages that do not have the \Flagged flag set.
    Unflagged,

    /// Messages that do not have the specified keyword flag set.
    Unkeyword(Atom),

    /// Messages that do not have the \Seen flag set.
    Unseen,
}
