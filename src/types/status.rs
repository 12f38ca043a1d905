//! Status-related types.

use std::num::NonZeroU32;

/// Status data item name used to request a status data item.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StatusDataItemName {
    /// The number of messages in the mailbox.
    Messages,

    /// The number of messages with the \Recent flag set.
    Recent,

    /// The next unique identifier value of the mailbox.
    UidNext,

    /// The unique identifier validity value of the mailbox.
    UidValidity,

    /// The number of messages which do not have the \Seen flag set.
    Unseen,

    /// The highest mod-sequence of the mailbox (CONDSTORE).
    HighestModSeq,
}

/// Status data item.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StatusDataItem {
    Messages(u32),
    Recent(u32),
    UidNext(NonZeroU32),
    UidValidity(NonZeroU32),
    Unseen(u32),
    HighestModSeq(u64),
}
