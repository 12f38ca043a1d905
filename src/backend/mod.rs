//! Contracts between the IMAP engine and its collaborators.
//!
//! The engine owns no mail. Everything it serves comes from a [`Storage`]
//! implementation, and everybody it talks to is authenticated against a
//! [`Directory`] implementation. Both traits are async at every method so
//! that an implementation backed by a database can suspend; the bundled
//! [`MemoryBackend`](memory::MemoryBackend) answers immediately and is used
//! by the test suite and the demo binary.
//!
//! Mailboxes are shared across connections. All mutations go through the
//! storage engine, which is responsible for transactional ordering; sessions
//! observe foreign mutations through the per-mailbox [`ChangeEvent`] stream
//! obtained from [`Storage::subscribe_events`].

pub mod memory;

use std::{future::Future, num::NonZeroU32};

use thiserror::Error;
use tokio::sync::broadcast;

use crate::types::{
    acl::RightSet,
    command::AclModification,
    datetime::DateTime,
    envelope::Envelope,
    flag::{Flag, FlagNameAttribute, StoreType},
    search::SearchKey,
    status::{StatusDataItem, StatusDataItemName},
};

/// An authenticated user.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct User {
    pub id: u64,
    pub login: String,
}

/// An opaque handle to a mailbox, stable for the lifetime of the mailbox.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct MailboxId(pub u64);

/// What a session learns about a mailbox when selecting it.
#[derive(Clone, Debug)]
pub struct MailboxSnapshot {
    pub id: MailboxId,
    /// Decoded (UTF-8) name.
    pub name: String,
    pub uid_validity: NonZeroU32,
    pub uid_next: NonZeroU32,
    /// All UIDs, ascending. MSN `n` is `uids[n - 1]`.
    pub uids: Vec<NonZeroU32>,
    /// UIDs with the `\Recent` flag for this session.
    pub recent: Vec<NonZeroU32>,
    /// UID of the first message without `\Seen`, if any.
    pub first_unseen: Option<NonZeroU32>,
    /// Flags in use in the mailbox.
    pub flags: Vec<Flag>,
    pub highest_modseq: u64,
}

/// Per-message metadata, the unit of [`Storage::fetch_meta`].
#[derive(Clone, Debug)]
pub struct MessageMeta {
    pub uid: NonZeroU32,
    pub flags: Vec<Flag>,
    pub modseq: u64,
    pub internal_date: DateTime,
    pub size: u32,
}

/// Result of a flag modification.
#[derive(Clone, Debug, Default)]
pub struct StoreOutcome {
    /// Messages whose flags were modified, with their new state.
    pub updated: Vec<MessageMeta>,
    /// UIDs skipped because their modseq exceeded UNCHANGEDSINCE.
    pub conflicted: Vec<NonZeroU32>,
}

/// Result of an APPEND.
#[derive(Clone, Copy, Debug)]
pub struct AppendOutcome {
    pub uid_validity: NonZeroU32,
    pub uid: NonZeroU32,
}

/// Result of a COPY.
#[derive(Clone, Debug)]
pub struct CopyOutcome {
    pub uid_validity: NonZeroU32,
    /// `(source uid, destination uid)`, in message order.
    pub pairs: Vec<(NonZeroU32, NonZeroU32)>,
}

/// One name produced by [`Storage::list`].
#[derive(Clone, Debug)]
pub struct ListItem {
    /// Decoded (UTF-8) name.
    pub name: String,
    pub delimiter: char,
    pub attributes: Vec<FlagNameAttribute>,
}

/// A change made to a mailbox, possibly by another session.
///
/// UIDNEXT propagation rides on this stream as well; there is no separate
/// notification bus.
#[derive(Clone, Debug)]
pub enum ChangeEvent {
    /// A message was added to the mailbox.
    Appended {
        uid: NonZeroU32,
        uid_next: NonZeroU32,
        /// Whether the message is still `\Recent` for the next session.
        recent: bool,
    },
    /// A message was removed from the mailbox.
    Expunged { uid: NonZeroU32 },
    /// The flags of a message changed.
    FlagsChanged {
        uid: NonZeroU32,
        flags: Vec<Flag>,
        modseq: u64,
    },
    /// The mailbox itself is gone; sessions must detach.
    MailboxDeleted,
}

/// Errors reported by [`Storage`] and [`Directory`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BackendError {
    #[error("No such mailbox")]
    NoSuchMailbox,
    #[error("Mailbox exists")]
    MailboxExists,
    #[error("No such message")]
    NoSuchMessage,
    #[error("Invalid mailbox name")]
    InvalidName,
    #[error("Operation not permitted")]
    NotPermitted,
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// The storage engine contract.
///
/// All UID lists are ascending. UIDs are mailbox-scoped, assigned at append
/// time, monotonically increasing, and never reused.
pub trait Storage: Send + Sync + 'static {
    /// Opens a mailbox and takes a consistent snapshot of its state.
    ///
    /// A read-write select consumes the `\Recent` status: a subsequent
    /// session will not see the same messages `\Recent` again. A read-only
    /// select (EXAMINE) leaves it untouched.
    fn select(
        &self,
        user: &User,
        mailbox: &str,
        read_only: bool,
    ) -> impl Future<Output = Result<MailboxSnapshot, BackendError>> + Send;

    /// Subscribes to changes of a mailbox.
    fn subscribe_events(
        &self,
        mailbox: MailboxId,
    ) -> Result<broadcast::Receiver<ChangeEvent>, BackendError>;

    /// Fetches metadata for the given UIDs. Unknown UIDs are skipped.
    fn fetch_meta(
        &self,
        mailbox: MailboxId,
        uids: &[NonZeroU32],
    ) -> impl Future<Output = Result<Vec<MessageMeta>, BackendError>> + Send;

    /// Fetches the full message text for one UID.
    fn fetch_body(
        &self,
        mailbox: MailboxId,
        uid: NonZeroU32,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, BackendError>> + Send;

    /// Computes the envelope structure for one UID.
    fn envelope(
        &self,
        mailbox: MailboxId,
        uid: NonZeroU32,
    ) -> impl Future<Output = Result<Option<Envelope>, BackendError>> + Send;

    /// Sets, adds or removes flags for the given UIDs.
    ///
    /// With `unchanged_since`, messages whose modseq is higher are left
    /// untouched and reported in [`StoreOutcome::conflicted`].
    fn modify_flags(
        &self,
        mailbox: MailboxId,
        uids: &[NonZeroU32],
        kind: StoreType,
        flags: &[Flag],
        unchanged_since: Option<u64>,
    ) -> impl Future<Output = Result<StoreOutcome, BackendError>> + Send;

    /// Evaluates the search criteria; returns matching UIDs in ascending order.
    ///
    /// MSN-form sequence sets inside the criteria are resolved against
    /// `uid_view`, the session's current MSN-to-UID mapping.
    fn search(
        &self,
        mailbox: MailboxId,
        criteria: &SearchKey,
        uid_view: &[NonZeroU32],
    ) -> impl Future<Output = Result<Vec<NonZeroU32>, BackendError>> + Send;

    /// Removes messages carrying `\Deleted`, optionally restricted to a UID
    /// set. Returns the expunged UIDs in ascending order.
    fn expunge(
        &self,
        mailbox: MailboxId,
        uids: Option<&[NonZeroU32]>,
    ) -> impl Future<Output = Result<Vec<NonZeroU32>, BackendError>> + Send;

    /// Creates a new message.
    fn append(
        &self,
        user: &User,
        mailbox: &str,
        message: &[u8],
        flags: &[Flag],
        date: Option<DateTime>,
    ) -> impl Future<Output = Result<AppendOutcome, BackendError>> + Send;

    /// Copies messages into a target mailbox.
    fn copy(
        &self,
        source: MailboxId,
        uids: &[NonZeroU32],
        user: &User,
        target: &str,
    ) -> impl Future<Output = Result<CopyOutcome, BackendError>> + Send;

    fn create_mailbox(
        &self,
        user: &User,
        mailbox: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn delete_mailbox(
        &self,
        user: &User,
        mailbox: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn rename_mailbox(
        &self,
        user: &User,
        from: &str,
        to: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Names matching `pattern` (with `%` and `*` wildcards) under
    /// `reference`, with name attributes.
    fn list(
        &self,
        user: &User,
        reference: &str,
        pattern: &str,
    ) -> impl Future<Output = Result<Vec<ListItem>, BackendError>> + Send;

    /// Like [`Storage::list`], restricted to subscribed names.
    fn list_subscribed(
        &self,
        user: &User,
        reference: &str,
        pattern: &str,
    ) -> impl Future<Output = Result<Vec<ListItem>, BackendError>> + Send;

    fn subscribe(
        &self,
        user: &User,
        mailbox: &str,
        subscribed: bool,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn status(
        &self,
        user: &User,
        mailbox: &str,
        items: &[StatusDataItemName],
    ) -> impl Future<Output = Result<Vec<StatusDataItem>, BackendError>> + Send;

    fn get_acl(
        &self,
        user: &User,
        mailbox: &str,
    ) -> impl Future<Output = Result<Vec<(String, RightSet)>, BackendError>> + Send;

    fn set_acl(
        &self,
        user: &User,
        mailbox: &str,
        identifier: &str,
        modification: &AclModification,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

// ----- Message text helpers ----------------------------------------------------------------------
//
// Shared by storage implementations (SEARCH, ENVELOPE) and the FETCH
// handlers (body section slicing).

/// The header block, up to and including the empty line.
pub(crate) fn header_block(data: &[u8]) -> &[u8] {
    match find(data, b"\r\n\r\n") {
        Some(at) => &data[..at + 4],
        None => data,
    }
}

/// The body, after the empty line.
pub(crate) fn body_block(data: &[u8]) -> &[u8] {
    match find(data, b"\r\n\r\n") {
        Some(at) => &data[at + 4..],
        None => &[],
    }
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

pub(crate) fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }

    haystack
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}

/// The unfolded value of the first header line named `name`.
pub(crate) fn header_value(data: &[u8], name: &str) -> Option<String> {
    let header = header_block(data);
    let mut lines = header.split(|b| *b == b'\n').peekable();

    while let Some(line) = lines.next() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(colon) = line.iter().position(|b| *b == b':') else {
            continue;
        };

        if !line[..colon]
            .trim_ascii()
            .eq_ignore_ascii_case(name.as_bytes())
        {
            continue;
        }

        let mut value = line[colon + 1..].to_vec();

        // Unfold continuation lines.
        while let Some(next) = lines.peek() {
            if next.starts_with(b" ") || next.starts_with(b"\t") {
                let next = lines.next().unwrap();
                let next = next.strip_suffix(b"\r").unwrap_or(next);
                value.push(b' ');
                value.extend_from_slice(next.trim_ascii());
            } else {
                break;
            }
        }

        return Some(String::from_utf8_lossy(value.trim_ascii()).into_owned());
    }

    None
}

/// The authentication backend contract.
pub trait Directory: Send + Sync + 'static {
    /// Resolves a login name.
    fn resolve_login(
        &self,
        login: &str,
    ) -> impl Future<Output = Result<Option<User>, BackendError>> + Send;

    /// Verifies a cleartext secret, e.g., for LOGIN and AUTHENTICATE PLAIN.
    fn verify_secret(
        &self,
        user: &User,
        secret: &[u8],
    ) -> impl Future<Output = Result<bool, BackendError>> + Send;

    /// The stored secret, for challenge-response mechanisms (CRAM-MD5).
    ///
    /// Returns `None` when the secret is not recoverable, in which case
    /// challenge-response authentication fails.
    fn secret(
        &self,
        user: &User,
    ) -> impl Future<Output = Result<Option<String>, BackendError>> + Send;

    /// The rights `user` holds on `mailbox`.
    fn permissions(
        &self,
        user: &User,
        mailbox: &str,
    ) -> impl Future<Output = Result<RightSet, BackendError>> + Send;
}
