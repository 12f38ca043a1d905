//! An in-memory backend.
//!
//! Implements both [`Storage`] and [`Directory`] over plain maps behind one
//! mutex. Used by the integration tests and the demo binary; a production
//! deployment would put a database behind the same traits.

use std::{
    collections::{BTreeMap, BTreeSet},
    num::NonZeroU32,
    sync::Mutex,
};

use tokio::sync::broadcast;

use crate::{
    backend::{
        AppendOutcome, BackendError, ChangeEvent, CopyOutcome, Directory, ListItem, MailboxId,
        MailboxSnapshot, MessageMeta, Storage, StoreOutcome, User,
    },
    types::{
        acl::RightSet,
        command::AclModification,
        core::NString,
        datetime::DateTime,
        envelope::{Address, Envelope},
        flag::{Flag, FlagNameAttribute, StoreType},
        search::SearchKey,
        status::{StatusDataItem, StatusDataItemName},
    },
};

const DELIMITER: char = '/';
const EVENT_CAPACITY: usize = 128;

/// The bundled in-memory mail store and user directory.
#[derive(Debug)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    users: Vec<UserRecord>,
    next_mailbox_id: u64,
}

#[derive(Debug)]
struct UserRecord {
    user: User,
    secret: String,
    mailboxes: BTreeMap<String, Mbox>,
    subscriptions: BTreeSet<String>,
}

#[derive(Debug)]
struct Mbox {
    id: MailboxId,
    uid_validity: NonZeroU32,
    next_uid: u32,
    highest_modseq: u64,
    messages: BTreeMap<u32, Msg>,
    recent: BTreeSet<u32>,
    /// Rights granted to other users, by login.
    acl: BTreeMap<String, RightSet>,
    events: broadcast::Sender<ChangeEvent>,
}

#[derive(Clone, Debug)]
struct Msg {
    flags: Vec<Flag>,
    modseq: u64,
    internal_date: DateTime,
    data: std::sync::Arc<Vec<u8>>,
}

impl Mbox {
    fn new(id: MailboxId, uid_validity: NonZeroU32) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            id,
            uid_validity,
            next_uid: 1,
            highest_modseq: 1,
            messages: BTreeMap::new(),
            recent: BTreeSet::new(),
            acl: BTreeMap::new(),
            events,
        }
    }

    fn uid_next(&self) -> NonZeroU32 {
        // Safety: `next_uid` starts at 1 and only grows.
        NonZeroU32::new(self.next_uid).unwrap()
    }

    fn notify(&self, event: ChangeEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn add_message(
        &mut self,
        data: std::sync::Arc<Vec<u8>>,
        flags: Vec<Flag>,
        internal_date: DateTime,
    ) -> NonZeroU32 {
        let uid = self.uid_next();
        self.next_uid += 1;
        self.highest_modseq += 1;

        self.messages.insert(
            uid.get(),
            Msg {
                flags,
                modseq: self.highest_modseq,
                internal_date,
                data,
            },
        );
        self.recent.insert(uid.get());

        self.notify(ChangeEvent::Appended {
            uid,
            uid_next: self.uid_next(),
            recent: true,
        });

        uid
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                users: Vec::new(),
                next_mailbox_id: 1,
            }),
        }
    }

    /// Creates a user with an INBOX.
    pub fn add_user(&self, login: &str, secret: &str) -> User {
        let mut inner = self.inner.lock().unwrap();

        let user = User {
            id: inner.users.len() as u64 + 1,
            login: login.to_owned(),
        };

        let mut mailboxes = BTreeMap::new();
        let (id, uid_validity) = inner.allocate_mailbox_id();
        mailboxes.insert("INBOX".to_owned(), Mbox::new(id, uid_validity));

        inner.users.push(UserRecord {
            user: user.clone(),
            secret: secret.to_owned(),
            mailboxes,
            subscriptions: BTreeSet::from(["INBOX".to_owned()]),
        });

        user
    }

    /// Delivers a message into a user's mailbox, like an MDA would.
    pub fn deliver(&self, user: &User, mailbox: &str, message: &[u8]) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().unwrap();
        let mbox = inner.mailbox_of_mut(user, mailbox)?;

        mbox.add_message(
            std::sync::Arc::new(message.to_vec()),
            Vec::new(),
            DateTime::now(),
        );

        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// A fresh mailbox id, with a UIDVALIDITY derived from it. A re-created
    /// mailbox gets a new id and therefore a new UIDVALIDITY.
    fn allocate_mailbox_id(&mut self) -> (MailboxId, NonZeroU32) {
        let id = MailboxId(self.next_mailbox_id);
        self.next_mailbox_id += 1;

        // Safety: `next_mailbox_id` starts at 1.
        (id, NonZeroU32::new(id.0 as u32).unwrap())
    }

    fn record_of(&self, user: &User) -> Result<&UserRecord, BackendError> {
        self.users
            .iter()
            .find(|record| record.user.id == user.id)
            .ok_or(BackendError::NoSuchMailbox)
    }

    fn record_of_mut(&mut self, user: &User) -> Result<&mut UserRecord, BackendError> {
        self.users
            .iter_mut()
            .find(|record| record.user.id == user.id)
            .ok_or(BackendError::NoSuchMailbox)
    }

    fn mailbox_of(&self, user: &User, name: &str) -> Result<&Mbox, BackendError> {
        self.record_of(user)?
            .mailboxes
            .get(&canonical(name))
            .ok_or(BackendError::NoSuchMailbox)
    }

    fn mailbox_of_mut(&mut self, user: &User, name: &str) -> Result<&mut Mbox, BackendError> {
        self.record_of_mut(user)?
            .mailboxes
            .get_mut(&canonical(name))
            .ok_or(BackendError::NoSuchMailbox)
    }

    fn mailbox_by_id(&self, id: MailboxId) -> Result<&Mbox, BackendError> {
        self.users
            .iter()
            .flat_map(|record| record.mailboxes.values())
            .find(|mbox| mbox.id == id)
            .ok_or(BackendError::NoSuchMailbox)
    }

    fn mailbox_by_id_mut(&mut self, id: MailboxId) -> Result<&mut Mbox, BackendError> {
        self.users
            .iter_mut()
            .flat_map(|record| record.mailboxes.values_mut())
            .find(|mbox| mbox.id == id)
            .ok_or(BackendError::NoSuchMailbox)
    }
}

/// INBOX is case-insensitive; everything else is case-sensitive.
fn canonical(name: &str) -> String {
    if name.eq_ignore_ascii_case("INBOX") {
        "INBOX".to_owned()
    } else {
        name.to_owned()
    }
}

fn validate_name(name: &str) -> Result<(), BackendError> {
    if name.is_empty()
        || name.starts_with(DELIMITER)
        || name.ends_with(DELIMITER)
        || name.contains("//")
        || name.contains('\0')
    {
        return Err(BackendError::InvalidName);
    }

    Ok(())
}

impl Storage for MemoryBackend {
    async fn select(
        &self,
        user: &User,
        mailbox: &str,
        read_only: bool,
    ) -> Result<MailboxSnapshot, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        let mbox = inner.mailbox_of_mut(user, mailbox)?;

        let uids: Vec<NonZeroU32> = mbox
            .messages
            .keys()
            // Safety: UIDs are non-zero by construction.
            .map(|uid| NonZeroU32::new(*uid).unwrap())
            .collect();

        let recent: Vec<NonZeroU32> = mbox
            .recent
            .iter()
            .map(|uid| NonZeroU32::new(*uid).unwrap())
            .collect();

        let first_unseen = mbox
            .messages
            .iter()
            .find(|(_, msg)| !msg.flags.contains(&Flag::Seen))
            .map(|(uid, _)| NonZeroU32::new(*uid).unwrap());

        let mut flags: Vec<Flag> = vec![
            Flag::Answered,
            Flag::Flagged,
            Flag::Deleted,
            Flag::Seen,
            Flag::Draft,
        ];
        for msg in mbox.messages.values() {
            for flag in &msg.flags {
                if !flags.contains(flag) {
                    flags.push(flag.clone());
                }
            }
        }

        let snapshot = MailboxSnapshot {
            id: mbox.id,
            name: canonical(mailbox),
            uid_validity: mbox.uid_validity,
            uid_next: mbox.uid_next(),
            uids,
            recent,
            first_unseen,
            flags,
            highest_modseq: mbox.highest_modseq,
        };

        if !read_only {
            // This session took the \Recent status.
            mbox.recent.clear();
        }

        Ok(snapshot)
    }

    fn subscribe_events(
        &self,
        mailbox: MailboxId,
    ) -> Result<broadcast::Receiver<ChangeEvent>, BackendError> {
        let inner = self.inner.lock().unwrap();

        Ok(inner.mailbox_by_id(mailbox)?.events.subscribe())
    }

    async fn fetch_meta(
        &self,
        mailbox: MailboxId,
        uids: &[NonZeroU32],
    ) -> Result<Vec<MessageMeta>, BackendError> {
        let inner = self.inner.lock().unwrap();
        let mbox = inner.mailbox_by_id(mailbox)?;

        Ok(uids
            .iter()
            .filter_map(|uid| {
                mbox.messages.get(&uid.get()).map(|msg| MessageMeta {
                    uid: *uid,
                    flags: msg.flags.clone(),
                    modseq: msg.modseq,
                    internal_date: msg.internal_date,
                    size: msg.data.len() as u32,
                })
            })
            .collect())
    }

    async fn fetch_body(
        &self,
        mailbox: MailboxId,
        uid: NonZeroU32,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        let inner = self.inner.lock().unwrap();
        let mbox = inner.mailbox_by_id(mailbox)?;

        Ok(mbox
            .messages
            .get(&uid.get())
            .map(|msg| msg.data.as_ref().clone()))
    }

    async fn envelope(
        &self,
        mailbox: MailboxId,
        uid: NonZeroU32,
    ) -> Result<Option<Envelope>, BackendError> {
        let inner = self.inner.lock().unwrap();
        let mbox = inner.mailbox_by_id(mailbox)?;

        Ok(mbox
            .messages
            .get(&uid.get())
            .map(|msg| envelope_of(&msg.data)))
    }

    async fn modify_flags(
        &self,
        mailbox: MailboxId,
        uids: &[NonZeroU32],
        kind: StoreType,
        flags: &[Flag],
        unchanged_since: Option<u64>,
    ) -> Result<StoreOutcome, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        let mbox = inner.mailbox_by_id_mut(mailbox)?;

        let mut outcome = StoreOutcome::default();
        let mut events = Vec::new();

        for uid in uids {
            let Some(msg) = mbox.messages.get(&uid.get()) else {
                continue;
            };

            if let Some(unchanged_since) = unchanged_since {
                if msg.modseq > unchanged_since {
                    outcome.conflicted.push(*uid);
                    continue;
                }
            }

            let mut new_flags = match kind {
                StoreType::Replace => flags.to_vec(),
                StoreType::Add => {
                    let mut new_flags = msg.flags.clone();
                    for flag in flags {
                        if !new_flags.contains(flag) {
                            new_flags.push(flag.clone());
                        }
                    }
                    new_flags
                }
                StoreType::Remove => msg
                    .flags
                    .iter()
                    .filter(|flag| !flags.contains(flag))
                    .cloned()
                    .collect(),
            };
            new_flags.sort();
            new_flags.dedup();

            mbox.highest_modseq += 1;
            let modseq = mbox.highest_modseq;

            let msg = mbox.messages.get_mut(&uid.get()).unwrap();
            msg.flags = new_flags.clone();
            msg.modseq = modseq;

            outcome.updated.push(MessageMeta {
                uid: *uid,
                flags: new_flags.clone(),
                modseq,
                internal_date: msg.internal_date,
                size: msg.data.len() as u32,
            });

            events.push(ChangeEvent::FlagsChanged {
                uid: *uid,
                flags: new_flags,
                modseq,
            });
        }

        for event in events {
            mbox.notify(event);
        }

        Ok(outcome)
    }

    async fn search(
        &self,
        mailbox: MailboxId,
        criteria: &SearchKey,
        uid_view: &[NonZeroU32],
    ) -> Result<Vec<NonZeroU32>, BackendError> {
        let inner = self.inner.lock().unwrap();
        let mbox = inner.mailbox_by_id(mailbox)?;

        let mut hits = Vec::new();

        for (index, (uid, msg)) in mbox.messages.iter().enumerate() {
            let uid = NonZeroU32::new(*uid).unwrap();
            let msn = uid_view
                .iter()
                .position(|view_uid| *view_uid == uid)
                .map(|position| position + 1)
                .unwrap_or(index + 1) as u32;

            if evaluate(criteria, msg, uid, msn, mbox, uid_view) {
                hits.push(uid);
            }
        }

        Ok(hits)
    }

    async fn expunge(
        &self,
        mailbox: MailboxId,
        uids: Option<&[NonZeroU32]>,
    ) -> Result<Vec<NonZeroU32>, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        let mbox = inner.mailbox_by_id_mut(mailbox)?;

        let doomed: Vec<NonZeroU32> = mbox
            .messages
            .iter()
            .filter(|(uid, msg)| {
                msg.flags.contains(&Flag::Deleted)
                    && uids.map_or(true, |uids| {
                        uids.contains(&NonZeroU32::new(**uid).unwrap())
                    })
            })
            .map(|(uid, _)| NonZeroU32::new(*uid).unwrap())
            .collect();

        for uid in &doomed {
            mbox.messages.remove(&uid.get());
            mbox.recent.remove(&uid.get());
            mbox.notify(ChangeEvent::Expunged { uid: *uid });
        }

        Ok(doomed)
    }

    async fn append(
        &self,
        user: &User,
        mailbox: &str,
        message: &[u8],
        flags: &[Flag],
        date: Option<DateTime>,
    ) -> Result<AppendOutcome, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        let mbox = inner.mailbox_of_mut(user, mailbox)?;

        let uid = mbox.add_message(
            std::sync::Arc::new(message.to_vec()),
            flags.to_vec(),
            date.unwrap_or_else(DateTime::now),
        );

        Ok(AppendOutcome {
            uid_validity: mbox.uid_validity,
            uid,
        })
    }

    async fn copy(
        &self,
        source: MailboxId,
        uids: &[NonZeroU32],
        user: &User,
        target: &str,
    ) -> Result<CopyOutcome, BackendError> {
        let mut inner = self.inner.lock().unwrap();

        // Snapshot the source messages first; source and target may alias.
        let sources: Vec<(NonZeroU32, Msg)> = {
            let mbox = inner.mailbox_by_id(source)?;

            uids.iter()
                .filter_map(|uid| {
                    mbox.messages
                        .get(&uid.get())
                        .map(|msg| (*uid, msg.clone()))
                })
                .collect()
        };

        let target = inner.mailbox_of_mut(user, target)?;

        let mut pairs = Vec::with_capacity(sources.len());
        for (source_uid, msg) in sources {
            let new_uid = target.add_message(msg.data, msg.flags, msg.internal_date);
            pairs.push((source_uid, new_uid));
        }

        Ok(CopyOutcome {
            uid_validity: target.uid_validity,
            pairs,
        })
    }

    async fn create_mailbox(&self, user: &User, mailbox: &str) -> Result<(), BackendError> {
        validate_name(mailbox)?;

        let mut inner = self.inner.lock().unwrap();
        let (id, uid_validity) = inner.allocate_mailbox_id();
        let record = inner.record_of_mut(user)?;
        let name = canonical(mailbox);

        if record.mailboxes.contains_key(&name) {
            return Err(BackendError::MailboxExists);
        }

        record.mailboxes.insert(name, Mbox::new(id, uid_validity));

        Ok(())
    }

    async fn delete_mailbox(&self, user: &User, mailbox: &str) -> Result<(), BackendError> {
        let name = canonical(mailbox);

        if name == "INBOX" {
            return Err(BackendError::NotPermitted);
        }

        let mut inner = self.inner.lock().unwrap();
        let record = inner.record_of_mut(user)?;

        match record.mailboxes.remove(&name) {
            Some(mbox) => {
                mbox.notify(ChangeEvent::MailboxDeleted);
                record.subscriptions.remove(&name);
                Ok(())
            }
            None => Err(BackendError::NoSuchMailbox),
        }
    }

    async fn rename_mailbox(&self, user: &User, from: &str, to: &str) -> Result<(), BackendError> {
        validate_name(to)?;

        let from = canonical(from);
        let to = canonical(to);

        if to == "INBOX" {
            return Err(BackendError::MailboxExists);
        }

        let mut inner = self.inner.lock().unwrap();

        if inner.record_of(user)?.mailboxes.contains_key(&to) {
            return Err(BackendError::MailboxExists);
        }

        if from == "INBOX" {
            // Renaming INBOX moves its messages to a new mailbox and leaves
            // an empty INBOX behind.
            let (id, uid_validity) = inner.allocate_mailbox_id();
            let record = inner.record_of_mut(user)?;
            let inbox = record
                .mailboxes
                .get_mut("INBOX")
                .ok_or(BackendError::NoSuchMailbox)?;

            let mut moved = Mbox::new(id, uid_validity);
            moved.next_uid = inbox.next_uid;
            moved.highest_modseq = inbox.highest_modseq;
            moved.messages = std::mem::take(&mut inbox.messages);
            moved.recent = std::mem::take(&mut inbox.recent);

            for uid in moved.messages.keys() {
                inbox.notify(ChangeEvent::Expunged {
                    uid: NonZeroU32::new(*uid).unwrap(),
                });
            }

            record.mailboxes.insert(to, moved);

            return Ok(());
        }

        let record = inner.record_of_mut(user)?;

        if !record.mailboxes.contains_key(&from) {
            return Err(BackendError::NoSuchMailbox);
        }

        // Children move along with the renamed mailbox.
        let prefix = format!("{from}{DELIMITER}");
        let doomed_names: Vec<String> = record
            .mailboxes
            .keys()
            .filter(|name| **name == from || name.starts_with(&prefix))
            .cloned()
            .collect();

        for name in doomed_names {
            let mbox = record.mailboxes.remove(&name).unwrap();
            let new_name = format!("{to}{}", &name[from.len()..]);
            if record.subscriptions.remove(&name) {
                record.subscriptions.insert(new_name.clone());
            }
            record.mailboxes.insert(new_name, mbox);
        }

        Ok(())
    }

    async fn list(
        &self,
        user: &User,
        reference: &str,
        pattern: &str,
    ) -> Result<Vec<ListItem>, BackendError> {
        let inner = self.inner.lock().unwrap();
        let record = inner.record_of(user)?;

        Ok(list_candidates(record)
            .into_iter()
            .filter(|name| matches_pattern(name, &format!("{reference}{pattern}")))
            .map(|name| list_item(record, name))
            .collect())
    }

    async fn list_subscribed(
        &self,
        user: &User,
        reference: &str,
        pattern: &str,
    ) -> Result<Vec<ListItem>, BackendError> {
        let inner = self.inner.lock().unwrap();
        let record = inner.record_of(user)?;

        Ok(record
            .subscriptions
            .iter()
            .filter(|name| matches_pattern(name, &format!("{reference}{pattern}")))
            .map(|name| list_item(record, name.clone()))
            .collect())
    }

    async fn subscribe(
        &self,
        user: &User,
        mailbox: &str,
        subscribed: bool,
    ) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.record_of_mut(user)?;
        let name = canonical(mailbox);

        if subscribed {
            if !record.mailboxes.contains_key(&name) {
                return Err(BackendError::NoSuchMailbox);
            }
            record.subscriptions.insert(name);
        } else {
            record.subscriptions.remove(&name);
        }

        Ok(())
    }

    async fn status(
        &self,
        user: &User,
        mailbox: &str,
        items: &[StatusDataItemName],
    ) -> Result<Vec<StatusDataItem>, BackendError> {
        let inner = self.inner.lock().unwrap();
        let mbox = inner.mailbox_of(user, mailbox)?;

        Ok(items
            .iter()
            .map(|item| match item {
                StatusDataItemName::Messages => {
                    StatusDataItem::Messages(mbox.messages.len() as u32)
                }
                StatusDataItemName::Recent => StatusDataItem::Recent(mbox.recent.len() as u32),
                StatusDataItemName::UidNext => StatusDataItem::UidNext(mbox.uid_next()),
                StatusDataItemName::UidValidity => {
                    StatusDataItem::UidValidity(mbox.uid_validity)
                }
                StatusDataItemName::Unseen => StatusDataItem::Unseen(
                    mbox.messages
                        .values()
                        .filter(|msg| !msg.flags.contains(&Flag::Seen))
                        .count() as u32,
                ),
                StatusDataItemName::HighestModSeq => {
                    StatusDataItem::HighestModSeq(mbox.highest_modseq)
                }
            })
            .collect())
    }

    async fn get_acl(
        &self,
        user: &User,
        mailbox: &str,
    ) -> Result<Vec<(String, RightSet)>, BackendError> {
        let inner = self.inner.lock().unwrap();
        let record = inner.record_of(user)?;
        let mbox = inner.mailbox_of(user, mailbox)?;

        let mut entries = vec![(record.user.login.clone(), RightSet::all())];
        entries.extend(
            mbox.acl
                .iter()
                .map(|(login, rights)| (login.clone(), rights.clone())),
        );

        Ok(entries)
    }

    async fn set_acl(
        &self,
        user: &User,
        mailbox: &str,
        identifier: &str,
        modification: &AclModification,
    ) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.record_of(user)?.user.login == identifier {
            // The owner's rights are immutable here.
            return Err(BackendError::NotPermitted);
        }

        let mbox = inner.mailbox_of_mut(user, mailbox)?;
        let current = mbox.acl.entry(identifier.to_owned()).or_default();

        match modification {
            AclModification::Replace(rights) => *current = rights.clone(),
            AclModification::Add(rights) => {
                for right in rights.iter() {
                    current.insert(right);
                }
            }
            AclModification::Remove(rights) => {
                for right in rights.iter() {
                    current.remove(right);
                }
            }
        }

        if current.is_empty() {
            mbox.acl.remove(identifier);
        }

        Ok(())
    }
}

impl Directory for MemoryBackend {
    async fn resolve_login(&self, login: &str) -> Result<Option<User>, BackendError> {
        let inner = self.inner.lock().unwrap();

        Ok(inner
            .users
            .iter()
            .find(|record| record.user.login == login)
            .map(|record| record.user.clone()))
    }

    async fn verify_secret(&self, user: &User, secret: &[u8]) -> Result<bool, BackendError> {
        let inner = self.inner.lock().unwrap();
        let record = inner.record_of(user)?;

        Ok(record.secret.as_bytes() == secret)
    }

    async fn secret(&self, user: &User) -> Result<Option<String>, BackendError> {
        let inner = self.inner.lock().unwrap();

        Ok(Some(inner.record_of(user)?.secret.clone()))
    }

    async fn permissions(&self, _user: &User, _mailbox: &str) -> Result<RightSet, BackendError> {
        // Foreign mailboxes are not addressable by name in this backend, so
        // anything a user can name lives in their own namespace and they
        // hold all rights on it, whether it exists yet or not. Existence is
        // the storage layer's verdict, not a permission question.
        Ok(RightSet::all())
    }
}

// ----- LIST helpers ------------------------------------------------------------------------------

/// Actual mailboxes plus the implied (non-selectable) intermediate nodes.
fn list_candidates(record: &UserRecord) -> Vec<String> {
    let mut names = BTreeSet::new();

    for name in record.mailboxes.keys() {
        let mut prefix = String::new();

        for part in name.split(DELIMITER) {
            if !prefix.is_empty() {
                prefix.push(DELIMITER);
            }
            prefix.push_str(part);
            names.insert(prefix.clone());
        }
    }

    names.into_iter().collect()
}

fn list_item(record: &UserRecord, name: String) -> ListItem {
    let prefix = format!("{name}{DELIMITER}");
    let has_children = record
        .mailboxes
        .keys()
        .any(|other| other.starts_with(&prefix));

    let mut attributes = Vec::new();

    if !record.mailboxes.contains_key(&name) {
        attributes.push(FlagNameAttribute::Noselect);
    }

    attributes.push(if has_children {
        FlagNameAttribute::HasChildren
    } else {
        FlagNameAttribute::HasNoChildren
    });

    ListItem {
        name,
        delimiter: DELIMITER,
        attributes,
    }
}

/// Matches a mailbox name against a LIST pattern.
///
/// `*` matches anything, `%` matches anything except the hierarchy
/// delimiter. Both operate on bytes; the delimiter is ASCII, so multi-byte
/// UTF-8 sequences pass through unharmed.
pub(crate) fn matches_pattern(name: &str, pattern: &str) -> bool {
    fn go(name: &[u8], pattern: &[u8]) -> bool {
        match pattern.split_first() {
            None => name.is_empty(),
            Some((b'*', rest)) => {
                go(name, rest) || (!name.is_empty() && go(&name[1..], pattern))
            }
            Some((b'%', rest)) => {
                go(name, rest)
                    || (name.first().is_some_and(|b| *b != DELIMITER as u8)
                        && go(&name[1..], pattern))
            }
            Some((byte, rest)) => match name.split_first() {
                Some((name_byte, name_rest)) if name_byte == byte => go(name_rest, rest),
                _ => false,
            },
        }
    }

    go(name.as_bytes(), pattern.as_bytes())
}

// ----- Message inspection ------------------------------------------------------------------------

use crate::backend::{body_block, contains_ignore_case, header_value};

fn nstring_of(value: Option<String>) -> NString {
    match value {
        Some(value) => NString::try_from(value.as_str()).unwrap_or_else(|_| NString::nil()),
        None => NString::nil(),
    }
}

/// Computes the envelope structure from the RFC 2822 header.
pub(crate) fn envelope_of(data: &[u8]) -> Envelope {
    let from = address_list(header_value(data, "From"));
    let sender = {
        let sender = address_list(header_value(data, "Sender"));
        if sender.is_empty() {
            from.clone()
        } else {
            sender
        }
    };
    let reply_to = {
        let reply_to = address_list(header_value(data, "Reply-To"));
        if reply_to.is_empty() {
            from.clone()
        } else {
            reply_to
        }
    };

    Envelope {
        date: nstring_of(header_value(data, "Date")),
        subject: nstring_of(header_value(data, "Subject")),
        from,
        sender,
        reply_to,
        to: address_list(header_value(data, "To")),
        cc: address_list(header_value(data, "Cc")),
        bcc: address_list(header_value(data, "Bcc")),
        in_reply_to: nstring_of(header_value(data, "In-Reply-To")),
        message_id: nstring_of(header_value(data, "Message-ID")),
    }
}

/// A rough parse of an address header value.
///
/// Understands `Display Name <local@host>` and bare `local@host` forms,
/// separated by commas. Anything else degenerates to a host-less mailbox,
/// which is what clients show verbatim.
fn address_list(value: Option<String>) -> Vec<Address> {
    let Some(value) = value else {
        return Vec::new();
    };

    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (name, addr) = match (part.find('<'), part.rfind('>')) {
                (Some(open), Some(close)) if open < close => {
                    let name = part[..open].trim().trim_matches('"');
                    (
                        if name.is_empty() { None } else { Some(name) },
                        &part[open + 1..close],
                    )
                }
                _ => (None, part),
            };

            let (mailbox, host) = match addr.rsplit_once('@') {
                Some((mailbox, host)) => (mailbox, Some(host)),
                None => (addr, None),
            };

            Address {
                name: nstring_of(name.map(str::to_owned)),
                adl: NString::nil(),
                mailbox: nstring_of(Some(mailbox.to_owned())),
                host: nstring_of(host.map(str::to_owned)),
            }
        })
        .collect()
}

// ----- SEARCH evaluation -------------------------------------------------------------------------

fn has_flag(msg: &Msg, flag: &Flag) -> bool {
    msg.flags.contains(flag)
}

fn is_recent(mbox: &Mbox, uid: NonZeroU32) -> bool {
    mbox.recent.contains(&uid.get())
}

fn date_of(msg: &Msg) -> chrono::NaiveDate {
    msg.internal_date.inner().date_naive()
}

fn sent_date_of(msg: &Msg) -> Option<chrono::NaiveDate> {
    let value = header_value(&msg.data, "Date")?;

    chrono::DateTime::parse_from_rfc2822(&value)
        .ok()
        .map(|datetime| datetime.date_naive())
}

fn evaluate(
    criteria: &SearchKey,
    msg: &Msg,
    uid: NonZeroU32,
    msn: u32,
    mbox: &Mbox,
    uid_view: &[NonZeroU32],
) -> bool {
    let largest_msn = NonZeroU32::new(uid_view.len().max(1) as u32).unwrap();
    let largest_uid = mbox
        .messages
        .keys()
        .last()
        .and_then(|uid| NonZeroU32::new(*uid))
        .unwrap_or(NonZeroU32::MIN);

    match criteria {
        SearchKey::And(keys) => keys
            .as_ref()
            .iter()
            .all(|key| evaluate(key, msg, uid, msn, mbox, uid_view)),
        SearchKey::Not(key) => !evaluate(key, msg, uid, msn, mbox, uid_view),
        SearchKey::Or(a, b) => {
            evaluate(a, msg, uid, msn, mbox, uid_view)
                || evaluate(b, msg, uid, msn, mbox, uid_view)
        }

        SearchKey::All => true,
        SearchKey::SequenceSet(set) => match NonZeroU32::new(msn) {
            Some(msn) => set.contains(msn, largest_msn),
            None => false,
        },
        SearchKey::Uid(set) => set.contains(uid, largest_uid),

        SearchKey::Answered => has_flag(msg, &Flag::Answered),
        SearchKey::Unanswered => !has_flag(msg, &Flag::Answered),
        SearchKey::Deleted => has_flag(msg, &Flag::Deleted),
        SearchKey::Undeleted => !has_flag(msg, &Flag::Deleted),
        SearchKey::Draft => has_flag(msg, &Flag::Draft),
        SearchKey::Undraft => !has_flag(msg, &Flag::Draft),
        SearchKey::Flagged => has_flag(msg, &Flag::Flagged),
        SearchKey::Unflagged => !has_flag(msg, &Flag::Flagged),
        SearchKey::Seen => has_flag(msg, &Flag::Seen),
        SearchKey::Unseen => !has_flag(msg, &Flag::Seen),
        SearchKey::Keyword(keyword) => has_flag(msg, &Flag::Keyword(keyword.clone())),
        SearchKey::Unkeyword(keyword) => !has_flag(msg, &Flag::Keyword(keyword.clone())),
        SearchKey::Recent => is_recent(mbox, uid),
        SearchKey::Old => !is_recent(mbox, uid),
        SearchKey::New => is_recent(mbox, uid) && !has_flag(msg, &Flag::Seen),

        SearchKey::Larger(size) => msg.data.len() as u32 > *size,
        SearchKey::Smaller(size) => (msg.data.len() as u32) < *size,

        SearchKey::Before(date) => date_of(msg) < *date.inner(),
        SearchKey::On(date) => date_of(msg) == *date.inner(),
        SearchKey::Since(date) => date_of(msg) >= *date.inner(),
        SearchKey::SentBefore(date) => {
            sent_date_of(msg).is_some_and(|sent| sent < *date.inner())
        }
        SearchKey::SentOn(date) => sent_date_of(msg).is_some_and(|sent| sent == *date.inner()),
        SearchKey::SentSince(date) => {
            sent_date_of(msg).is_some_and(|sent| sent >= *date.inner())
        }

        SearchKey::Bcc(needle) => header_contains(&msg.data, "Bcc", needle.as_bytes()),
        SearchKey::Cc(needle) => header_contains(&msg.data, "Cc", needle.as_bytes()),
        SearchKey::From(needle) => header_contains(&msg.data, "From", needle.as_bytes()),
        SearchKey::To(needle) => header_contains(&msg.data, "To", needle.as_bytes()),
        SearchKey::Subject(needle) => header_contains(&msg.data, "Subject", needle.as_bytes()),
        SearchKey::Header(field, needle) => match field.to_str() {
            Some(field) => match header_value(&msg.data, field) {
                Some(value) => contains_ignore_case(value.as_bytes(), needle.as_bytes()),
                None => false,
            },
            None => false,
        },
        SearchKey::Body(needle) => contains_ignore_case(body_block(&msg.data), needle.as_bytes()),
        SearchKey::Text(needle) => contains_ignore_case(&msg.data, needle.as_bytes()),
    }
}

fn header_contains(data: &[u8], field: &str, needle: &[u8]) -> bool {
    match header_value(data, field) {
        Some(value) => contains_ignore_case(value.as_bytes(), needle),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with_message() -> (MemoryBackend, User, MailboxId) {
        let backend = MemoryBackend::new();
        let user = backend.add_user("alice", "secret");

        backend
            .deliver(
                &user,
                "INBOX",
                b"From: Bob <bob@example.org>\r\n\
                  To: alice@example.org\r\n\
                  Subject: lunch?\r\n\
                  Date: Thu, 12 Oct 2023 08:45:28 +0000\r\n\
                  Message-ID: <1@example.org>\r\n\
                  \r\n\
                  How about tomorrow?\r\n",
            )
            .unwrap();

        let id = {
            let inner = backend.inner.lock().unwrap();
            inner.mailbox_of(&user, "INBOX").unwrap().id
        };

        (backend, user, id)
    }

    #[tokio::test]
    async fn test_select_snapshot() {
        let (backend, user, _) = backend_with_message();

        let snapshot = backend.select(&user, "inbox", false).await.unwrap();
        assert_eq!(snapshot.uids.len(), 1);
        assert_eq!(snapshot.recent.len(), 1);
        assert_eq!(snapshot.uid_next.get(), 2);
        assert_eq!(snapshot.first_unseen, Some(NonZeroU32::new(1).unwrap()));

        // The first select took the \Recent status.
        let snapshot = backend.select(&user, "INBOX", false).await.unwrap();
        assert_eq!(snapshot.recent.len(), 0);
    }

    #[tokio::test]
    async fn test_examine_keeps_recent() {
        let (backend, user, _) = backend_with_message();

        let snapshot = backend.select(&user, "INBOX", true).await.unwrap();
        assert_eq!(snapshot.recent.len(), 1);

        let snapshot = backend.select(&user, "INBOX", true).await.unwrap();
        assert_eq!(snapshot.recent.len(), 1);
    }

    #[tokio::test]
    async fn test_store_unchanged_since_conflict() {
        let (backend, _user, id) = backend_with_message();
        let uid = NonZeroU32::new(1).unwrap();

        // Bump the modseq.
        backend
            .modify_flags(id, &[uid], StoreType::Add, &[Flag::Seen], None)
            .await
            .unwrap();

        let outcome = backend
            .modify_flags(id, &[uid], StoreType::Add, &[Flag::Deleted], Some(1))
            .await
            .unwrap();

        assert!(outcome.updated.is_empty());
        assert_eq!(outcome.conflicted, vec![uid]);
    }

    #[tokio::test]
    async fn test_expunge_only_removes_deleted() {
        let (backend, user, id) = backend_with_message();
        backend.deliver(&user, "INBOX", b"\r\nsecond\r\n").unwrap();

        let uid = NonZeroU32::new(1).unwrap();
        backend
            .modify_flags(id, &[uid], StoreType::Add, &[Flag::Deleted], None)
            .await
            .unwrap();

        let expunged = backend.expunge(id, None).await.unwrap();
        assert_eq!(expunged, vec![uid]);

        let snapshot = backend.select(&user, "INBOX", true).await.unwrap();
        assert_eq!(snapshot.uids.len(), 1);
    }

    #[tokio::test]
    async fn test_search() {
        let (backend, user, id) = backend_with_message();
        let view = backend.select(&user, "INBOX", true).await.unwrap().uids;

        let hits = backend
            .search(
                id,
                &SearchKey::Subject(crate::types::core::AString::try_from("lunch").unwrap()),
                &view,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let hits = backend
            .search(id, &SearchKey::Seen, &view)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_rename_moves_children() {
        let (backend, user, _) = backend_with_message();

        backend.create_mailbox(&user, "work").await.unwrap();
        backend.create_mailbox(&user, "work/reports").await.unwrap();
        backend.rename_mailbox(&user, "work", "projects").await.unwrap();

        let names: Vec<String> = backend
            .list(&user, "", "*")
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.name)
            .collect();

        assert!(names.contains(&"projects".to_owned()));
        assert!(names.contains(&"projects/reports".to_owned()));
        assert!(!names.contains(&"work".to_owned()));
    }

    #[test]
    fn test_matches_pattern() {
        let tests = [
            ("INBOX", "*", true),
            ("INBOX", "%", true),
            ("INBOX", "INBOX", true),
            ("INBOX", "inbox", false),
            ("work/reports", "*", true),
            ("work/reports", "%", false),
            ("work/reports", "work/%", true),
            ("work/reports/2024", "work/%", false),
            ("work/reports/2024", "work/*", true),
            ("work", "w%k", true),
        ];

        for (name, pattern, expected) in tests {
            assert_eq!(matches_pattern(name, pattern), expected, "{name} {pattern}");
        }
    }

    #[test]
    fn test_envelope_of() {
        let data = b"From: Bob <bob@example.org>\r\n\
                     Subject: lunch?\r\n\
                     To: alice@example.org, Carol <carol@example.org>\r\n\
                     \r\n\
                     body\r\n";

        let envelope = envelope_of(data);

        assert_eq!(envelope.to.len(), 2);
        assert_eq!(
            envelope.subject.as_bytes(),
            Some(b"lunch?".as_ref()),
        );
        // Sender defaults to From.
        assert_eq!(envelope.sender, envelope.from);
    }

    #[test]
    fn test_header_value_unfolds() {
        let data = b"Subject: a\r\n very\r\n\tlong subject\r\n\r\n";

        assert_eq!(
            header_value(data, "subject").as_deref(),
            Some("a very long subject"),
        );
    }
}
