//! The per-connection view of the selected mailbox.
//!
//! The session tracks what the client knows: the MSN-to-UID mapping, the
//! recent set, and the highest modseq the client has seen. Changes made by
//! other sessions arrive as [`ChangeEvent`]s and are buffered; they are
//! folded into the view and turned into untagged responses only at
//! well-defined emission points, so that the client's MSN mapping stays
//! stable while a command's output is produced.
//!
//! EXPUNGE is the delicate part: a buffered expunge may only be released
//! between commands (or during IDLE), never while a command that enumerated
//! MSNs is still emitting. Released expunges are reported in descending MSN
//! order so the client never has to renumber behind the server's back.

use std::{
    collections::{BTreeSet, HashSet},
    num::NonZeroU32,
};

use tokio::sync::broadcast;

use crate::{
    backend::{ChangeEvent, MailboxId, MailboxSnapshot},
    types::{
        acl::RightSet,
        core::Vec1,
        fetch::MessageDataItem,
        flag::{Flag, FlagFetch},
        response::{Data, Response},
        sequence::SequenceSet,
    },
};

#[derive(Debug)]
pub(crate) struct Session {
    pub mailbox_id: MailboxId,
    pub mailbox_name: String,
    pub read_only: bool,
    pub uid_validity: NonZeroU32,
    pub uid_next: NonZeroU32,
    /// The client's view: MSN `n` is `uids[n - 1]`.
    uids: Vec<NonZeroU32>,
    pub recent: BTreeSet<NonZeroU32>,
    pub first_unseen: Option<NonZeroU32>,
    pub flags: Vec<Flag>,
    pub highest_modseq: u64,
    pub permissions: RightSet,

    events: broadcast::Receiver<ChangeEvent>,
    /// Events received but not yet folded into the view.
    pending: Vec<ChangeEvent>,
    /// UIDs whose next flag-change notification is suppressed because this
    /// session caused the change and already confirmed it (or was asked not
    /// to with STORE .SILENT).
    silenced: HashSet<NonZeroU32>,
    /// UIDs this session already reported as expunged itself.
    acknowledged_expunged: HashSet<NonZeroU32>,
    /// The mailbox was deleted under us.
    pub deleted: bool,
    /// The receiver lagged behind and the view may be stale.
    desynchronized: bool,
}

impl Session {
    pub fn new(
        snapshot: MailboxSnapshot,
        read_only: bool,
        permissions: RightSet,
        events: broadcast::Receiver<ChangeEvent>,
    ) -> Self {
        Self {
            mailbox_id: snapshot.id,
            mailbox_name: snapshot.name,
            read_only,
            uid_validity: snapshot.uid_validity,
            uid_next: snapshot.uid_next,
            uids: snapshot.uids,
            recent: snapshot.recent.into_iter().collect(),
            first_unseen: snapshot.first_unseen,
            flags: snapshot.flags,
            highest_modseq: snapshot.highest_modseq,
            permissions,
            events,
            pending: Vec::new(),
            silenced: HashSet::new(),
            acknowledged_expunged: HashSet::new(),
            deleted: false,
            desynchronized: false,
        }
    }

    pub fn exists(&self) -> u32 {
        self.uids.len() as u32
    }

    pub fn uids(&self) -> &[NonZeroU32] {
        &self.uids
    }

    /// The MSN of a UID in the current view.
    pub fn msn_of(&self, uid: NonZeroU32) -> Option<NonZeroU32> {
        self.uids
            .iter()
            .position(|candidate| *candidate == uid)
            // Safety: positions are zero-based, so `+ 1` is non-zero.
            .map(|position| NonZeroU32::new(position as u32 + 1).unwrap())
    }

    /// The UID at an MSN in the current view.
    pub fn uid_of(&self, msn: NonZeroU32) -> Option<NonZeroU32> {
        self.uids.get(msn.get() as usize - 1).copied()
    }

    /// The largest UID in the view; falls back to `UIDNEXT` when empty so
    /// that `*` still resolves.
    pub fn largest_uid(&self) -> NonZeroU32 {
        self.uids.last().copied().unwrap_or(self.uid_next)
    }

    /// Expands a sequence set to the UIDs it denotes in the current view,
    /// ascending. Numbers that denote nothing are skipped.
    pub fn resolve(&self, set: &SequenceSet, uid_form: bool) -> Vec<NonZeroU32> {
        if uid_form {
            let largest = self.largest_uid();

            self.uids
                .iter()
                .filter(|uid| set.contains(**uid, largest))
                .copied()
                .collect()
        } else {
            let largest = match NonZeroU32::new(self.exists()) {
                Some(largest) => largest,
                None => return Vec::new(),
            };

            self.uids
                .iter()
                .enumerate()
                .filter(|(index, _)| {
                    // Safety: `index + 1` is non-zero.
                    set.contains(NonZeroU32::new(*index as u32 + 1).unwrap(), largest)
                })
                .map(|(_, uid)| *uid)
                .collect()
        }
    }

    /// Suppresses the next flag-change notification for these UIDs.
    pub fn silence(&mut self, uids: impl IntoIterator<Item = NonZeroU32>) {
        self.silenced.extend(uids);
    }

    /// Records that this session already emitted EXPUNGE for these UIDs and
    /// removes them from the view.
    pub fn acknowledge_expunged(&mut self, uids: impl IntoIterator<Item = NonZeroU32>) {
        for uid in uids {
            self.uids.retain(|candidate| *candidate != uid);
            self.recent.remove(&uid);
            self.acknowledged_expunged.insert(uid);
        }
    }

    /// Waits for the next change event. Used while idling.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    self.desynchronized = true;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn buffer(&mut self, event: ChangeEvent) {
        self.pending.push(event);
    }

    /// Moves everything the broadcast channel holds into the pending buffer.
    fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.pending.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    self.desynchronized = true;
                }
                Err(_) => break,
            }
        }
    }

    pub fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    /// Folds buffered changes into the view and produces the untagged
    /// responses describing them.
    ///
    /// Expunges are only released when `allow_expunge` is set; otherwise they
    /// stay buffered for a later emission point. Everything else (new
    /// messages, foreign flag changes) is always released.
    pub fn flush(&mut self, allow_expunge: bool, out: &mut Vec<Response>) {
        self.drain_events();

        let mut kept = Vec::new();
        let mut expunged_uids = Vec::new();
        let mut flag_updates: Vec<(NonZeroU32, Vec<Flag>, u64)> = Vec::new();
        let mut exists_changed = false;
        let mut recent_changed = false;

        for event in std::mem::take(&mut self.pending) {
            match event {
                ChangeEvent::Appended {
                    uid,
                    uid_next,
                    recent,
                } => {
                    self.uid_next = self.uid_next.max(uid_next);

                    if self.uids.last().map_or(true, |last| *last < uid) {
                        self.uids.push(uid);
                        exists_changed = true;

                        if recent {
                            self.recent.insert(uid);
                            recent_changed = true;
                        }
                    }
                }
                ChangeEvent::FlagsChanged { uid, flags, modseq } => {
                    self.highest_modseq = self.highest_modseq.max(modseq);

                    if self.silenced.remove(&uid) {
                        continue;
                    }

                    if self.uids.contains(&uid) {
                        flag_updates.push((uid, flags, modseq));
                    }
                }
                ChangeEvent::Expunged { uid } => {
                    if self.acknowledged_expunged.remove(&uid) {
                        // Already reported by this session's own EXPUNGE.
                        continue;
                    }

                    if !self.uids.contains(&uid) {
                        continue;
                    }

                    if allow_expunge {
                        expunged_uids.push(uid);
                    } else {
                        kept.push(ChangeEvent::Expunged { uid });
                    }
                }
                ChangeEvent::MailboxDeleted => {
                    self.deleted = true;
                }
            }
        }

        self.pending = kept;

        // Expunges first, in descending MSN order.
        let mut expunged_msns: Vec<NonZeroU32> = Vec::with_capacity(expunged_uids.len());
        for uid in &expunged_uids {
            if let Some(msn) = self.msn_of(*uid) {
                expunged_msns.push(msn);
            }
        }
        expunged_msns.sort_unstable();

        for msn in expunged_msns.iter().rev() {
            self.uids.remove(msn.get() as usize - 1);
            out.push(Response::Data(Data::Expunge(*msn)));
        }
        for uid in &expunged_uids {
            if self.recent.remove(uid) {
                recent_changed = true;
            }
            // A flag update for a message that is gone must not be emitted.
            flag_updates.retain(|(update_uid, ..)| update_uid != uid);
        }

        if exists_changed || !expunged_uids.is_empty() {
            out.push(Response::Data(Data::Exists(self.exists())));
        }
        if recent_changed {
            out.push(Response::Data(Data::Recent(self.recent.len() as u32)));
        }

        for (uid, flags, _) in flag_updates {
            if let Some(msn) = self.msn_of(uid) {
                out.push(Response::Data(Data::Fetch {
                    seq: msn,
                    items: Vec1::from(MessageDataItem::Flags(self.flags_fetch(uid, &flags))),
                }));
            }
        }
    }

    /// The FETCH FLAGS view of a flag set, including session-only `\Recent`.
    pub fn flags_fetch(&self, uid: NonZeroU32, flags: &[Flag]) -> Vec<FlagFetch> {
        let mut items: Vec<FlagFetch> =
            flags.iter().cloned().map(FlagFetch::Flag).collect();

        if self.recent.contains(&uid) {
            items.push(FlagFetch::Recent);
        }

        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).unwrap()
    }

    fn session_with_uids(uids: &[u32]) -> (broadcast::Sender<ChangeEvent>, Session) {
        let (tx, rx) = broadcast::channel(16);

        let snapshot = MailboxSnapshot {
            id: MailboxId(1),
            name: "INBOX".to_owned(),
            uid_validity: nz(1),
            uid_next: nz(uids.iter().max().unwrap_or(&0) + 1),
            uids: uids.iter().map(|uid| nz(*uid)).collect(),
            recent: Vec::new(),
            first_unseen: None,
            flags: Vec::new(),
            highest_modseq: 1,
        };

        (tx, Session::new(snapshot, false, RightSet::all(), rx))
    }

    #[test]
    fn test_msn_uid_mapping() {
        let (_tx, session) = session_with_uids(&[10, 20, 30]);

        assert_eq!(session.msn_of(nz(20)), Some(nz(2)));
        assert_eq!(session.uid_of(nz(3)), Some(nz(30)));
        assert_eq!(session.msn_of(nz(15)), None);
        assert_eq!(session.uid_of(nz(4)), None);
    }

    #[test]
    fn test_resolve_msn_and_uid_form() {
        let (_tx, session) = session_with_uids(&[10, 20, 30]);

        let set: SequenceSet = "2:*".parse().unwrap();
        assert_eq!(session.resolve(&set, false), vec![nz(20), nz(30)]);

        let set: SequenceSet = "15:25".parse().unwrap();
        assert_eq!(session.resolve(&set, true), vec![nz(20)]);

        // UIDs that denote nothing are skipped.
        let set: SequenceSet = "100".parse().unwrap();
        assert!(session.resolve(&set, true).is_empty());
    }

    #[test]
    fn test_flush_releases_expunges_descending() {
        let (_tx, mut session) = session_with_uids(&[10, 20, 30]);

        session.buffer(ChangeEvent::Expunged { uid: nz(10) });
        session.buffer(ChangeEvent::Expunged { uid: nz(30) });

        let mut out = Vec::new();
        session.flush(true, &mut out);

        assert_eq!(
            out,
            vec![
                Response::Data(Data::Expunge(nz(3))),
                Response::Data(Data::Expunge(nz(1))),
                Response::Data(Data::Exists(1)),
            ],
        );
        assert_eq!(session.uids(), &[nz(20)]);
    }

    #[test]
    fn test_flush_holds_expunges_back() {
        let (_tx, mut session) = session_with_uids(&[10, 20]);

        session.buffer(ChangeEvent::Expunged { uid: nz(10) });

        let mut out = Vec::new();
        session.flush(false, &mut out);

        // The MSN mapping must stay stable while a command is emitting.
        assert!(out.is_empty());
        assert_eq!(session.exists(), 2);

        session.flush(true, &mut out);
        assert_eq!(out[0], Response::Data(Data::Expunge(nz(1))));
        assert_eq!(session.exists(), 1);
    }

    #[test]
    fn test_flush_reports_new_messages() {
        let (_tx, mut session) = session_with_uids(&[10]);

        session.buffer(ChangeEvent::Appended {
            uid: nz(11),
            uid_next: nz(12),
            recent: true,
        });

        let mut out = Vec::new();
        session.flush(true, &mut out);

        assert_eq!(
            out,
            vec![
                Response::Data(Data::Exists(2)),
                Response::Data(Data::Recent(1)),
            ],
        );
        assert_eq!(session.uid_next, nz(12));
    }

    #[test]
    fn test_silenced_flag_changes_are_not_reported() {
        let (_tx, mut session) = session_with_uids(&[10, 20]);

        session.silence([nz(10)]);
        session.buffer(ChangeEvent::FlagsChanged {
            uid: nz(10),
            flags: vec![Flag::Seen],
            modseq: 7,
        });
        session.buffer(ChangeEvent::FlagsChanged {
            uid: nz(20),
            flags: vec![Flag::Deleted],
            modseq: 8,
        });

        let mut out = Vec::new();
        session.flush(true, &mut out);

        assert_eq!(out.len(), 1);
        assert!(matches!(
            &out[0],
            Response::Data(Data::Fetch { seq, .. }) if seq.get() == 2
        ));
        // The modseq still advances.
        assert_eq!(session.highest_modseq, 8);
    }

    #[test]
    fn test_no_fetch_for_expunged_message() {
        let (_tx, mut session) = session_with_uids(&[10, 20]);

        session.buffer(ChangeEvent::FlagsChanged {
            uid: nz(10),
            flags: vec![Flag::Seen],
            modseq: 7,
        });
        session.buffer(ChangeEvent::Expunged { uid: nz(10) });

        let mut out = Vec::new();
        session.flush(true, &mut out);

        assert!(out
            .iter()
            .all(|response| !matches!(response, Response::Data(Data::Fetch { .. }))));
    }

    #[test]
    fn test_own_expunges_are_not_doubled() {
        let (tx, mut session) = session_with_uids(&[10, 20]);

        // The session expunged UID 10 itself and already told the client.
        session.acknowledge_expunged([nz(10)]);
        tx.send(ChangeEvent::Expunged { uid: nz(10) }).unwrap();

        let mut out = Vec::new();
        session.flush(true, &mut out);

        assert!(out.is_empty());
        assert_eq!(session.uids(), &[nz(20)]);
    }
}
