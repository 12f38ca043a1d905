//! Commands valid only with a selected mailbox: CLOSE, UNSELECT, EXPUNGE,
//! SEARCH, FETCH, STORE, COPY, their UID variants, and IDLE.

use std::{collections::HashMap, num::NonZeroU32};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    backend::{body_block, header_block, BackendError, Directory, MessageMeta, Storage},
    server::{
        command::QueuedCommand,
        connection::{Connection, Reservation},
        handlers::{backend_error_text, body_nstring},
    },
    types::{
        acl::Right,
        core::Charset,
        fetch::{MacroOrMessageDataItemNames, MessageDataItem, MessageDataItemName, Section},
        flag::{Flag, StoreResponse, StoreType},
        mailbox::Mailbox,
        response::{Code, Continue, Data, Response},
        search::SearchKey,
        sequence::SequenceSet,
        state::ConnectionState,
    },
};

impl<S, B> Connection<S, B>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    B: Storage + Directory,
{
    /// CLOSE expunges silently and drops the session. The client does not
    /// expect EXPUNGE responses for the mailbox being closed, so anything
    /// the session still had buffered is discarded with it.
    pub(crate) async fn close(&mut self, cmd: &mut QueuedCommand) {
        let Some(session) = self.session.take() else {
            cmd.bad("Not permitted in this state");
            return;
        };

        log::debug!("closing {}", session.mailbox_name);

        if !session.read_only && session.permissions.contains(Right::Expunge) {
            let _ = self
                .engine
                .backend
                .expunge(session.mailbox_id, None)
                .await;
        }

        self.state = ConnectionState::Authenticated;
        cmd.ok(None);
    }

    /// UNSELECT (RFC 3691): like CLOSE, without the expunge.
    pub(crate) fn unselect(&mut self, cmd: &mut QueuedCommand) {
        if self.session.take().is_none() {
            cmd.bad("Not permitted in this state");
            return;
        }

        self.state = ConnectionState::Authenticated;
        cmd.ok(None);
    }

    /// EXPUNGE, and UID EXPUNGE when a set is given.
    pub(crate) async fn expunge(
        &mut self,
        cmd: &mut QueuedCommand,
        uid_set: Option<SequenceSet>,
    ) {
        let Some(session) = self.session.as_mut() else {
            cmd.bad("Not permitted in this state");
            return;
        };

        if session.read_only {
            cmd.no(None, "Mailbox is read-only");
            return;
        }
        if !session.permissions.contains(Right::Expunge) {
            cmd.no(None, "Permission denied");
            return;
        }

        let mailbox_id = session.mailbox_id;
        let filter = uid_set.map(|set| session.resolve(&set, true));

        let expunged = match self
            .engine
            .backend
            .expunge(mailbox_id, filter.as_deref())
            .await
        {
            Ok(expunged) => expunged,
            Err(error) => {
                cmd.no(None, backend_error_text(&error));
                return;
            }
        };

        // Safety: the session was checked above and nothing in between
        // clears it.
        let session = self.session.as_mut().unwrap();

        // Descending MSN order, so that the client's bookkeeping stays
        // consistent while it applies the removals one by one.
        let mut doomed: Vec<(NonZeroU32, NonZeroU32)> = expunged
            .iter()
            .filter_map(|uid| session.msn_of(*uid).map(|msn| (msn, *uid)))
            .collect();
        doomed.sort_unstable();

        for (msn, uid) in doomed.into_iter().rev() {
            cmd.responses.push(Response::Data(Data::Expunge(msn)));
            session.acknowledge_expunged([uid]);
        }

        cmd.ok(None);
    }

    pub(crate) async fn search(
        &mut self,
        cmd: &mut QueuedCommand,
        charset: Option<Charset>,
        criteria: SearchKey,
        uid_form: bool,
    ) {
        if let Some(charset) = charset {
            let name = charset.as_str();

            if !name.eq_ignore_ascii_case("UTF-8") && !name.eq_ignore_ascii_case("US-ASCII") {
                // Safety: "UTF-8" is a valid charset.
                let allowed = vec![Charset::try_from("UTF-8").unwrap()];
                cmd.no(Some(Code::BadCharset { allowed }), "Unsupported charset");
                return;
            }
        }

        let Some(session) = self.session.as_ref() else {
            cmd.bad("Not permitted in this state");
            return;
        };

        let mailbox_id = session.mailbox_id;
        let view = session.uids().to_vec();

        match self.engine.backend.search(mailbox_id, &criteria, &view).await {
            Ok(uids) => {
                // Ascending is guaranteed by the storage contract; the MSN
                // projection preserves it.
                let numbers = if uid_form {
                    uids
                } else {
                    let session = self.session.as_ref().unwrap();
                    uids.iter()
                        .filter_map(|uid| session.msn_of(*uid))
                        .collect()
                };

                cmd.responses.push(Response::Data(Data::Search(numbers)));
                cmd.ok(None);
            }
            Err(error) => cmd.no(None, backend_error_text(&error)),
        }
    }

    pub(crate) async fn fetch(
        &mut self,
        cmd: &mut QueuedCommand,
        sequence_set: SequenceSet,
        macro_or_item_names: MacroOrMessageDataItemNames,
        changed_since: Option<u64>,
        uid_form: bool,
    ) {
        let mut items = macro_or_item_names.expand();

        if items
            .iter()
            .any(|item| matches!(item, MessageDataItemName::Body | MessageDataItemName::BodyStructure))
        {
            cmd.no(None, "BODYSTRUCTURE is not computed by this server");
            return;
        }

        // UID FETCH always reports the UID; CHANGEDSINCE always reports the
        // modseq.
        if uid_form && !items.contains(&MessageDataItemName::Uid) {
            items.push(MessageDataItemName::Uid);
        }
        if changed_since.is_some() && !items.contains(&MessageDataItemName::ModSeq) {
            items.push(MessageDataItemName::ModSeq);
        }

        let Some(session) = self.session.as_ref() else {
            cmd.bad("Not permitted in this state");
            return;
        };

        let mailbox_id = session.mailbox_id;
        let read_only = session.read_only;
        let may_set_seen = session.permissions.contains(Right::KeepSeen);

        // The snapshot: which messages, and at which MSN, is decided here
        // and stays stable for the whole command.
        let uids = session.resolve(&sequence_set, uid_form);

        let mut metas = match self.engine.backend.fetch_meta(mailbox_id, &uids).await {
            Ok(metas) => metas,
            Err(error) => {
                cmd.no(None, backend_error_text(&error));
                return;
            }
        };

        if let Some(changed_since) = changed_since {
            metas.retain(|meta| meta.modseq > changed_since);
        }

        // BODY[...] (without .PEEK) implicitly sets \Seen, which in turn is
        // confirmed by a FLAGS item in the same FETCH response.
        let wants_body = items.iter().any(|item| {
            matches!(
                item,
                MessageDataItemName::BodyExt { peek: false, .. }
                    | MessageDataItemName::Rfc822
                    | MessageDataItemName::Rfc822Text
            )
        });

        let mut implicit_seen: HashMap<NonZeroU32, MessageMeta> = HashMap::new();

        if wants_body && !read_only && may_set_seen {
            let unseen: Vec<NonZeroU32> = metas
                .iter()
                .filter(|meta| !meta.flags.contains(&Flag::Seen))
                .map(|meta| meta.uid)
                .collect();

            if !unseen.is_empty() {
                match self
                    .engine
                    .backend
                    .modify_flags(mailbox_id, &unseen, StoreType::Add, &[Flag::Seen], None)
                    .await
                {
                    Ok(outcome) => {
                        let session = self.session.as_mut().unwrap();
                        session.silence(outcome.updated.iter().map(|meta| meta.uid));

                        for meta in outcome.updated {
                            implicit_seen.insert(meta.uid, meta);
                        }
                    }
                    Err(error) => {
                        cmd.no(None, backend_error_text(&error));
                        return;
                    }
                }
            }
        }

        for meta in metas {
            // A message expunged between snapshot and now simply yields no
            // response; its MSN still refers to the snapshot view.
            let seen_was_set = implicit_seen.contains_key(&meta.uid);
            let meta = implicit_seen.remove(&meta.uid).unwrap_or(meta);

            let (msn, flag_items) = {
                // Safety: the session was checked above and handlers run
                // serially on this connection.
                let session = self.session.as_ref().unwrap();
                let Some(msn) = session.msn_of(meta.uid) else {
                    continue;
                };
                (msn, session.flags_fetch(meta.uid, &meta.flags))
            };

            let mut out_items = Vec::with_capacity(items.len());
            let mut body = None;

            for item in &items {
                let item = match item {
                    MessageDataItemName::Flags => MessageDataItem::Flags(flag_items.clone()),
                    MessageDataItemName::InternalDate => {
                        MessageDataItem::InternalDate(meta.internal_date)
                    }
                    MessageDataItemName::Rfc822Size => MessageDataItem::Rfc822Size(meta.size),
                    MessageDataItemName::Uid => MessageDataItem::Uid(meta.uid),
                    MessageDataItemName::ModSeq => MessageDataItem::ModSeq(meta.modseq),
                    MessageDataItemName::Envelope => {
                        match self.engine.backend.envelope(mailbox_id, meta.uid).await {
                            Ok(Some(envelope)) => MessageDataItem::Envelope(envelope),
                            Ok(None) => continue,
                            Err(error) => {
                                cmd.no(None, backend_error_text(&error));
                                return;
                            }
                        }
                    }
                    MessageDataItemName::BodyExt {
                        section,
                        partial,
                        peek: _,
                    } => {
                        let Some(data) =
                            self.message_body(cmd, mailbox_id, meta.uid, &mut body).await
                        else {
                            return;
                        };

                        let sliced = slice_section(&data, section);
                        let (origin, sliced) = apply_partial(sliced, *partial);

                        MessageDataItem::BodyExt {
                            section: section.clone(),
                            origin,
                            data: body_nstring(sliced),
                        }
                    }
                    MessageDataItemName::Rfc822 => {
                        let Some(data) =
                            self.message_body(cmd, mailbox_id, meta.uid, &mut body).await
                        else {
                            return;
                        };

                        MessageDataItem::Rfc822(body_nstring(data))
                    }
                    MessageDataItemName::Rfc822Header => {
                        let Some(data) =
                            self.message_body(cmd, mailbox_id, meta.uid, &mut body).await
                        else {
                            return;
                        };

                        MessageDataItem::Rfc822Header(body_nstring(
                            header_block(&data).to_vec(),
                        ))
                    }
                    MessageDataItemName::Rfc822Text => {
                        let Some(data) =
                            self.message_body(cmd, mailbox_id, meta.uid, &mut body).await
                        else {
                            return;
                        };

                        MessageDataItem::Rfc822Text(body_nstring(body_block(&data).to_vec()))
                    }
                    MessageDataItemName::Body | MessageDataItemName::BodyStructure => {
                        // Rejected above.
                        continue;
                    }
                };

                out_items.push(item);
            }

            // The implicit \Seen change is confirmed even when FLAGS was not
            // asked for.
            if seen_was_set && !items.contains(&MessageDataItemName::Flags) {
                out_items.push(MessageDataItem::Flags(flag_items));
            }

            if let Ok(out_items) = crate::types::core::Vec1::try_from(out_items) {
                cmd.responses.push(Response::Data(Data::Fetch {
                    seq: msn,
                    items: out_items,
                }));
            }
        }

        cmd.ok(None);
    }

    /// Fetches (and caches) the raw message text during one FETCH item loop.
    async fn message_body(
        &mut self,
        cmd: &mut QueuedCommand,
        mailbox_id: crate::backend::MailboxId,
        uid: NonZeroU32,
        cache: &mut Option<Vec<u8>>,
    ) -> Option<Vec<u8>> {
        if let Some(data) = cache {
            return Some(data.clone());
        }

        match self.engine.backend.fetch_body(mailbox_id, uid).await {
            Ok(Some(data)) => {
                *cache = Some(data.clone());
                Some(data)
            }
            Ok(None) => {
                *cache = Some(Vec::new());
                Some(Vec::new())
            }
            Err(error) => {
                cmd.no(None, backend_error_text(&error));
                None
            }
        }
    }

    pub(crate) async fn store(
        &mut self,
        cmd: &mut QueuedCommand,
        sequence_set: SequenceSet,
        kind: StoreType,
        response: StoreResponse,
        flags: Vec<Flag>,
        unchanged_since: Option<u64>,
        uid_form: bool,
    ) {
        let Some(session) = self.session.as_mut() else {
            cmd.bad("Not permitted in this state");
            return;
        };

        if session.read_only {
            cmd.no(None, "Mailbox is read-only");
            return;
        }

        for flag in &flags {
            let needed = match flag {
                Flag::Seen => Right::KeepSeen,
                Flag::Deleted => Right::DeleteMessages,
                _ => Right::Write,
            };

            if !session.permissions.contains(needed) {
                cmd.no(None, "Permission denied");
                return;
            }
        }

        let mailbox_id = session.mailbox_id;
        let uids = session.resolve(&sequence_set, uid_form);

        let outcome = match self
            .engine
            .backend
            .modify_flags(mailbox_id, &uids, kind, &flags, unchanged_since)
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                cmd.no(None, backend_error_text(&error));
                return;
            }
        };

        // This session already confirms (or silences) the change; the echo
        // on the event channel must not produce a second FETCH.
        let session = self.session.as_mut().unwrap();
        session.silence(outcome.updated.iter().map(|meta| meta.uid));

        if response == StoreResponse::Answer {
            for meta in &outcome.updated {
                let Some(msn) = session.msn_of(meta.uid) else {
                    continue;
                };

                let mut items = vec![MessageDataItem::Flags(
                    session.flags_fetch(meta.uid, &meta.flags),
                )];
                if uid_form {
                    items.push(MessageDataItem::Uid(meta.uid));
                }
                if unchanged_since.is_some() {
                    items.push(MessageDataItem::ModSeq(meta.modseq));
                }

                // Safety: the items list starts non-empty.
                cmd.responses.push(Response::Data(Data::Fetch {
                    seq: msn,
                    items: crate::types::core::Vec1::try_from(items).unwrap(),
                }));
            }
        }

        if outcome.conflicted.is_empty() {
            cmd.ok(None);
        } else {
            // Report the messages that were not updated because their modseq
            // moved past UNCHANGEDSINCE.
            let conflicted = if uid_form {
                outcome.conflicted.clone()
            } else {
                outcome
                    .conflicted
                    .iter()
                    .filter_map(|uid| session.msn_of(*uid))
                    .collect()
            };

            match SequenceSet::try_from(conflicted) {
                Ok(modified) => cmd.ok(Some(Code::Modified(modified))),
                Err(_) => cmd.ok(None),
            }
        }
    }

    pub(crate) async fn copy(
        &mut self,
        cmd: &mut QueuedCommand,
        sequence_set: SequenceSet,
        mailbox: Mailbox,
        uid_form: bool,
    ) {
        let Some(user) = self.require_user(cmd) else {
            return;
        };

        if !self
            .require_right(cmd, &user, mailbox.name(), Right::Insert)
            .await
        {
            return;
        }

        let Some(session) = self.session.as_ref() else {
            cmd.bad("Not permitted in this state");
            return;
        };

        let mailbox_id = session.mailbox_id;
        let uids = session.resolve(&sequence_set, uid_form);

        if uids.is_empty() {
            cmd.ok(None);
            return;
        }

        match self
            .engine
            .backend
            .copy(mailbox_id, &uids, &user, mailbox.name())
            .await
        {
            Ok(outcome) => {
                let source: Vec<NonZeroU32> =
                    outcome.pairs.iter().map(|(source, _)| *source).collect();
                let destination: Vec<NonZeroU32> =
                    outcome.pairs.iter().map(|(_, dest)| *dest).collect();

                match (
                    SequenceSet::try_from(source),
                    SequenceSet::try_from(destination),
                ) {
                    (Ok(source), Ok(destination)) => cmd.ok(Some(Code::CopyUid {
                        uid_validity: outcome.uid_validity,
                        source,
                        destination,
                    })),
                    _ => cmd.ok(None),
                }
            }
            Err(BackendError::NoSuchMailbox) => {
                cmd.no(Some(Code::TryCreate), "No such mailbox")
            }
            Err(error) => cmd.no(None, backend_error_text(&error)),
        }
    }

    /// IDLE reserves the input stream; only `DONE` ends it. While idling,
    /// session updates flow to the client immediately.
    pub(crate) fn idle(&mut self, cmd: &mut QueuedCommand) {
        // Safety: the text is valid response text.
        cmd.responses.push(Response::Continue(
            Continue::basic(None, "idling").unwrap(),
        ));

        self.reader = Some(Reservation::Idle { command_id: cmd.id });
    }
}

/// Cuts the requested section out of the raw message.
///
/// MIME part addressing is limited to what a non-multipart message has:
/// part 1 is the message body. Anything deeper yields the empty string,
/// which a client treats as a missing part.
fn slice_section(data: &[u8], section: &Option<Section>) -> Vec<u8> {
    match section {
        None => data.to_vec(),
        Some(Section::Header(None)) => header_block(data).to_vec(),
        Some(Section::Text(None)) => body_block(data).to_vec(),
        Some(Section::HeaderFields(None, fields)) => {
            let wanted: Vec<&[u8]> = fields
                .as_ref()
                .iter()
                .map(|field| field.as_bytes())
                .collect();
            filter_header_fields(data, &wanted, true)
        }
        Some(Section::HeaderFieldsNot(None, fields)) => {
            let unwanted: Vec<&[u8]> = fields
                .as_ref()
                .iter()
                .map(|field| field.as_bytes())
                .collect();
            filter_header_fields(data, &unwanted, false)
        }
        Some(Section::Part(part))
            if part.0.as_ref().len() == 1 && part.0.as_ref()[0].get() == 1 =>
        {
            body_block(data).to_vec()
        }
        _ => Vec::new(),
    }
}

/// Keeps (or drops) the named header fields; always ends with the blank line.
fn filter_header_fields(data: &[u8], fields: &[&[u8]], keep: bool) -> Vec<u8> {
    let header = header_block(data);
    let mut out = Vec::new();
    let mut including = false;

    for line in header.split_inclusive(|byte| *byte == b'\n') {
        let is_continuation = line.starts_with(b" ") || line.starts_with(b"\t");

        if !is_continuation {
            if line == b"\r\n" {
                break;
            }

            including = match line.iter().position(|byte| *byte == b':') {
                Some(colon) => {
                    let name = &line[..colon];
                    fields.iter().any(|field| field.eq_ignore_ascii_case(name)) == keep
                }
                None => false,
            };
        }

        if including {
            out.extend_from_slice(line);
        }
    }

    out.extend_from_slice(b"\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &[u8] = b"From: a@b\r\nSubject: hi\r\nTo: c@d\r\n\r\nbody text\r\n";

    #[test]
    fn test_slice_section() {
        assert_eq!(slice_section(MESSAGE, &None), MESSAGE);
        assert_eq!(
            slice_section(MESSAGE, &Some(Section::Text(None))),
            b"body text\r\n",
        );
        assert_eq!(
            slice_section(MESSAGE, &Some(Section::Header(None))),
            b"From: a@b\r\nSubject: hi\r\nTo: c@d\r\n\r\n",
        );
    }

    #[test]
    fn test_filter_header_fields() {
        assert_eq!(
            filter_header_fields(MESSAGE, &[b"subject"], true),
            b"Subject: hi\r\n\r\n",
        );
        assert_eq!(
            filter_header_fields(MESSAGE, &[b"subject"], false),
            b"From: a@b\r\nTo: c@d\r\n\r\n",
        );
    }

    #[test]
    fn test_apply_partial() {
        let (origin, data) = apply_partial(b"hello world".to_vec(), None);
        assert_eq!(origin, None);
        assert_eq!(data, b"hello world");

        let (origin, data) =
            apply_partial(b"hello world".to_vec(), Some((6, NonZeroU32::new(3).unwrap())));
        assert_eq!(origin, Some(6));
        assert_eq!(data, b"wor");

        // Reading past the end truncates.
        let (origin, data) =
            apply_partial(b"abc".to_vec(), Some((2, NonZeroU32::new(10).unwrap())));
        assert_eq!(origin, Some(2));
        assert_eq!(data, b"c");

        // Starting past the end yields the empty string.
        let (_, data) = apply_partial(b"abc".to_vec(), Some((9, NonZeroU32::new(1).unwrap())));
        assert!(data.is_empty());
    }
}

/// Applies a `<start.length>` partial specifier.
fn apply_partial(
    data: Vec<u8>,
    partial: Option<(u32, NonZeroU32)>,
) -> (Option<u32>, Vec<u8>) {
    match partial {
        None => (None, data),
        Some((start, length)) => {
            let begin = (start as usize).min(data.len());
            let end = begin.saturating_add(length.get() as usize).min(data.len());

            (Some(start), data[begin..end].to_vec())
        }
    }
}
