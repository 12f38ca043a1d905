//! Encoding of messages.
//!
//! [`Encoder::encode`] returns an [`Encoded`] message that can be iterated
//! over as [`Fragment`]s. A server never needs to pause between fragments
//! (only client-to-server literals involve continuation requests), so
//! [`Encoded::dump`] is usually all that is needed.

use std::{borrow::Borrow, collections::VecDeque, io::Write, num::NonZeroU32};

use crate::{
    codec::{GreetingCodec, ResponseCodec},
    types::{
        acl::RightSet,
        core::{AString, Atom, Charset, IString, Literal, NString, Quoted, QuotedChar, Tag, Text},
        datetime::DateTime,
        envelope::{Address, Envelope},
        fetch::{MessageDataItem, Part, Section},
        flag::{Flag, FlagFetch, FlagNameAttribute, FlagPerm},
        mailbox::Mailbox,
        response::{Capability, Code, Continue, Data, Greeting, GreetingKind, Response, Status},
        sequence::{SeqOrUid, Sequence, SequenceSet},
        status::StatusDataItem,
    },
    utils::{escape_quoted, indicators::is_atom_char},
};

/// Encoder.
///
/// Implemented for types that know how to encode a specific IMAP message.
pub trait Encoder {
    type Message;

    fn encode(&self, message: &Self::Message) -> Encoded;
}

/// An encoded message, yielded as a sequence of [`Fragment`]s.
#[derive(Clone, Debug)]
pub struct Encoded {
    items: VecDeque<Fragment>,
}

impl Encoded {
    /// Dump the (remaining) encoded data without being guided by [`Fragment`]s.
    pub fn dump(self) -> Vec<u8> {
        let mut out = Vec::new();

        for fragment in self.items {
            match fragment {
                Fragment::Line { mut data } => out.append(&mut data),
                Fragment::Literal { mut data } => out.append(&mut data),
            }
        }

        out
    }
}

impl Iterator for Encoded {
    type Item = Fragment;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.pop_front()
    }
}

/// A fragment of an encoded message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Fragment {
    /// A line that is ready to be sent.
    Line { data: Vec<u8> },

    /// Literal data following a `{n}` announcement.
    Literal { data: Vec<u8> },
}

// -------------------------------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct EncodeContext {
    accumulator: Vec<u8>,
    items: VecDeque<Fragment>,
}

impl EncodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self) {
        self.items.push_back(Fragment::Line {
            data: std::mem::take(&mut self.accumulator),
        })
    }

    pub fn push_literal(&mut self) {
        self.items.push_back(Fragment::Literal {
            data: std::mem::take(&mut self.accumulator),
        })
    }

    pub fn into_items(self) -> VecDeque<Fragment> {
        let Self {
            accumulator,
            mut items,
        } = self;

        if !accumulator.is_empty() {
            items.push_back(Fragment::Line { data: accumulator });
        }

        items
    }

    #[cfg(test)]
    pub(crate) fn dump(self) -> Vec<u8> {
        let mut out = Vec::new();

        for item in self.into_items() {
            match item {
                Fragment::Line { data } | Fragment::Literal { data } => {
                    out.extend_from_slice(&data)
                }
            }
        }

        out
    }
}

impl Write for EncodeContext {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.accumulator.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

macro_rules! impl_encoder_for_codec {
    ($codec:ty, $message:ty) => {
        impl Encoder for $codec {
            type Message = $message;

            fn encode(&self, message: &Self::Message) -> Encoded {
                let mut ctx = EncodeContext::new();
                // Safety: writing into a `Vec` never fails.
                EncodeIntoContext::encode_ctx(message.borrow(), &mut ctx).unwrap();

                Encoded {
                    items: ctx.into_items(),
                }
            }
        }
    };
}

impl_encoder_for_codec!(GreetingCodec, Greeting);
impl_encoder_for_codec!(ResponseCodec, Response);

// -------------------------------------------------------------------------------------------------

pub(crate) trait EncodeIntoContext {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()>;
}

// ----- Primitive ---------------------------------------------------------------------------------

impl EncodeIntoContext for u32 {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.to_string().as_bytes())
    }
}

impl EncodeIntoContext for u64 {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.to_string().as_bytes())
    }
}

impl EncodeIntoContext for NonZeroU32 {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.to_string().as_bytes())
    }
}

// ----- Core --------------------------------------------------------------------------------------

impl EncodeIntoContext for Tag {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.inner().as_bytes())
    }
}

impl EncodeIntoContext for Atom {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.inner().as_bytes())
    }
}

impl EncodeIntoContext for Text {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.inner().as_bytes())
    }
}

impl EncodeIntoContext for Quoted {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "\"{}\"", escape_quoted(self.inner()))
    }
}

impl EncodeIntoContext for Literal {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{{{}}}\r\n", self.data().len())?;
        ctx.push_line();

        ctx.write_all(self.data())?;
        ctx.push_literal();

        Ok(())
    }
}

impl EncodeIntoContext for IString {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Literal(literal) => literal.encode_ctx(ctx),
            Self::Quoted(quoted) => quoted.encode_ctx(ctx),
        }
    }
}

impl EncodeIntoContext for NString {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match &self.0 {
            Some(istring) => istring.encode_ctx(ctx),
            None => ctx.write_all(b"NIL"),
        }
    }
}

impl EncodeIntoContext for AString {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Atom(atom) => ctx.write_all(atom.inner().as_bytes()),
            Self::String(istring) => istring.encode_ctx(ctx),
        }
    }
}

impl EncodeIntoContext for QuotedChar {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self.inner() {
            c @ ('\\' | '"') => write!(ctx, "\"\\{c}\""),
            c => write!(ctx, "\"{c}\""),
        }
    }
}

impl EncodeIntoContext for Charset {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Atom(atom) => atom.encode_ctx(ctx),
            Self::Quoted(quoted) => quoted.encode_ctx(ctx),
        }
    }
}

impl EncodeIntoContext for Mailbox {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        let wire = self.to_wire();

        if !wire.is_empty() && wire.bytes().all(is_atom_char) {
            ctx.write_all(wire.as_bytes())
        } else {
            // Modified UTF-7 output is printable US-ASCII, so the quoted
            // form always suffices.
            write!(ctx, "\"{}\"", escape_quoted(&wire))
        }
    }
}

impl EncodeIntoContext for DateTime {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "\"{}\"", self.to_imap_string())
    }
}

// ----- Flags -------------------------------------------------------------------------------------

impl EncodeIntoContext for Flag {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{self}")
    }
}

impl EncodeIntoContext for FlagFetch {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Flag(flag) => flag.encode_ctx(ctx),
            Self::Recent => ctx.write_all(b"\\Recent"),
        }
    }
}

impl EncodeIntoContext for FlagPerm {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Flag(flag) => flag.encode_ctx(ctx),
            Self::Asterisk => ctx.write_all(b"\\*"),
        }
    }
}

impl EncodeIntoContext for FlagNameAttribute {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{self}")
    }
}

// ----- Sequence ----------------------------------------------------------------------------------

impl EncodeIntoContext for SeqOrUid {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Value(value) => value.encode_ctx(ctx),
            Self::Asterisk => ctx.write_all(b"*"),
        }
    }
}

impl EncodeIntoContext for Sequence {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Single(value) => value.encode_ctx(ctx),
            Self::Range(start, end) => {
                start.encode_ctx(ctx)?;
                ctx.write_all(b":")?;
                end.encode_ctx(ctx)
            }
        }
    }
}

impl EncodeIntoContext for SequenceSet {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        join_serializable(self.0.as_ref(), b",", ctx)
    }
}

// ----- Responses ---------------------------------------------------------------------------------

impl EncodeIntoContext for Greeting {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(b"* ")?;

        match self.kind {
            GreetingKind::Ok => ctx.write_all(b"OK")?,
            GreetingKind::PreAuth => ctx.write_all(b"PREAUTH")?,
            GreetingKind::Bye => ctx.write_all(b"BYE")?,
        }

        ctx.write_all(b" ")?;

        if let Some(ref code) = self.code {
            ctx.write_all(b"[")?;
            code.encode_ctx(ctx)?;
            ctx.write_all(b"] ")?;
        }

        self.text.encode_ctx(ctx)?;
        ctx.write_all(b"\r\n")
    }
}

impl EncodeIntoContext for Response {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Status(status) => status.encode_ctx(ctx),
            Self::Data(data) => data.encode_ctx(ctx),
            Self::Continue(cont) => cont.encode_ctx(ctx),
        }
    }
}

impl EncodeIntoContext for Status {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        fn format_status(
            tag: &Option<Tag>,
            kind: &[u8],
            code: &Option<Code>,
            text: &Text,
            ctx: &mut EncodeContext,
        ) -> std::io::Result<()> {
            match tag {
                Some(tag) => tag.encode_ctx(ctx)?,
                None => ctx.write_all(b"*")?,
            }

            ctx.write_all(b" ")?;
            ctx.write_all(kind)?;
            ctx.write_all(b" ")?;

            if let Some(code) = code {
                ctx.write_all(b"[")?;
                code.encode_ctx(ctx)?;
                ctx.write_all(b"] ")?;
            }

            text.encode_ctx(ctx)?;
            ctx.write_all(b"\r\n")
        }

        match self {
            Self::Ok { tag, code, text } => format_status(tag, b"OK", code, text, ctx),
            Self::No { tag, code, text } => format_status(tag, b"NO", code, text, ctx),
            Self::Bad { tag, code, text } => format_status(tag, b"BAD", code, text, ctx),
            Self::Bye { code, text } => format_status(&None, b"BYE", code, text, ctx),
        }
    }
}

impl EncodeIntoContext for Code {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Alert => ctx.write_all(b"ALERT"),
            Self::BadCharset { allowed } => {
                ctx.write_all(b"BADCHARSET")?;
                if !allowed.is_empty() {
                    ctx.write_all(b" (")?;
                    join_serializable(allowed, b" ", ctx)?;
                    ctx.write_all(b")")?;
                }
                Ok(())
            }
            Self::Capability(caps) => {
                ctx.write_all(b"CAPABILITY ")?;
                join_serializable(caps.as_ref(), b" ", ctx)
            }
            Self::Parse => ctx.write_all(b"PARSE"),
            Self::PermanentFlags(flags) => {
                ctx.write_all(b"PERMANENTFLAGS (")?;
                join_serializable(flags, b" ", ctx)?;
                ctx.write_all(b")")
            }
            Self::ReadOnly => ctx.write_all(b"READ-ONLY"),
            Self::ReadWrite => ctx.write_all(b"READ-WRITE"),
            Self::TryCreate => ctx.write_all(b"TRYCREATE"),
            Self::UidNext(next) => {
                ctx.write_all(b"UIDNEXT ")?;
                next.encode_ctx(ctx)
            }
            Self::UidValidity(validity) => {
                ctx.write_all(b"UIDVALIDITY ")?;
                validity.encode_ctx(ctx)
            }
            Self::Unseen(unseen) => {
                ctx.write_all(b"UNSEEN ")?;
                unseen.encode_ctx(ctx)
            }
            Self::AppendUid { uid_validity, uid } => {
                ctx.write_all(b"APPENDUID ")?;
                uid_validity.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                uid.encode_ctx(ctx)
            }
            Self::CopyUid {
                uid_validity,
                source,
                destination,
            } => {
                ctx.write_all(b"COPYUID ")?;
                uid_validity.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                source.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                destination.encode_ctx(ctx)
            }
            Self::HighestModSeq(modseq) => {
                ctx.write_all(b"HIGHESTMODSEQ ")?;
                modseq.encode_ctx(ctx)
            }
            Self::Modified(set) => {
                ctx.write_all(b"MODIFIED ")?;
                set.encode_ctx(ctx)
            }
            Self::NoModSeq => ctx.write_all(b"NOMODSEQ"),
            Self::Other(atom, payload) => {
                atom.encode_ctx(ctx)?;
                if let Some(payload) = payload {
                    write!(ctx, " {payload}")?;
                }
                Ok(())
            }
        }
    }
}

impl EncodeIntoContext for Capability {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{self}")
    }
}

impl EncodeIntoContext for Continue {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Basic { code, text } => {
                ctx.write_all(b"+ ")?;
                if let Some(code) = code {
                    ctx.write_all(b"[")?;
                    code.encode_ctx(ctx)?;
                    ctx.write_all(b"] ")?;
                }
                text.encode_ctx(ctx)?;
                ctx.write_all(b"\r\n")
            }
            Self::Base64(data) => {
                use base64::{engine::general_purpose::STANDARD as _base64, Engine};

                ctx.write_all(b"+ ")?;
                ctx.write_all(_base64.encode(data).as_bytes())?;
                ctx.write_all(b"\r\n")
            }
        }
    }
}

impl EncodeIntoContext for Data {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Capability(caps) => {
                ctx.write_all(b"* CAPABILITY ")?;
                join_serializable(caps.as_ref(), b" ", ctx)?;
            }
            Self::List {
                items,
                delimiter,
                mailbox,
            } => {
                ctx.write_all(b"* LIST (")?;
                join_serializable(items, b" ", ctx)?;
                ctx.write_all(b") ")?;
                encode_delimiter(delimiter, ctx)?;
                ctx.write_all(b" ")?;
                mailbox.encode_ctx(ctx)?;
            }
            Self::Lsub {
                items,
                delimiter,
                mailbox,
            } => {
                ctx.write_all(b"* LSUB (")?;
                join_serializable(items, b" ", ctx)?;
                ctx.write_all(b") ")?;
                encode_delimiter(delimiter, ctx)?;
                ctx.write_all(b" ")?;
                mailbox.encode_ctx(ctx)?;
            }
            Self::Status { mailbox, items } => {
                ctx.write_all(b"* STATUS ")?;
                mailbox.encode_ctx(ctx)?;
                ctx.write_all(b" (")?;
                join_serializable(items, b" ", ctx)?;
                ctx.write_all(b")")?;
            }
            Self::Search(numbers) => {
                ctx.write_all(b"* SEARCH")?;
                for number in numbers {
                    ctx.write_all(b" ")?;
                    number.encode_ctx(ctx)?;
                }
            }
            Self::Flags(flags) => {
                ctx.write_all(b"* FLAGS (")?;
                join_serializable(flags, b" ", ctx)?;
                ctx.write_all(b")")?;
            }
            Self::Exists(count) => {
                ctx.write_all(b"* ")?;
                count.encode_ctx(ctx)?;
                ctx.write_all(b" EXISTS")?;
            }
            Self::Recent(count) => {
                ctx.write_all(b"* ")?;
                count.encode_ctx(ctx)?;
                ctx.write_all(b" RECENT")?;
            }
            Self::Expunge(msn) => {
                ctx.write_all(b"* ")?;
                msn.encode_ctx(ctx)?;
                ctx.write_all(b" EXPUNGE")?;
            }
            Self::Fetch { seq, items } => {
                ctx.write_all(b"* ")?;
                seq.encode_ctx(ctx)?;
                ctx.write_all(b" FETCH (")?;
                join_serializable(items.as_ref(), b" ", ctx)?;
                ctx.write_all(b")")?;
            }
            Self::Namespace {
                personal,
                other,
                shared,
            } => {
                ctx.write_all(b"* NAMESPACE ")?;
                encode_namespace_list(personal, ctx)?;
                ctx.write_all(b" ")?;
                encode_namespace_list(other, ctx)?;
                ctx.write_all(b" ")?;
                encode_namespace_list(shared, ctx)?;
            }
            Self::Acl { mailbox, entries } => {
                ctx.write_all(b"* ACL ")?;
                mailbox.encode_ctx(ctx)?;
                for (identifier, rights) in entries {
                    ctx.write_all(b" ")?;
                    identifier.encode_ctx(ctx)?;
                    ctx.write_all(b" ")?;
                    rights.encode_ctx(ctx)?;
                }
            }
            Self::Id { parameters } => {
                ctx.write_all(b"* ID ")?;
                match parameters {
                    Some(parameters) if !parameters.is_empty() => {
                        ctx.write_all(b"(")?;
                        let mut first = true;
                        for (key, value) in parameters {
                            if !first {
                                ctx.write_all(b" ")?;
                            }
                            first = false;
                            key.encode_ctx(ctx)?;
                            ctx.write_all(b" ")?;
                            value.encode_ctx(ctx)?;
                        }
                        ctx.write_all(b")")?;
                    }
                    _ => ctx.write_all(b"NIL")?,
                }
            }
        }

        ctx.write_all(b"\r\n")
    }
}

impl EncodeIntoContext for RightSet {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "\"{self}\"")
    }
}

fn encode_delimiter(
    delimiter: &Option<QuotedChar>,
    ctx: &mut EncodeContext,
) -> std::io::Result<()> {
    match delimiter {
        Some(delimiter) => delimiter.encode_ctx(ctx),
        None => ctx.write_all(b"NIL"),
    }
}

fn encode_namespace_list(
    namespaces: &[(IString, Option<QuotedChar>)],
    ctx: &mut EncodeContext,
) -> std::io::Result<()> {
    if namespaces.is_empty() {
        return ctx.write_all(b"NIL");
    }

    ctx.write_all(b"(")?;
    for (prefix, delimiter) in namespaces {
        ctx.write_all(b"(")?;
        prefix.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        encode_delimiter(delimiter, ctx)?;
        ctx.write_all(b")")?;
    }
    ctx.write_all(b")")
}

// ----- Message data items ------------------------------------------------------------------------

impl EncodeIntoContext for StatusDataItem {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Messages(count) => {
                ctx.write_all(b"MESSAGES ")?;
                count.encode_ctx(ctx)
            }
            Self::Recent(count) => {
                ctx.write_all(b"RECENT ")?;
                count.encode_ctx(ctx)
            }
            Self::UidNext(next) => {
                ctx.write_all(b"UIDNEXT ")?;
                next.encode_ctx(ctx)
            }
            Self::UidValidity(validity) => {
                ctx.write_all(b"UIDVALIDITY ")?;
                validity.encode_ctx(ctx)
            }
            Self::Unseen(count) => {
                ctx.write_all(b"UNSEEN ")?;
                count.encode_ctx(ctx)
            }
            Self::HighestModSeq(modseq) => {
                ctx.write_all(b"HIGHESTMODSEQ ")?;
                modseq.encode_ctx(ctx)
            }
        }
    }
}

impl EncodeIntoContext for MessageDataItem {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::BodyExt {
                section,
                origin,
                data,
            } => {
                ctx.write_all(b"BODY[")?;
                if let Some(section) = section {
                    section.encode_ctx(ctx)?;
                }
                ctx.write_all(b"]")?;
                if let Some(origin) = origin {
                    write!(ctx, "<{origin}>")?;
                }
                ctx.write_all(b" ")?;
                data.encode_ctx(ctx)
            }
            Self::Envelope(envelope) => {
                ctx.write_all(b"ENVELOPE ")?;
                envelope.encode_ctx(ctx)
            }
            Self::Flags(flags) => {
                ctx.write_all(b"FLAGS (")?;
                join_serializable(flags, b" ", ctx)?;
                ctx.write_all(b")")
            }
            Self::InternalDate(datetime) => {
                ctx.write_all(b"INTERNALDATE ")?;
                datetime.encode_ctx(ctx)
            }
            Self::Rfc822(data) => {
                ctx.write_all(b"RFC822 ")?;
                data.encode_ctx(ctx)
            }
            Self::Rfc822Header(data) => {
                ctx.write_all(b"RFC822.HEADER ")?;
                data.encode_ctx(ctx)
            }
            Self::Rfc822Size(size) => {
                ctx.write_all(b"RFC822.SIZE ")?;
                size.encode_ctx(ctx)
            }
            Self::Rfc822Text(data) => {
                ctx.write_all(b"RFC822.TEXT ")?;
                data.encode_ctx(ctx)
            }
            Self::Uid(uid) => {
                ctx.write_all(b"UID ")?;
                uid.encode_ctx(ctx)
            }
            Self::ModSeq(modseq) => {
                ctx.write_all(b"MODSEQ (")?;
                modseq.encode_ctx(ctx)?;
                ctx.write_all(b")")
            }
        }
    }
}

impl EncodeIntoContext for Part {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        join_serializable(self.0.as_ref(), b".", ctx)
    }
}

impl EncodeIntoContext for Section {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        fn part_prefix(part: &Option<Part>, ctx: &mut EncodeContext) -> std::io::Result<()> {
            if let Some(part) = part {
                part.encode_ctx(ctx)?;
                ctx.write_all(b".")?;
            }
            Ok(())
        }

        match self {
            Self::Part(part) => part.encode_ctx(ctx),
            Self::Header(part) => {
                part_prefix(part, ctx)?;
                ctx.write_all(b"HEADER")
            }
            Self::HeaderFields(part, fields) => {
                part_prefix(part, ctx)?;
                ctx.write_all(b"HEADER.FIELDS (")?;
                join_serializable(fields.as_ref(), b" ", ctx)?;
                ctx.write_all(b")")
            }
            Self::HeaderFieldsNot(part, fields) => {
                part_prefix(part, ctx)?;
                ctx.write_all(b"HEADER.FIELDS.NOT (")?;
                join_serializable(fields.as_ref(), b" ", ctx)?;
                ctx.write_all(b")")
            }
            Self::Text(part) => {
                part_prefix(part, ctx)?;
                ctx.write_all(b"TEXT")
            }
            Self::Mime(part) => {
                part.encode_ctx(ctx)?;
                ctx.write_all(b".MIME")
            }
        }
    }
}

impl EncodeIntoContext for Envelope {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(b"(")?;
        self.date.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.subject.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        encode_address_list(&self.from, ctx)?;
        ctx.write_all(b" ")?;
        encode_address_list(&self.sender, ctx)?;
        ctx.write_all(b" ")?;
        encode_address_list(&self.reply_to, ctx)?;
        ctx.write_all(b" ")?;
        encode_address_list(&self.to, ctx)?;
        ctx.write_all(b" ")?;
        encode_address_list(&self.cc, ctx)?;
        ctx.write_all(b" ")?;
        encode_address_list(&self.bcc, ctx)?;
        ctx.write_all(b" ")?;
        self.in_reply_to.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.message_id.encode_ctx(ctx)?;
        ctx.write_all(b")")
    }
}

fn encode_address_list(addresses: &[Address], ctx: &mut EncodeContext) -> std::io::Result<()> {
    if addresses.is_empty() {
        return ctx.write_all(b"NIL");
    }

    ctx.write_all(b"(")?;
    for address in addresses {
        address.encode_ctx(ctx)?;
    }
    ctx.write_all(b")")
}

impl EncodeIntoContext for Address {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(b"(")?;
        self.name.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.adl.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.mailbox.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.host.encode_ctx(ctx)?;
        ctx.write_all(b")")
    }
}

// ----- Helpers -----------------------------------------------------------------------------------

pub(crate) fn join_serializable<I: EncodeIntoContext>(
    elements: &[I],
    sep: &[u8],
    ctx: &mut EncodeContext,
) -> std::io::Result<()> {
    if let Some((last, head)) = elements.split_last() {
        for item in head {
            item.encode_ctx(ctx)?;
            ctx.write_all(sep)?;
        }

        last.encode_ctx(ctx)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::core::Vec1;

    fn dump<T: EncodeIntoContext>(value: &T) -> String {
        let mut ctx = EncodeContext::new();
        value.encode_ctx(&mut ctx).unwrap();
        String::from_utf8(ctx.dump()).unwrap()
    }

    #[test]
    fn test_encode_greeting() {
        let greeting = Greeting::ok(
            Some(Code::Capability(Vec1::from(Capability::Imap4Rev1))),
            "Hello, World!",
        )
        .unwrap();

        assert_eq!(
            dump(&greeting),
            "* OK [CAPABILITY IMAP4rev1] Hello, World!\r\n",
        );
    }

    #[test]
    fn test_encode_status() {
        let status = Status::ok(
            Some(Tag::try_from("A001").unwrap()),
            Some(Code::ReadWrite),
            "SELECT",
        )
        .unwrap();

        assert_eq!(dump(&status), "A001 OK [READ-WRITE] SELECT\r\n");

        let bye = Status::bye(None, "autologout").unwrap();
        assert_eq!(dump(&bye), "* BYE autologout\r\n");
    }

    #[test]
    fn test_encode_data() {
        assert_eq!(dump(&Data::Exists(3)), "* 3 EXISTS\r\n");
        assert_eq!(dump(&Data::Recent(1)), "* 1 RECENT\r\n");
        assert_eq!(
            dump(&Data::Expunge(NonZeroU32::new(3).unwrap())),
            "* 3 EXPUNGE\r\n",
        );
        assert_eq!(
            dump(&Data::Search(vec![
                NonZeroU32::new(2).unwrap(),
                NonZeroU32::new(5).unwrap(),
            ])),
            "* SEARCH 2 5\r\n",
        );
        assert_eq!(dump(&Data::Search(vec![])), "* SEARCH\r\n");
        assert_eq!(
            dump(&Data::Flags(vec![Flag::Seen, Flag::Deleted])),
            "* FLAGS (\\Seen \\Deleted)\r\n",
        );
    }

    #[test]
    fn test_encode_list_data() {
        let data = Data::List {
            items: vec![FlagNameAttribute::HasNoChildren],
            delimiter: Some(QuotedChar::try_from('/').unwrap()),
            mailbox: Mailbox::try_from("Entwürfe").unwrap(),
        };

        // The modified UTF-7 form consists of atom chars only.
        assert_eq!(
            dump(&data),
            "* LIST (\\HasNoChildren) \"/\" Entw&APw-rfe\r\n",
        );

        let data = Data::List {
            items: vec![],
            delimiter: Some(QuotedChar::try_from('/').unwrap()),
            mailbox: Mailbox::try_from("two words").unwrap(),
        };

        assert_eq!(dump(&data), "* LIST () \"/\" \"two words\"\r\n");
    }

    #[test]
    fn test_encode_fetch_with_literal() {
        let data = Data::Fetch {
            seq: NonZeroU32::new(1).unwrap(),
            items: Vec1::from(MessageDataItem::BodyExt {
                section: None,
                origin: None,
                data: NString(Some(IString::Literal(
                    Literal::try_from("line1\r\nline2\r\n").unwrap(),
                ))),
            }),
        };

        assert_eq!(
            dump(&data),
            "* 1 FETCH (BODY[] {14}\r\nline1\r\nline2\r\n)\r\n",
        );
    }

    #[test]
    fn test_encode_continue() {
        let cont = Continue::basic(None, "reading literal").unwrap();
        assert_eq!(dump(&cont), "+ reading literal\r\n");

        let challenge = Continue::Base64(b"challenge".to_vec());
        assert_eq!(dump(&challenge), "+ Y2hhbGxlbmdl\r\n");
    }
}
