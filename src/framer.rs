//! Utilities to split the incoming byte stream into line and literal
//! fragments.
//!
//! Framing is separated from IMAP parsing: the [`Framer`] detects message
//! boundaries (lines, and the literals announced at their ends) before any
//! detailed parsing happens. This sets clear message boundaries even in the
//! presence of malformed messages, so that malformed input can be reliably
//! discarded. A naive implementation of byte discardment may lead to literal
//! data being interpreted as commands.
//!
//! The caller feeds bytes in with [`Framer::enqueue_bytes`] and calls
//! [`Framer::progress`] until a complete message is available:
//!
//! ```text
//! a LOGIN {5}\r\nalice {6}\r\nsecret\r\n
//! |--- line¹ ---||-²-||- line³-||--⁴--||⁵|
//! ```
//!
//! Fragments 1, 3 and 5 are lines (1 and 3 announce a literal), fragments
//! 2 and 4 are literal data. When a line announces a *synchronizing* literal,
//! the caller must send a continuation request before the client will send
//! more data.

use std::{collections::VecDeque, ops::Range};

use crate::{
    codec::Decoder,
    types::core::{LiteralMode, Tag},
};

/// Splits the incoming byte stream into line and literal fragments.
///
/// The `Framer` prevents excessive memory allocation through a configurable
/// maximum line length and maximum message size. Correct fragmentation is
/// ensured even for messages exceeding the limits, so that framing seamlessly
/// continues with the following message.
#[derive(Clone, Debug)]
pub struct Framer {
    /// Enqueued bytes that are not parsed by [`Framer::progress`] yet.
    unparsed_buffer: VecDeque<u8>,
    /// Upper limit for the length of a single line, literals excluded.
    max_line_length: u32,
    /// Upper limit for the size of a whole message, literals included.
    max_message_size: u32,
    /// Whether a limit was exceeded for the current message.
    exceeded: Option<Exceeded>,
    /// Parsed bytes of the current message.
    message_buffer: Vec<u8>,
    /// Parser for the next fragment of the current message. Is `None` if no
    /// fragment is expected because the message is complete.
    parser: Option<Parser>,
}

/// Which limit the current message ran into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Exceeded {
    /// A single line grew beyond the configured maximum.
    ///
    /// The appropriate reaction is `* BYE` and closing the connection.
    LineLength,
    /// The whole message grew beyond the configured maximum.
    MessageSize,
}

impl Framer {
    pub fn new(max_line_length: u32, max_message_size: u32) -> Self {
        Self {
            unparsed_buffer: VecDeque::new(),
            max_line_length,
            max_message_size,
            exceeded: None,
            message_buffer: Vec::new(),
            parser: Some(Parser::Line(LineParser::new(0))),
        }
    }

    /// Enqueues more bytes to be parsed by [`Framer::progress`].
    pub fn enqueue_bytes(&mut self, bytes: &[u8]) {
        self.unparsed_buffer.extend(bytes);
    }

    /// Continue parsing the current message until the next fragment is detected.
    ///
    /// Returns `None` if more bytes need to be enqueued. If
    /// [`Framer::is_message_complete`] returns true after this function was
    /// called, then the message was fully parsed; the following call will
    /// start the next message.
    pub fn progress(&mut self) -> Option<FragmentInfo> {
        let parser = match &mut self.parser {
            Some(parser) => parser,
            None => {
                // Start next message
                self.exceeded = None;
                self.message_buffer.clear();
                self.parser.insert(Parser::Line(LineParser::new(0)))
            }
        };

        let (parsed_byte_count, fragment) = match parser {
            Parser::Line(parser) => parser.parse(&self.unparsed_buffer),
            Parser::Literal(parser) => parser.parse(&self.unparsed_buffer),
        };

        if let Some(Parser::Line(line_parser)) = &self.parser {
            if line_parser.length() > self.max_line_length as usize {
                self.exceeded.get_or_insert(Exceeded::LineLength);
            }
        }

        self.dequeue_parsed_bytes(parsed_byte_count);

        if let Some(fragment) = fragment {
            self.parser = match fragment {
                // Finish current message
                FragmentInfo::Line {
                    announcement: None, ..
                } => None,
                // Next fragment will be a literal
                FragmentInfo::Line {
                    end,
                    announcement: Some(LiteralAnnouncement { length, .. }),
                    ..
                } => Some(Parser::Literal(LiteralParser::new(end, length))),
                // Next fragment will be a line
                FragmentInfo::Literal { end, .. } => Some(Parser::Line(LineParser::new(end))),
            }
        }

        fragment
    }

    /// Returns the bytes for a fragment of the current message.
    pub fn fragment_bytes(&self, fragment_info: FragmentInfo) -> &[u8] {
        let Range { start, end } = fragment_info.range();
        let start = start.min(self.message_buffer.len());
        let end = end.min(self.message_buffer.len());
        &self.message_buffer[start..end]
    }

    /// Returns whether the current message was fully parsed.
    pub fn is_message_complete(&self) -> bool {
        self.parser.is_none()
    }

    /// Returns the bytes of the current message, which may be incomplete or,
    /// when a limit was exceeded, truncated.
    pub fn message_bytes(&self) -> &[u8] {
        &self.message_buffer
    }

    /// Returns which limit the current message exceeded, if any.
    pub fn exceeded(&self) -> Option<Exceeded> {
        self.exceeded
    }

    /// Skips the current message and starts the next message immediately.
    ///
    /// Warning: if client and server don't agree at which point a message is
    /// skipped, one of them might treat untrusted bytes (e.g. literal data)
    /// as IMAP messages. The only valid use-case is a server that rejects an
    /// announced literal and discards the rest of the message.
    pub fn skip_message(&mut self) {
        self.exceeded = None;
        self.message_buffer.clear();
        self.parser = Some(Parser::Line(LineParser::new(0)));
    }

    /// Removes and returns all bytes that were enqueued but not yet parsed.
    ///
    /// Used for the STARTTLS interposition: bytes a client pipelined after
    /// the STARTTLS command belong to the TLS handshake and must not be
    /// interpreted as IMAP.
    pub fn take_unparsed(&mut self) -> Vec<u8> {
        self.unparsed_buffer.drain(..).collect()
    }

    /// Whether bytes are enqueued that [`Framer::progress`] has not looked
    /// at yet.
    pub fn has_unparsed_bytes(&self) -> bool {
        !self.unparsed_buffer.is_empty()
    }

    /// Tries to decode the [`Tag`] of the current message.
    ///
    /// Best effort; useful when the message is incomplete or malformed and a
    /// tagged response is wanted nevertheless.
    pub fn decode_tag(&self) -> Option<Tag> {
        let end = self
            .message_buffer
            .iter()
            .position(|b| *b == b' ')
            .unwrap_or(self.message_buffer.len());

        Tag::try_from(&self.message_buffer[..end]).ok()
    }

    /// Tries to decode the current message with the given decoder.
    ///
    /// You usually want to call this once [`Framer::is_message_complete`]
    /// returns true. Which decoder applies depends on the state of the IMAP
    /// conversation; the caller is responsible for tracking this state.
    pub fn decode_message<C: Decoder>(
        &self,
        codec: &C,
    ) -> Result<C::Message, DecodeMessageError<C::Error>> {
        if self.exceeded.is_some() {
            return Err(DecodeMessageError::MessageTruncated);
        }

        let (remainder, message) = codec
            .decode(&self.message_buffer)
            .map_err(DecodeMessageError::DecodingFailure)?;

        if !remainder.is_empty() {
            return Err(DecodeMessageError::DecodingRemainder);
        }

        Ok(message)
    }

    fn dequeue_parsed_bytes(&mut self, parsed_byte_count: usize) {
        // The parsed bytes are removed even when they don't fit the message
        // buffer anymore.
        let parsed_bytes = self.unparsed_buffer.drain(..parsed_byte_count);
        let remaining_size = (self.max_message_size as usize).saturating_sub(self.message_buffer.len());

        if remaining_size < parsed_byte_count {
            let remaining_bytes = parsed_bytes.take(remaining_size);
            self.message_buffer.extend(remaining_bytes);
            self.exceeded.get_or_insert(Exceeded::MessageSize);
        } else {
            self.message_buffer.extend(parsed_bytes);
        }
    }
}

/// Stateful parser for the next fragment.
#[derive(Clone, Debug)]
enum Parser {
    Line(LineParser),
    Literal(LiteralParser),
}

/// Stateful parser for the next line fragment.
///
/// The line parser scans for the line ending while tracking whether the line
/// ends with a literal announcement, i.e., `{<digits>[+]}` directly before
/// the line ending.
#[derive(Clone, Debug)]
struct LineParser {
    /// Where we started parsing the line.
    start: usize,
    /// Until where we parsed the line.
    end: usize,
    /// Accumulated state based on the parsed bytes.
    latest_byte: LatestByte,
}

impl LineParser {
    fn new(start: usize) -> Self {
        Self {
            start,
            end: start,
            latest_byte: LatestByte::Other,
        }
    }

    fn length(&self) -> usize {
        self.end - self.start
    }

    fn parse(&mut self, unparsed_bytes: &VecDeque<u8>) -> (usize, Option<FragmentInfo>) {
        let mut parsed_byte_count = 0;
        let mut parsed_line = None;

        for &next_byte in unparsed_bytes {
            parsed_byte_count += 1;
            self.end += 1;

            let line = |announcement| FragmentInfo::Line {
                start: self.start,
                end: self.end,
                announcement,
            };

            self.latest_byte = match (&self.latest_byte, next_byte) {
                (LatestByte::Cr { announcement }, b'\n') => {
                    parsed_line = Some(line(*announcement));
                    LatestByte::Other
                }
                (_, b'\n') => {
                    // A bare LF still ends the line; whether it is accepted
                    // is decided by the command parser.
                    parsed_line = Some(line(None));
                    LatestByte::Other
                }
                (_, b'\r') => match &self.latest_byte {
                    LatestByte::ClosingBracket { announcement } => LatestByte::Cr {
                        announcement: Some(*announcement),
                    },
                    _ => LatestByte::Cr { announcement: None },
                },
                (_, b'{') => LatestByte::OpeningBracket,
                (LatestByte::OpeningBracket, b'0'..=b'9') => LatestByte::Digit {
                    length: (next_byte - b'0') as u32,
                },
                (LatestByte::Digit { length }, b'0'..=b'9') => {
                    let digit = (next_byte - b'0') as u32;
                    match length.checked_mul(10).and_then(|l| l.checked_add(digit)) {
                        Some(length) => LatestByte::Digit { length },
                        None => LatestByte::Other,
                    }
                }
                (LatestByte::Digit { length }, b'+') => LatestByte::Plus { length: *length },
                (LatestByte::Digit { length }, b'}') => LatestByte::ClosingBracket {
                    announcement: LiteralAnnouncement {
                        mode: LiteralMode::Sync,
                        length: *length,
                    },
                },
                (LatestByte::Plus { length }, b'}') => LatestByte::ClosingBracket {
                    announcement: LiteralAnnouncement {
                        mode: LiteralMode::NonSync,
                        length: *length,
                    },
                },
                _ => LatestByte::Other,
            };

            if parsed_line.is_some() {
                break;
            }
        }

        (parsed_byte_count, parsed_line)
    }
}

/// The latest byte seen by the [`LineParser`] with additional accumulated state.
#[derive(Clone, Debug)]
enum LatestByte {
    Other,
    OpeningBracket,
    Digit {
        length: u32,
    },
    Plus {
        length: u32,
    },
    ClosingBracket {
        announcement: LiteralAnnouncement,
    },
    Cr {
        announcement: Option<LiteralAnnouncement>,
    },
}

/// Stateful parser for the next literal fragment.
#[derive(Clone, Debug)]
struct LiteralParser {
    /// Where we started parsing the literal.
    start: usize,
    /// Until where we parsed the literal.
    end: usize,
    /// Remaining bytes we need to parse.
    remaining: u32,
}

impl LiteralParser {
    fn new(start: usize, length: u32) -> Self {
        Self {
            start,
            end: start,
            remaining: length,
        }
    }

    fn parse(&mut self, unparsed_bytes: &VecDeque<u8>) -> (usize, Option<FragmentInfo>) {
        if unparsed_bytes.len() < self.remaining as usize {
            let parsed_byte_count = unparsed_bytes.len();
            self.end += parsed_byte_count;
            self.remaining -= parsed_byte_count as u32;
            (parsed_byte_count, None)
        } else {
            let parsed_byte_count = self.remaining as usize;
            self.end += parsed_byte_count;
            self.remaining = 0;
            let parsed_literal = FragmentInfo::Literal {
                start: self.start,
                end: self.end,
            };
            (parsed_byte_count, Some(parsed_literal))
        }
    }
}

/// Describes a fragment of the current message found by [`Framer::progress`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FragmentInfo {
    /// The fragment is a line.
    Line {
        /// Inclusive start index relative to the current message.
        start: usize,
        /// Exclusive end index relative to the current message.
        end: usize,
        /// Whether the next fragment will be a literal.
        announcement: Option<LiteralAnnouncement>,
    },
    /// The fragment is a literal.
    Literal {
        /// Inclusive start index relative to the current message.
        start: usize,
        /// Exclusive end index relative to the current message.
        end: usize,
    },
}

impl FragmentInfo {
    /// The index range relative to the current message.
    pub fn range(self) -> Range<usize> {
        match self {
            FragmentInfo::Line { start, end, .. } => start..end,
            FragmentInfo::Literal { start, end } => start..end,
        }
    }
}

/// Used by a line to announce a literal following the line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LiteralAnnouncement {
    /// The mode of the announced literal.
    pub mode: LiteralMode,
    /// The length of the announced literal in bytes.
    pub length: u32,
}

/// An error returned by [`Framer::decode_message`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecodeMessageError<E> {
    /// The message ran into a size limit and its bytes are truncated.
    MessageTruncated,
    /// The decoder failed decoding the message.
    DecodingFailure(E),
    /// Not all bytes of the message were used when decoding the message.
    DecodingRemainder,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CommandCodec;

    fn collect_fragments(framer: &mut Framer) -> Vec<FragmentInfo> {
        let mut fragments = Vec::new();
        while let Some(fragment) = framer.progress() {
            fragments.push(fragment);
            if framer.is_message_complete() {
                break;
            }
        }
        fragments
    }

    #[test]
    fn test_plain_line() {
        let mut framer = Framer::new(1024, 64 * 1024);
        framer.enqueue_bytes(b"a NOOP\r\nleftover");

        let fragments = collect_fragments(&mut framer);
        assert_eq!(
            fragments,
            vec![FragmentInfo::Line {
                start: 0,
                end: 8,
                announcement: None,
            }],
        );
        assert!(framer.is_message_complete());
        assert_eq!(framer.message_bytes(), b"a NOOP\r\n");
    }

    #[test]
    fn test_partial_line() {
        let mut framer = Framer::new(1024, 64 * 1024);
        framer.enqueue_bytes(b"a NO");

        assert_eq!(framer.progress(), None);

        framer.enqueue_bytes(b"OP\r\n");
        assert!(collect_fragments(&mut framer).len() == 1);
        assert_eq!(framer.message_bytes(), b"a NOOP\r\n");
    }

    #[test]
    fn test_literal_announcement() {
        let mut framer = Framer::new(1024, 64 * 1024);
        framer.enqueue_bytes(b"a LOGIN {5}\r\nalice {6+}\r\nsecret\r\n");

        let fragments = collect_fragments(&mut framer);
        assert_eq!(
            fragments,
            vec![
                FragmentInfo::Line {
                    start: 0,
                    end: 13,
                    announcement: Some(LiteralAnnouncement {
                        mode: LiteralMode::Sync,
                        length: 5,
                    }),
                },
                FragmentInfo::Literal { start: 13, end: 18 },
                FragmentInfo::Line {
                    start: 18,
                    end: 25,
                    announcement: Some(LiteralAnnouncement {
                        mode: LiteralMode::NonSync,
                        length: 6,
                    }),
                },
                FragmentInfo::Literal { start: 25, end: 31 },
                FragmentInfo::Line {
                    start: 31,
                    end: 33,
                    announcement: None,
                },
            ],
        );

        let command = framer.decode_message(&CommandCodec).unwrap();
        assert_eq!(command.name(), "LOGIN");
    }

    #[test]
    fn test_literal_data_is_not_scanned_for_lines() {
        let mut framer = Framer::new(1024, 64 * 1024);
        framer.enqueue_bytes(b"a APPEND saved {12+}\r\nx\r\ny{3}\r\nz\r\n\r\n");

        let fragments = collect_fragments(&mut framer);

        // The literal contains CRLF and a bogus announcement; neither may
        // influence framing.
        assert_eq!(
            fragments[1],
            FragmentInfo::Literal {
                start: 22,
                end: 34,
            },
        );
        assert!(framer.is_message_complete());
    }

    #[test]
    fn test_line_length_limit() {
        let mut framer = Framer::new(16, 64 * 1024);
        framer.enqueue_bytes(&[b'x'; 64]);
        framer.enqueue_bytes(b"\r\n");

        while framer.progress().is_none() {}

        assert_eq!(framer.exceeded(), Some(Exceeded::LineLength));
    }

    #[test]
    fn test_skip_message() {
        let mut framer = Framer::new(1024, 64 * 1024);
        framer.enqueue_bytes(b"a LOGIN {9999}\r\n");

        let fragment = framer.progress().unwrap();
        assert!(matches!(
            fragment,
            FragmentInfo::Line {
                announcement: Some(LiteralAnnouncement { length: 9999, .. }),
                ..
            }
        ));
        assert_eq!(framer.decode_tag().map(|tag| tag.inner().to_owned()), Some("a".into()));

        framer.skip_message();
        framer.enqueue_bytes(b"b NOOP\r\n");
        collect_fragments(&mut framer);
        assert_eq!(framer.message_bytes(), b"b NOOP\r\n");
    }
}
