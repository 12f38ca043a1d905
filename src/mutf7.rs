//! Modified UTF-7 (RFC 3501, section 5.1.3).
//!
//! Mailbox names are 7-bit on the wire. Non-ASCII characters are carried in
//! "&...-" sections holding base64-encoded UTF-16BE, with a modified base64
//! alphabet (`,` instead of `/`) and no padding. `&` itself is written `&-`.
//!
//! [`decode`] only accepts the canonical encoding: a name that decodes but
//! would re-encode differently (superfluous shifts, padding bits) is rejected,
//! which is what guarantees that accepted names round-trip bit-exactly.

use base64::{
    alphabet::IMAP_MUTF7,
    engine::{general_purpose::NO_PAD, GeneralPurpose},
    Engine,
};
use thiserror::Error;

const BASE64: GeneralPurpose = GeneralPurpose::new(&IMAP_MUTF7, NO_PAD);

#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum Mutf7Error {
    #[error("Byte b'\\x{0:02x}' not allowed in a modified UTF-7 name")]
    ByteNotAllowed(u8),
    #[error("Unterminated base64 section")]
    UnterminatedShift,
    #[error("Invalid base64 section")]
    BadBase64,
    #[error("Invalid UTF-16 data in base64 section")]
    BadUtf16,
    #[error("Name is not in canonical modified UTF-7")]
    NotCanonical,
}

/// Encodes a UTF-8 mailbox name into modified UTF-7.
pub fn encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut shifted: Vec<u16> = Vec::new();

    for c in name.chars() {
        match c {
            '&' => {
                flush(&mut out, &mut shifted);
                out.push_str("&-");
            }
            '\x20'..='\x7e' => {
                flush(&mut out, &mut shifted);
                out.push(c);
            }
            _ => {
                let mut buf = [0u16; 2];
                shifted.extend_from_slice(c.encode_utf16(&mut buf));
            }
        }
    }

    flush(&mut out, &mut shifted);

    out
}

fn flush(out: &mut String, shifted: &mut Vec<u16>) {
    if shifted.is_empty() {
        return;
    }

    let bytes: Vec<u8> = shifted.drain(..).flat_map(u16::to_be_bytes).collect();

    out.push('&');
    out.push_str(&BASE64.encode(bytes));
    out.push('-');
}

/// Decodes a modified UTF-7 mailbox name into UTF-8.
///
/// Rejects non-canonical input (see module documentation).
pub fn decode(name: &[u8]) -> Result<String, Mutf7Error> {
    let mut out = String::with_capacity(name.len());
    let mut i = 0;

    while i < name.len() {
        match name[i] {
            b'&' => {
                let end = name[i + 1..]
                    .iter()
                    .position(|&b| b == b'-')
                    .ok_or(Mutf7Error::UnterminatedShift)?;
                let section = &name[i + 1..i + 1 + end];

                if section.is_empty() {
                    out.push('&');
                } else {
                    let bytes = BASE64.decode(section).map_err(|_| Mutf7Error::BadBase64)?;

                    if bytes.len() % 2 != 0 {
                        return Err(Mutf7Error::BadUtf16);
                    }

                    let units: Vec<u16> = bytes
                        .chunks_exact(2)
                        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                        .collect();

                    for c in char::decode_utf16(units.into_iter()) {
                        out.push(c.map_err(|_| Mutf7Error::BadUtf16)?);
                    }
                }

                i += end + 2;
            }
            // Printable US-ASCII, except "&", represents itself.
            c @ 0x20..=0x7e => {
                out.push(c as char);
                i += 1;
            }
            c => return Err(Mutf7Error::ByteNotAllowed(c)),
        }
    }

    // A decodable name may still use a superfluous shift or non-zero padding
    // bits. Only the canonical form is accepted.
    if encode(&out).as_bytes() != name {
        return Err(Mutf7Error::NotCanonical);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode() {
        // Examples from RFC 3501, section 5.1.3.
        assert_eq!("", decode(b"").unwrap());
        assert_eq!("&", decode(b"&-").unwrap());
        assert_eq!(
            "~peter/mail/台北/日本語",
            decode(b"~peter/mail/&U,BTFw-/&ZeVnLIqe-").unwrap()
        );
        assert_eq!("☺!", decode(b"&Jjo-!").unwrap());
    }

    #[test]
    fn test_decode_rejects_invalid() {
        // No shift back to US-ASCII before "!".
        assert_eq!(Err(Mutf7Error::UnterminatedShift), decode(b"&Jjo!"));
        // Superfluous shift; the canonical form is "&U,BTF2XlZyyKng-".
        assert_eq!(Err(Mutf7Error::NotCanonical), decode(b"&U,BTFw-&ZeVnLIqe-"));
        assert_eq!(Err(Mutf7Error::ByteNotAllowed(0x0a)), decode(b"a\nb"));
    }

    #[test]
    fn test_encode() {
        assert_eq!("INBOX/Sent", encode("INBOX/Sent"));
        assert_eq!("&Jjo-!", encode("☺!"));
        assert_eq!("a&-b", encode("a&b"));
        assert_eq!("&U,BTF2XlZyyKng-", encode("台北日本語"));
    }

    #[test]
    fn test_round_trip() {
        for name in ["INBOX", "a&b", "~peter/mail/台北/日本語", "Entwürfe"] {
            assert_eq!(name, decode(encode(name).as_bytes()).unwrap());
        }
    }
}
