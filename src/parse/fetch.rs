use abnf_core::streaming::sp;
use nom::{
    branch::alt,
    bytes::streaming::{tag, tag_no_case},
    combinator::{map, opt, value},
    multi::separated_list1,
    sequence::{delimited, tuple},
};

use crate::{
    parse::{
        core::{number, nz_number},
        section::section,
        IMAPResult,
    },
    types::fetch::{Macro, MacroOrMessageDataItemNames, MessageDataItemName},
};

/// `fetch-att = "ENVELOPE" /
///              "FLAGS" /
///              "INTERNALDATE" /
///              "RFC822" [".HEADER" / ".SIZE" / ".TEXT"] /
///              "BODY" ["STRUCTURE"] /
///              "UID" /
///              "BODY" section ["<" number "." nz-number ">"] /
///              "BODY.PEEK" section ["<" number "." nz-number ">"] /
///              "MODSEQ"` (CONDSTORE)
pub(crate) fn fetch_att(input: &[u8]) -> IMAPResult<MessageDataItemName> {
    alt((
        value(MessageDataItemName::Envelope, tag_no_case(b"ENVELOPE")),
        value(MessageDataItemName::Flags, tag_no_case(b"FLAGS")),
        value(
            MessageDataItemName::InternalDate,
            tag_no_case(b"INTERNALDATE"),
        ),
        value(MessageDataItemName::ModSeq, tag_no_case(b"MODSEQ")),
        value(
            MessageDataItemName::Rfc822Header,
            tag_no_case(b"RFC822.HEADER"),
        ),
        value(MessageDataItemName::Rfc822Size, tag_no_case(b"RFC822.SIZE")),
        value(MessageDataItemName::Rfc822Text, tag_no_case(b"RFC822.TEXT")),
        value(MessageDataItemName::Rfc822, tag_no_case(b"RFC822")),
        value(
            MessageDataItemName::BodyStructure,
            tag_no_case(b"BODYSTRUCTURE"),
        ),
        map(
            tuple((tag_no_case(b"BODY.PEEK"), section, opt(partial))),
            |(_, section, partial)| MessageDataItemName::BodyExt {
                section,
                partial,
                peek: true,
            },
        ),
        map(
            tuple((tag_no_case(b"BODY"), section, opt(partial))),
            |(_, section, partial)| MessageDataItemName::BodyExt {
                section,
                partial,
                peek: false,
            },
        ),
        value(MessageDataItemName::Body, tag_no_case(b"BODY")),
        value(MessageDataItemName::Uid, tag_no_case(b"UID")),
    ))(input)
}

/// `"<" number "." nz-number ">"`
fn partial(input: &[u8]) -> IMAPResult<(u32, std::num::NonZeroU32)> {
    delimited(
        tag(b"<"),
        map(tuple((number, tag(b"."), nz_number)), |(start, _, len)| {
            (start, len)
        }),
        tag(b">"),
    )(input)
}

/// The fetch argument: a macro, a single item, or a parenthesized item list.
pub(crate) fn fetch_args(input: &[u8]) -> IMAPResult<MacroOrMessageDataItemNames> {
    alt((
        value(
            MacroOrMessageDataItemNames::Macro(Macro::All),
            tag_no_case(b"ALL"),
        ),
        value(
            MacroOrMessageDataItemNames::Macro(Macro::Fast),
            tag_no_case(b"FAST"),
        ),
        value(
            MacroOrMessageDataItemNames::Macro(Macro::Full),
            tag_no_case(b"FULL"),
        ),
        map(fetch_att, |item| {
            MacroOrMessageDataItemNames::MessageDataItemNames(vec![item])
        }),
        map(
            delimited(tag(b"("), separated_list1(sp, fetch_att), tag(b")")),
            MacroOrMessageDataItemNames::MessageDataItemNames,
        ),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_att() {
        let (rem, got) = fetch_att(b"RFC822.SIZE ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(got, MessageDataItemName::Rfc822Size);

        let (rem, got) = fetch_att(b"BODY.PEEK[HEADER]<0.100> ").unwrap();
        assert_eq!(rem, b" ");
        assert!(matches!(
            got,
            MessageDataItemName::BodyExt {
                peek: true,
                partial: Some((0, _)),
                ..
            }
        ));

        // Without a section, BODY is the structure item.
        let (rem, got) = fetch_att(b"BODY ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(got, MessageDataItemName::Body);
    }

    #[test]
    fn test_fetch_args() {
        let (_, got) = fetch_args(b"FAST ").unwrap();
        assert_eq!(got, MacroOrMessageDataItemNames::Macro(Macro::Fast));

        let (_, got) = fetch_args(b"(FLAGS UID) ").unwrap();
        assert_eq!(
            got,
            MacroOrMessageDataItemNames::MessageDataItemNames(vec![
                MessageDataItemName::Flags,
                MessageDataItemName::Uid,
            ]),
        );
    }
}
