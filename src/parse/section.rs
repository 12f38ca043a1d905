use abnf_core::streaming::sp;
use nom::{
    branch::alt,
    bytes::streaming::{tag, tag_no_case},
    combinator::{map, opt},
    multi::separated_list1,
    sequence::{delimited, preceded},
};

use crate::{
    parse::{
        core::{astring, nz_number},
        IMAPResult,
    },
    types::{
        core::{AString, Vec1},
        fetch::{Part, Section},
    },
};

/// `section-part = nz-number *("." nz-number)`
///
/// Body part nesting
fn section_part(input: &[u8]) -> IMAPResult<Part> {
    map(separated_list1(tag(b"."), nz_number), |numbers| {
        // Safety: `unwrap` can't panic because `separated_list1` yields at
        // least one element.
        Part(Vec1::try_from(numbers).unwrap())
    })(input)
}

/// `header-list = "(" header-fld-name *(SP header-fld-name) ")"`
fn header_list(input: &[u8]) -> IMAPResult<Vec1<AString>> {
    map(
        delimited(tag(b"("), separated_list1(sp, astring), tag(b")")),
        |fields| {
            // Safety: see above.
            Vec1::try_from(fields).unwrap()
        },
    )(input)
}

/// `section-msgtext = "HEADER" /
///                    "HEADER.FIELDS" [".NOT"] SP header-list /
///                    "TEXT"`
///
/// Top-level or MESSAGE/RFC822 part
fn section_msgtext(part: Option<Part>) -> impl FnMut(&[u8]) -> IMAPResult<Section> {
    move |input| {
        alt((
            map(
                preceded(tag_no_case(b"HEADER.FIELDS.NOT"), preceded(sp, header_list)),
                |fields| Section::HeaderFieldsNot(part.clone(), fields),
            ),
            map(
                preceded(tag_no_case(b"HEADER.FIELDS"), preceded(sp, header_list)),
                |fields| Section::HeaderFields(part.clone(), fields),
            ),
            map(tag_no_case(b"HEADER"), |_| Section::Header(part.clone())),
            map(tag_no_case(b"TEXT"), |_| Section::Text(part.clone())),
        ))(input)
    }
}

/// `section-spec = section-msgtext / (section-part ["." section-text])`
///
/// `section-text = section-msgtext / "MIME"`
fn section_spec(input: &[u8]) -> IMAPResult<Section> {
    alt((
        section_msgtext(None),
        |input| {
            let (remaining, part) = section_part(input)?;

            let (remaining, sub) = opt(preceded(
                tag(b"."),
                alt((
                    map(tag_no_case(b"MIME"), |_| None),
                    map(section_msgtext(Some(part.clone())), Some),
                )),
            ))(remaining)?;

            let section = match sub {
                None => Section::Part(part),
                Some(None) => Section::Mime(part),
                Some(Some(section)) => section,
            };

            Ok((remaining, section))
        },
    ))(input)
}

/// `section = "[" [section-spec] "]"`
pub(crate) fn section(input: &[u8]) -> IMAPResult<Option<Section>> {
    delimited(tag(b"["), opt(section_spec), tag(b"]"))(input)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;

    fn part(numbers: &[u32]) -> Part {
        Part(
            Vec1::try_from(
                numbers
                    .iter()
                    .map(|n| NonZeroU32::new(*n).unwrap())
                    .collect::<Vec<_>>(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_section() {
        let (rem, got) = section(b"[] ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(got, None);

        let (_, got) = section(b"[HEADER] ").unwrap();
        assert_eq!(got, Some(Section::Header(None)));

        let (_, got) = section(b"[1.2.3] ").unwrap();
        assert_eq!(got, Some(Section::Part(part(&[1, 2, 3]))));

        let (_, got) = section(b"[1.MIME] ").unwrap();
        assert_eq!(got, Some(Section::Mime(part(&[1]))));

        let (_, got) = section(b"[1.2.TEXT] ").unwrap();
        assert_eq!(got, Some(Section::Text(Some(part(&[1, 2])))));
    }

    #[test]
    fn test_section_header_fields() {
        let (_, got) = section(b"[HEADER.FIELDS (Subject Date)] ").unwrap();
        match got {
            Some(Section::HeaderFields(None, fields)) => {
                assert_eq!(fields.as_ref().len(), 2);
            }
            other => panic!("unexpected: {other:?}"),
        }

        let (_, got) = section(b"[HEADER.FIELDS.NOT (To)] ").unwrap();
        assert!(matches!(got, Some(Section::HeaderFieldsNot(None, _))));
    }
}
