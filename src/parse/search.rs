use abnf_core::streaming::sp;
use nom::{
    branch::alt,
    bytes::streaming::{tag, tag_no_case},
    combinator::{map, value},
    multi::separated_list1,
    sequence::{delimited, preceded, separated_pair, tuple},
};

use crate::{
    parse::{
        core::{astring, atom, number},
        datetime::date,
        sequence::sequence_set,
        IMAPErrorKind, IMAPParseError, IMAPResult,
    },
    types::{core::Vec1, search::SearchKey},
};

/// Maximum nesting of NOT/OR/parenthesized lists.
///
/// A pathological client can nest search keys arbitrarily deep and blow the
/// stack; the original grammar has no limit, so one is imposed here.
const SEARCH_RECURSION_LIMIT: usize = 32;

/// `search-key = <many alternatives>` (see RFC 3501)
pub(crate) fn search_key(input: &[u8]) -> IMAPResult<SearchKey> {
    search_key_limited(input, SEARCH_RECURSION_LIMIT)
}

/// One or more search keys, ANDed.
pub(crate) fn search_key_list(input: &[u8]) -> IMAPResult<SearchKey> {
    map(separated_list1(sp, search_key), |mut keys| {
        if keys.len() == 1 {
            keys.remove(0)
        } else {
            // Safety: `unwrap` can't panic because the list is non-empty.
            SearchKey::And(Vec1::try_from(keys).unwrap())
        }
    })(input)
}

fn search_key_limited(input: &[u8], remaining_recursion: usize) -> IMAPResult<SearchKey> {
    if remaining_recursion == 0 {
        return Err(nom::Err::Failure(IMAPParseError {
            input,
            kind: IMAPErrorKind::RecursionLimitExceeded,
        }));
    }

    let recurse = move |input| search_key_limited(input, remaining_recursion - 1);

    alt((
        alt((
            value(SearchKey::All, tag_no_case(b"ALL")),
            value(SearchKey::Answered, tag_no_case(b"ANSWERED")),
            map(preceded(tag_no_case(b"BCC "), astring), SearchKey::Bcc),
            map(preceded(tag_no_case(b"BEFORE "), date), SearchKey::Before),
            map(preceded(tag_no_case(b"BODY "), astring), SearchKey::Body),
            map(preceded(tag_no_case(b"CC "), astring), SearchKey::Cc),
            value(SearchKey::Deleted, tag_no_case(b"DELETED")),
            value(SearchKey::Draft, tag_no_case(b"DRAFT")),
            value(SearchKey::Flagged, tag_no_case(b"FLAGGED")),
            map(preceded(tag_no_case(b"FROM "), astring), SearchKey::From),
            map(
                preceded(
                    tag_no_case(b"HEADER "),
                    separated_pair(astring, sp, astring),
                ),
                |(field, value)| SearchKey::Header(field, value),
            ),
            map(preceded(tag_no_case(b"KEYWORD "), atom), SearchKey::Keyword),
            map(preceded(tag_no_case(b"LARGER "), number), SearchKey::Larger),
            value(SearchKey::New, tag_no_case(b"NEW")),
            map(preceded(tag_no_case(b"NOT "), recurse), |key| {
                SearchKey::Not(Box::new(key))
            }),
        )),
        alt((
            value(SearchKey::Old, tag_no_case(b"OLD")),
            map(preceded(tag_no_case(b"ON "), date), SearchKey::On),
            map(
                preceded(
                    tag_no_case(b"OR "),
                    tuple((recurse, sp, recurse)),
                ),
                |(a, _, b)| SearchKey::Or(Box::new(a), Box::new(b)),
            ),
            value(SearchKey::Recent, tag_no_case(b"RECENT")),
            map(
                preceded(tag_no_case(b"SENTBEFORE "), date),
                SearchKey::SentBefore,
            ),
            map(preceded(tag_no_case(b"SENTON "), date), SearchKey::SentOn),
            map(
                preceded(tag_no_case(b"SENTSINCE "), date),
                SearchKey::SentSince,
            ),
            value(SearchKey::Seen, tag_no_case(b"SEEN")),
            map(preceded(tag_no_case(b"SINCE "), date), SearchKey::Since),
            map(
                preceded(tag_no_case(b"SMALLER "), number),
                SearchKey::Smaller,
            ),
            map(
                preceded(tag_no_case(b"SUBJECT "), astring),
                SearchKey::Subject,
            ),
            map(preceded(tag_no_case(b"TEXT "), astring), SearchKey::Text),
            map(preceded(tag_no_case(b"TO "), astring), SearchKey::To),
            map(
                preceded(tag_no_case(b"UID "), sequence_set),
                SearchKey::Uid,
            ),
        )),
        alt((
            value(SearchKey::Unanswered, tag_no_case(b"UNANSWERED")),
            value(SearchKey::Undeleted, tag_no_case(b"UNDELETED")),
            value(SearchKey::Undraft, tag_no_case(b"UNDRAFT")),
            value(SearchKey::Unflagged, tag_no_case(b"UNFLAGGED")),
            map(
                preceded(tag_no_case(b"UNKEYWORD "), atom),
                SearchKey::Unkeyword,
            ),
            value(SearchKey::Unseen, tag_no_case(b"UNSEEN")),
            map(sequence_set, SearchKey::SequenceSet),
            map(
                delimited(
                    tag(b"("),
                    separated_list1(sp, recurse),
                    tag(b")"),
                ),
                |mut keys| {
                    if keys.len() == 1 {
                        keys.remove(0)
                    } else {
                        // Safety: `unwrap` can't panic because the list is non-empty.
                        SearchKey::And(Vec1::try_from(keys).unwrap())
                    }
                },
            ),
        )),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_key() {
        let (rem, got) = search_key(b"UNSEEN ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(got, SearchKey::Unseen);

        let (_, got) = search_key(b"OR SEEN FLAGGED ").unwrap();
        assert_eq!(
            got,
            SearchKey::Or(Box::new(SearchKey::Seen), Box::new(SearchKey::Flagged)),
        );

        let (_, got) = search_key(b"NOT (SEEN DELETED) ").unwrap();
        match got {
            SearchKey::Not(inner) => match *inner {
                SearchKey::And(keys) => assert_eq!(keys.as_ref().len(), 2),
                other => panic!("unexpected: {other:?}"),
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_search_key_list() {
        let (_, got) = search_key_list(b"SEEN UNDELETED 1:10\r\n").unwrap();
        match got {
            SearchKey::And(keys) => assert_eq!(keys.as_ref().len(), 3),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_recursion_limit() {
        let mut input = Vec::new();
        for _ in 0..64 {
            input.extend_from_slice(b"NOT ");
        }
        input.extend_from_slice(b"SEEN\r\n");

        assert!(search_key(&input).is_err());
    }
}
