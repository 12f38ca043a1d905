use nom::{
    branch::alt,
    bytes::streaming::tag,
    combinator::{map, value},
    multi::separated_list1,
    sequence::separated_pair,
};

use crate::{
    parse::{core::nz_number, IMAPResult},
    types::{
        core::Vec1,
        sequence::{SeqOrUid, Sequence, SequenceSet},
    },
};

/// `seq-number = nz-number / "*"`
fn seq_number(input: &[u8]) -> IMAPResult<SeqOrUid> {
    alt((
        map(nz_number, SeqOrUid::Value),
        value(SeqOrUid::Asterisk, tag(b"*")),
    ))(input)
}

/// `seq-range = seq-number ":" seq-number`
fn seq_range(input: &[u8]) -> IMAPResult<Sequence> {
    map(
        separated_pair(seq_number, tag(b":"), seq_number),
        |(start, end)| Sequence::Range(start, end),
    )(input)
}

/// `sequence-set = (seq-number / seq-range) *("," sequence-set)` (simplified)
pub(crate) fn sequence_set(input: &[u8]) -> IMAPResult<SequenceSet> {
    map(
        separated_list1(
            tag(b","),
            // Ordering is important here: a seq-range is a superset of a seq-number.
            alt((seq_range, map(seq_number, Sequence::Single))),
        ),
        |sequences| {
            // Safety: `unwrap` can't panic because `separated_list1` yields
            // at least one element.
            SequenceSet(Vec1::try_from(sequences).unwrap())
        },
    )(input)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;

    fn value_of(n: u32) -> SeqOrUid {
        SeqOrUid::Value(NonZeroU32::new(n).unwrap())
    }

    #[test]
    fn test_sequence_set() {
        let (rem, set) = sequence_set(b"1,5:10,*,12:* ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(
            set.0.as_ref(),
            &[
                Sequence::Single(value_of(1)),
                Sequence::Range(value_of(5), value_of(10)),
                Sequence::Single(SeqOrUid::Asterisk),
                Sequence::Range(value_of(12), SeqOrUid::Asterisk),
            ],
        );
    }

    #[test]
    fn test_invalid_sequence_set() {
        // The leading zero stops the number parser cold.
        assert!(sequence_set(b"0 ").is_err());
        assert!(sequence_set(b", ").is_err());
    }
}
