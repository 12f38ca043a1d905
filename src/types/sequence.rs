//! Sequence sets: `sequence-set = (seq-number / seq-range) *("," ...)`.

use std::{num::NonZeroU32, str::FromStr};

use crate::types::{
    core::Vec1,
    error::{ValidationError, ValidationErrorKind},
};

pub const ONE: NonZeroU32 = match NonZeroU32::new(1) {
    Some(one) => one,
    None => panic!(),
};

/// A set of message sequence numbers or UIDs.
///
/// Whether the numbers are MSNs or UIDs is decided by command context (the
/// `UID` prefix), not by the type.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SequenceSet(pub Vec1<Sequence>);

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Sequence {
    Single(SeqOrUid),
    Range(SeqOrUid, SeqOrUid),
}

/// A sequence number, or `*` for the largest number in use.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SeqOrUid {
    Value(NonZeroU32),
    Asterisk,
}

impl SeqOrUid {
    /// Resolves `*` against the largest number currently in use.
    pub fn expand(&self, largest: NonZeroU32) -> NonZeroU32 {
        match self {
            SeqOrUid::Value(value) => *value,
            SeqOrUid::Asterisk => largest,
        }
    }
}

impl SequenceSet {
    /// Iterate over a sorted, deduplicated expansion of this set.
    ///
    /// ```
    /// use std::num::NonZeroU32;
    ///
    /// use imap_server::types::sequence::SequenceSet;
    ///
    /// let set: SequenceSet = "1:5,10:3,10,1".parse().unwrap();
    /// let largest = NonZeroU32::new(10).unwrap();
    ///
    /// assert_eq!(
    ///     set.iter(largest).map(NonZeroU32::get).collect::<Vec<_>>(),
    ///     [1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
    /// );
    /// ```
    pub fn iter(&self, largest: NonZeroU32) -> impl Iterator<Item = NonZeroU32> {
        let mut ranges: Vec<(u32, u32)> = self
            .0
            .as_ref()
            .iter()
            .map(|sequence| sequence.bounds(largest))
            .collect();

        ranges.sort_unstable();

        // Merge overlapping and adjacent ranges.
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
        for (a, b) in ranges {
            match merged.last_mut() {
                Some((_, last_b)) if a <= last_b.saturating_add(1) => *last_b = (*last_b).max(b),
                _ => merged.push((a, b)),
            }
        }

        merged
            .into_iter()
            .flat_map(|(a, b)| (a..=b).map(|n| NonZeroU32::new(n).unwrap()))
    }

    /// Returns whether `value` is contained in this set.
    pub fn contains(&self, value: NonZeroU32, largest: NonZeroU32) -> bool {
        self.0.as_ref().iter().any(|sequence| {
            let (a, b) = sequence.bounds(largest);
            (a..=b).contains(&value.get())
        })
    }
}

impl Sequence {
    /// The inclusive `(low, high)` bounds of this sequence, `*` expanded.
    fn bounds(&self, largest: NonZeroU32) -> (u32, u32) {
        match self {
            Sequence::Single(value) => {
                let value = value.expand(largest).get();
                (value, value)
            }
            Sequence::Range(a, b) => {
                let a = a.expand(largest).get();
                let b = b.expand(largest).get();
                (a.min(b), a.max(b))
            }
        }
    }
}

impl From<Sequence> for SequenceSet {
    fn from(sequence: Sequence) -> Self {
        Self(Vec1::from(sequence))
    }
}

impl From<NonZeroU32> for SequenceSet {
    fn from(value: NonZeroU32) -> Self {
        Self::from(Sequence::Single(SeqOrUid::Value(value)))
    }
}

impl TryFrom<Vec<NonZeroU32>> for SequenceSet {
    type Error = ValidationError;

    fn try_from(values: Vec<NonZeroU32>) -> Result<Self, Self::Error> {
        Ok(Self(Vec1::try_from(
            values
                .into_iter()
                .map(|value| Sequence::Single(SeqOrUid::Value(value)))
                .collect::<Vec<_>>(),
        )?))
    }
}

impl FromStr for SequenceSet {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut results = vec![];

        for seq in value.split(',') {
            results.push(seq.parse()?);
        }

        Ok(SequenceSet(Vec1::try_from(results)?))
    }
}

impl FromStr for Sequence {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split(':').count() {
            1 => Ok(Sequence::Single(value.parse()?)),
            2 => {
                let mut split = value.split(':');

                let start = split.next().unwrap();
                let end = split.next().unwrap();

                Ok(Sequence::Range(start.parse()?, end.parse()?))
            }
            _ => Err(ValidationError::new(ValidationErrorKind::Invalid)),
        }
    }
}

impl FromStr for SeqOrUid {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "*" {
            Ok(SeqOrUid::Asterisk)
        } else {
            // Rust's `parse::<NonZeroU32>` accepts leading zeroes, e.g.
            // "00001". The IMAP grammar does not.
            if value.starts_with('0') {
                Err(ValidationError::new(ValidationErrorKind::Invalid))
            } else {
                Ok(SeqOrUid::Value(value.parse().map_err(|_| {
                    ValidationError::new(ValidationErrorKind::Invalid)
                })?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "1".parse::<SequenceSet>().unwrap(),
            SequenceSet::from(Sequence::Single(SeqOrUid::Value(nz(1)))),
        );
        assert_eq!(
            "4:*".parse::<Sequence>().unwrap(),
            Sequence::Range(SeqOrUid::Value(nz(4)), SeqOrUid::Asterisk),
        );

        for invalid in ["", "a", "0", "01", "1:2:3", "1,,2", "-1"] {
            assert!(invalid.parse::<SequenceSet>().is_err(), "{invalid:?}");
        }
    }

    #[test]
    fn test_iter_sorts_and_dedups() {
        let set: SequenceSet = "1:5,10:3,10,10,1".parse().unwrap();

        assert_eq!(
            set.iter(nz(10)).map(NonZeroU32::get).collect::<Vec<_>>(),
            [1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
        );
    }

    #[test]
    fn test_asterisk_expands_to_largest() {
        let set: SequenceSet = "12:*".parse().unwrap();

        // "a message sequence number of 3:* includes message 3 when the
        // mailbox has fewer than 3 messages" is about MSN validation, not
        // expansion; a backwards range is reordered.
        assert_eq!(
            set.iter(nz(10)).map(NonZeroU32::get).collect::<Vec<_>>(),
            [10, 11, 12],
        );
    }

    #[test]
    fn test_contains() {
        let set: SequenceSet = "1,3,5:7".parse().unwrap();

        for (value, expected) in [(1, true), (2, false), (3, true), (6, true), (8, false)] {
            assert_eq!(set.contains(nz(value), nz(100)), expected);
        }
    }
}
