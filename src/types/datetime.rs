//! Date and time types.

use std::fmt::{Display, Formatter};

use chrono::{Datelike, FixedOffset, TimeZone};

use crate::types::error::{ValidationError, ValidationErrorKind};

/// An IMAP `date-time`, e.g., `" 1-Feb-1994 21:52:25 -0800"`.
///
/// The day is space-padded to two characters, the month name is English.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DateTime(chrono::DateTime<FixedOffset>);

impl DateTime {
    pub fn validate(value: &chrono::DateTime<FixedOffset>) -> Result<(), ValidationError> {
        // The IMAP grammar has a four-digit year.
        if !(0..=9999).contains(&value.year()) {
            return Err(ValidationError::new(ValidationErrorKind::Invalid));
        }

        Ok(())
    }

    pub fn inner(&self) -> &chrono::DateTime<FixedOffset> {
        &self.0
    }

    pub fn now() -> Self {
        // Safety: the current year is in range.
        Self(chrono::Utc::now().fixed_offset())
    }

    /// Wire form, e.g., `17-Jul-1996 02:44:25 -0700`.
    pub fn to_imap_string(&self) -> String {
        self.0.format("%e-%b-%Y %H:%M:%S %z").to_string()
    }
}

impl TryFrom<chrono::DateTime<FixedOffset>> for DateTime {
    type Error = ValidationError;

    fn try_from(value: chrono::DateTime<FixedOffset>) -> Result<Self, Self::Error> {
        Self::validate(&value)?;

        Ok(Self(value))
    }
}

impl Display for DateTime {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "\"{}\"", self.to_imap_string())
    }
}

/// An IMAP `date`, e.g., `1-Feb-1994`. Only used in SEARCH criteria.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct NaiveDate(chrono::NaiveDate);

impl NaiveDate {
    pub fn validate(value: &chrono::NaiveDate) -> Result<(), ValidationError> {
        if !(0..=9999).contains(&value.year()) {
            return Err(ValidationError::new(ValidationErrorKind::Invalid));
        }

        Ok(())
    }

    pub fn inner(&self) -> &chrono::NaiveDate {
        &self.0
    }
}

impl TryFrom<chrono::NaiveDate> for NaiveDate {
    type Error = ValidationError;

    fn try_from(value: chrono::NaiveDate) -> Result<Self, Self::Error> {
        Self::validate(&value)?;

        Ok(Self(value))
    }
}

pub(crate) const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Builds a date-time from its grammar components.
pub(crate) fn datetime_from_parts(
    day: u32,
    month0: u32,
    year: i32,
    hour: u32,
    minute: u32,
    second: u32,
    offset_seconds: i32,
) -> Option<chrono::DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(offset_seconds)?;

    match offset
        .with_ymd_and_hms(year, month0 + 1, day, hour, minute, second)
    {
        chrono::LocalResult::Single(value) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_imap_string_pads_the_day() {
        let inner = datetime_from_parts(1, 1, 1994, 21, 52, 25, -8 * 3600).unwrap();
        let datetime = DateTime::try_from(inner).unwrap();

        assert_eq!(datetime.to_imap_string(), " 1-Feb-1994 21:52:25 -0800");

        let inner = datetime_from_parts(17, 6, 1996, 2, 44, 25, -7 * 3600).unwrap();
        let datetime = DateTime::try_from(inner).unwrap();

        assert_eq!(datetime.to_imap_string(), "17-Jul-1996 02:44:25 -0700");
    }
}
