use abnf_core::streaming::{dquote, sp};
use nom::{
    branch::alt,
    bytes::streaming::{tag, take_while_m_n},
    character::{is_digit, streaming::char},
    combinator::map_res,
    sequence::{delimited, preceded, tuple},
};

use crate::{
    parse::{IMAPErrorKind, IMAPParseError, IMAPResult},
    types::datetime::{datetime_from_parts, DateTime, NaiveDate, MONTHS},
};

fn digits(min: usize, max: usize) -> impl Fn(&[u8]) -> IMAPResult<u32> {
    move |input| {
        map_res(take_while_m_n(min, max, is_digit), |bytes: &[u8]| {
            // Safety: `unwrap` is safe because `is_digit` enforces ASCII.
            std::str::from_utf8(bytes).unwrap().parse::<u32>()
        })(input)
    }
}

/// `date-day = 1*2DIGIT`
fn date_day(input: &[u8]) -> IMAPResult<u32> {
    digits(1, 2)(input)
}

/// `date-day-fixed = (SP DIGIT) / 2DIGIT`
fn date_day_fixed(input: &[u8]) -> IMAPResult<u32> {
    alt((preceded(sp, digits(1, 1)), digits(2, 2)))(input)
}

/// `date-month = "Jan" / "Feb" / "Mar" / "Apr" / "May" / "Jun" /
///               "Jul" / "Aug" / "Sep" / "Oct" / "Nov" / "Dec"`
///
/// Returns the zero-based month.
fn date_month(input: &[u8]) -> IMAPResult<u32> {
    for (month0, name) in MONTHS.iter().enumerate() {
        if let Ok((remaining, _)) =
            nom::bytes::streaming::tag_no_case::<_, _, IMAPParseError>(name.as_bytes())(input)
        {
            return Ok((remaining, month0 as u32));
        }
    }

    Err(nom::Err::Error(IMAPParseError {
        input,
        kind: IMAPErrorKind::BadDateTime,
    }))
}

/// `date-year = 4DIGIT`
fn date_year(input: &[u8]) -> IMAPResult<u32> {
    digits(4, 4)(input)
}

/// `date-text = date-day "-" date-month "-" date-year`
fn date_text(input: &[u8]) -> IMAPResult<chrono::NaiveDate> {
    let (remaining, (day, _, month0, _, year)) =
        tuple((date_day, tag(b"-"), date_month, tag(b"-"), date_year))(input)?;

    match chrono::NaiveDate::from_ymd_opt(year as i32, month0 + 1, day) {
        Some(date) => Ok((remaining, date)),
        None => Err(nom::Err::Failure(IMAPParseError {
            input,
            kind: IMAPErrorKind::BadDateTime,
        })),
    }
}

/// `date = date-text / DQUOTE date-text DQUOTE`
pub(crate) fn date(input: &[u8]) -> IMAPResult<NaiveDate> {
    let (remaining, date) =
        alt((date_text, delimited(dquote, date_text, dquote)))(input)?;

    match NaiveDate::try_from(date) {
        Ok(date) => Ok((remaining, date)),
        Err(_) => Err(nom::Err::Failure(IMAPParseError {
            input,
            kind: IMAPErrorKind::BadDateTime,
        })),
    }
}

/// `zone = ("+" / "-") 4DIGIT`
///
/// Returns the offset east of Greenwich in seconds.
fn zone(input: &[u8]) -> IMAPResult<i32> {
    let (remaining, (sign, value)) =
        tuple((alt((char('+'), char('-'))), digits(4, 4)))(input)?;

    let seconds = ((value / 100) * 3600 + (value % 100) * 60) as i32;

    Ok((
        remaining,
        if sign == '-' { -seconds } else { seconds },
    ))
}

/// `date-time = DQUOTE date-day-fixed "-" date-month "-" date-year
///              SP time SP zone DQUOTE`
///
/// `time = 2DIGIT ":" 2DIGIT ":" 2DIGIT`
pub(crate) fn date_time(input: &[u8]) -> IMAPResult<DateTime> {
    let (remaining, (_, day, _, month0, _, year, _, hour, _, minute, _, second, _, offset, _)) =
        tuple((
            dquote,
            date_day_fixed,
            tag(b"-"),
            date_month,
            tag(b"-"),
            date_year,
            sp,
            digits(2, 2),
            tag(b":"),
            digits(2, 2),
            tag(b":"),
            digits(2, 2),
            sp,
            zone,
            dquote,
        ))(input)?;

    let parsed = datetime_from_parts(day, month0, year as i32, hour, minute, second, offset)
        .and_then(|value| DateTime::try_from(value).ok());

    match parsed {
        Some(datetime) => Ok((remaining, datetime)),
        None => Err(nom::Err::Failure(IMAPParseError {
            input,
            kind: IMAPErrorKind::BadDateTime,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_time() {
        let (rem, got) = date_time(b"\"17-Jul-1996 02:44:25 -0700\" ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(got.to_imap_string(), "17-Jul-1996 02:44:25 -0700");

        let (rem, got) = date_time(b"\" 1-Feb-1994 21:52:25 +0000\" ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(got.to_imap_string(), " 1-Feb-1994 21:52:25 +0000");

        assert!(date_time(b"\"32-Jul-1996 02:44:25 -0700\" ").is_err());
    }

    #[test]
    fn test_date() {
        let (rem, got) = date(b"1-Feb-1994 ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(
            *got.inner(),
            chrono::NaiveDate::from_ymd_opt(1994, 2, 1).unwrap()
        );

        assert!(date(b"\"1-Feb-1994\" ").is_ok());
        assert!(date(b"31-Feb-1994 ").is_err());
    }
}
