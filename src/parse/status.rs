use nom::{branch::alt, bytes::streaming::tag_no_case, combinator::value};

use crate::{parse::IMAPResult, types::status::StatusDataItemName};

/// `status-att = "MESSAGES" / "RECENT" / "UIDNEXT" / "UIDVALIDITY" /
///               "UNSEEN" / "HIGHESTMODSEQ"` (extended by CONDSTORE)
pub(crate) fn status_att(input: &[u8]) -> IMAPResult<StatusDataItemName> {
    alt((
        value(StatusDataItemName::Messages, tag_no_case(b"MESSAGES")),
        value(StatusDataItemName::Recent, tag_no_case(b"RECENT")),
        value(StatusDataItemName::UidNext, tag_no_case(b"UIDNEXT")),
        value(
            StatusDataItemName::UidValidity,
            tag_no_case(b"UIDVALIDITY"),
        ),
        value(StatusDataItemName::Unseen, tag_no_case(b"UNSEEN")),
        value(
            StatusDataItemName::HighestModSeq,
            tag_no_case(b"HIGHESTMODSEQ"),
        ),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_att() {
        let (rem, got) = status_att(b"uidvalidity ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(got, StatusDataItemName::UidValidity);

        assert!(status_att(b"unknown ").is_err());
    }
}
