use nom::{
    branch::alt,
    bytes::streaming::tag,
    combinator::map,
    multi::separated_list0,
    sequence::{delimited, preceded},
};

use abnf_core::streaming::sp;

use crate::{
    parse::{core::atom, IMAPResult},
    types::flag::Flag,
};

/// `flag = "\Answered" / "\Flagged" / "\Deleted" / "\Seen" / "\Draft" /
///         flag-keyword / flag-extension`
///
/// Note: The grammar distinguishes system flags by name; parsing an atom and
/// classifying it afterwards covers all alternatives.
pub(crate) fn flag(input: &[u8]) -> IMAPResult<Flag> {
    alt((
        map(preceded(tag(b"\\"), atom), Flag::system),
        map(atom, Flag::keyword),
    ))(input)
}

/// `flag-list = "(" [flag *(SP flag)] ")"`
pub(crate) fn flag_list(input: &[u8]) -> IMAPResult<Vec<Flag>> {
    delimited(tag(b"("), separated_list0(sp, flag), tag(b")"))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::core::Atom;

    #[test]
    fn test_flag() {
        let (rem, got) = flag(b"\\Deleted ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(got, Flag::Deleted);

        let (rem, got) = flag(b"$MDNSent ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(got, Flag::Keyword(Atom::try_from("$MDNSent").unwrap()));
    }

    #[test]
    fn test_flag_list() {
        let (rem, got) = flag_list(b"(\\Seen \\Deleted) ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(got, vec![Flag::Seen, Flag::Deleted]);

        let (rem, got) = flag_list(b"() ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(got, vec![]);
    }
}
