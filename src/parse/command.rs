#[cfg(not(feature = "quirk_crlf_relaxed"))]
use abnf_core::streaming::crlf;
#[cfg(feature = "quirk_crlf_relaxed")]
use abnf_core::streaming::crlf_relaxed as crlf;
use abnf_core::streaming::sp;
use nom::{
    branch::alt,
    bytes::streaming::{tag, tag_no_case},
    combinator::{map, opt, value},
    multi::{separated_list0, separated_list1},
    sequence::{delimited, preceded, terminated, tuple},
};

use crate::{
    parse::{
        auth_type,
        core::{astring, base64, charset, literal, nil, nstring, number64, string, tag_imap},
        datetime::date_time,
        fetch::fetch_args,
        flag::{flag, flag_list},
        mailbox::{list_mailbox, mailbox, mailbox_reference},
        search::search_key_list,
        sequence::sequence_set,
        status::status_att,
        IMAPResult,
    },
    types::{
        acl::RightSet,
        auth::AuthenticateData,
        command::{AclModification, Command, CommandBody},
        core::Secret,
        flag::{StoreResponse, StoreType},
    },
};

/// `command = tag SP (command-any /
///                    command-auth /
///                    command-nonauth /
///                    command-select) CRLF`
pub(crate) fn command(input: &[u8]) -> IMAPResult<Command> {
    let mut parser = tuple((
        tag_imap,
        sp,
        alt((command_any, command_auth, command_nonauth, command_select)),
        crlf,
    ));

    let (remaining, (tag, _, body, _)) = parser(input)?;

    Ok((remaining, Command::new(tag, body)))
}

// # Command Any

/// `command-any = "CAPABILITY" / "LOGOUT" / "NOOP" / id`
///
/// Note: Valid in all states
fn command_any(input: &[u8]) -> IMAPResult<CommandBody> {
    alt((
        value(CommandBody::Capability, tag_no_case(b"CAPABILITY")),
        value(CommandBody::Logout, tag_no_case(b"LOGOUT")),
        value(CommandBody::Noop, tag_no_case(b"NOOP")),
        id,
    ))(input)
}

/// `id = "ID" SP id-params-list` (RFC 2971)
///
/// `id-params-list = "(" [string SP nstring *(SP string SP nstring)] ")" / nil`
fn id(input: &[u8]) -> IMAPResult<CommandBody> {
    let (remaining, (_, parameters)) = tuple((
        tag_no_case(b"ID"),
        preceded(
            sp,
            alt((
                map(
                    delimited(
                        tag(b"("),
                        separated_list0(sp, tuple((string, sp, nstring))),
                        tag(b")"),
                    ),
                    |params| {
                        Some(
                            params
                                .into_iter()
                                .map(|(key, _, value)| (key, value))
                                .collect(),
                        )
                    },
                ),
                value(None, nil),
            )),
        ),
    ))(input)?;

    Ok((remaining, CommandBody::Id { parameters }))
}

// # Command NonAuth

/// `command-nonauth = login / authenticate / "STARTTLS"`
///
/// Note: Valid only when in Not Authenticated state
fn command_nonauth(input: &[u8]) -> IMAPResult<CommandBody> {
    alt((
        login,
        authenticate,
        value(CommandBody::StartTls, tag_no_case(b"STARTTLS")),
    ))(input)
}

/// `login = "LOGIN" SP userid SP password`
///
/// `userid = astring`, `password = astring`
fn login(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"LOGIN"), sp, astring, sp, astring));

    let (remaining, (_, _, username, _, password)) = parser(input)?;

    Ok((
        remaining,
        CommandBody::Login {
            username,
            password: Secret::new(password),
        },
    ))
}

/// `authenticate = "AUTHENTICATE" SP auth-type [SP (base64 / "=")]`
///
/// The optional initial response is the SASL-IR extension; `=` denotes an
/// empty initial response. Further exchange lines are read with
/// [`authenticate_data`].
fn authenticate(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((
        tag_no_case(b"AUTHENTICATE"),
        sp,
        auth_type,
        opt(preceded(
            sp,
            alt((map(base64, Some), value(None, tag(b"=")))),
        )),
    ));

    let (remaining, (_, _, mechanism, initial_response)) = parser(input)?;

    Ok((
        remaining,
        CommandBody::Authenticate {
            mechanism,
            initial_response: initial_response
                .map(|data| Secret::new(data.unwrap_or_default())),
        },
    ))
}

/// `authenticate-data = ("*" / base64) CRLF`
///
/// A line of the AUTHENTICATE exchange; parsed instead of `command` while a
/// SASL exchange is in progress.
pub(crate) fn authenticate_data(input: &[u8]) -> IMAPResult<AuthenticateData> {
    terminated(
        alt((
            value(AuthenticateData::Cancel, tag(b"*")),
            map(base64, |data| AuthenticateData::Continue(Secret::new(data))),
        )),
        crlf,
    )(input)
}

// # Command Auth

/// `command-auth = append / create / delete / examine / list / lsub /
///                 rename / select / status / subscribe / unsubscribe /
///                 namespace / getacl / setacl / idle`
///
/// Note: Valid only in Authenticated or Selected state
fn command_auth(input: &[u8]) -> IMAPResult<CommandBody> {
    alt((
        append,
        create,
        delete,
        examine,
        list,
        lsub,
        rename,
        select,
        status,
        subscribe,
        unsubscribe,
        value(CommandBody::Namespace, tag_no_case(b"NAMESPACE")),
        getacl,
        setacl,
        value(CommandBody::Idle, tag_no_case(b"IDLE")),
    ))(input)
}

/// `append = "APPEND" SP mailbox [SP flag-list] [SP date-time] SP literal`
fn append(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((
        tag_no_case(b"APPEND"),
        sp,
        mailbox,
        opt(preceded(sp, flag_list)),
        opt(preceded(sp, date_time)),
        sp,
        literal,
    ));

    let (remaining, (_, _, mailbox, flags, date, _, message)) = parser(input)?;

    Ok((
        remaining,
        CommandBody::Append {
            mailbox,
            flags: flags.unwrap_or_default(),
            date,
            message,
        },
    ))
}

/// `create = "CREATE" SP mailbox`
///
/// Note: Use of INBOX gives a NO error
fn create(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"CREATE"), sp, mailbox));

    let (remaining, (_, _, mailbox)) = parser(input)?;

    Ok((remaining, CommandBody::Create { mailbox }))
}

/// `delete = "DELETE" SP mailbox`
///
/// Note: Use of INBOX gives a NO error
fn delete(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"DELETE"), sp, mailbox));

    let (remaining, (_, _, mailbox)) = parser(input)?;

    Ok((remaining, CommandBody::Delete { mailbox }))
}

/// `examine = "EXAMINE" SP mailbox`
fn examine(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"EXAMINE"), sp, mailbox));

    let (remaining, (_, _, mailbox)) = parser(input)?;

    Ok((remaining, CommandBody::Examine { mailbox }))
}

/// `list = "LIST" SP mailbox SP list-mailbox`
fn list(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"LIST"), sp, mailbox_reference, sp, list_mailbox));

    let (remaining, (_, _, reference, _, mailbox_wildcard)) = parser(input)?;

    Ok((
        remaining,
        CommandBody::List {
            reference,
            mailbox_wildcard,
        },
    ))
}

/// `lsub = "LSUB" SP mailbox SP list-mailbox`
fn lsub(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"LSUB"), sp, mailbox_reference, sp, list_mailbox));

    let (remaining, (_, _, reference, _, mailbox_wildcard)) = parser(input)?;

    Ok((
        remaining,
        CommandBody::Lsub {
            reference,
            mailbox_wildcard,
        },
    ))
}

/// `rename = "RENAME" SP mailbox SP mailbox`
///
/// Note: Use of INBOX as a destination gives a NO error
fn rename(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"RENAME"), sp, mailbox, sp, mailbox));

    let (remaining, (_, _, from, _, to)) = parser(input)?;

    Ok((remaining, CommandBody::Rename { from, to }))
}

/// `select = "SELECT" SP mailbox`
fn select(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"SELECT"), sp, mailbox));

    let (remaining, (_, _, mailbox)) = parser(input)?;

    Ok((remaining, CommandBody::Select { mailbox }))
}

/// `status = "STATUS" SP mailbox SP "(" status-att *(SP status-att) ")"`
fn status(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((
        tag_no_case(b"STATUS"),
        sp,
        mailbox,
        sp,
        delimited(tag(b"("), separated_list0(sp, status_att), tag(b")")),
    ));

    let (remaining, (_, _, mailbox, _, item_names)) = parser(input)?;

    Ok((
        remaining,
        CommandBody::Status {
            mailbox,
            item_names,
        },
    ))
}

/// `subscribe = "SUBSCRIBE" SP mailbox`
fn subscribe(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"SUBSCRIBE"), sp, mailbox));

    let (remaining, (_, _, mailbox)) = parser(input)?;

    Ok((remaining, CommandBody::Subscribe { mailbox }))
}

/// `unsubscribe = "UNSUBSCRIBE" SP mailbox`
fn unsubscribe(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"UNSUBSCRIBE"), sp, mailbox));

    let (remaining, (_, _, mailbox)) = parser(input)?;

    Ok((remaining, CommandBody::Unsubscribe { mailbox }))
}

/// `getacl = "GETACL" SP mailbox` (RFC 4314)
fn getacl(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"GETACL"), sp, mailbox));

    let (remaining, (_, _, mailbox)) = parser(input)?;

    Ok((remaining, CommandBody::GetAcl { mailbox }))
}

/// `setacl = "SETACL" SP mailbox SP identifier SP mod-rights` (RFC 4314)
///
/// `mod-rights = astring` with an optional leading `+` or `-`.
fn setacl(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"SETACL"), sp, mailbox, sp, astring, sp, astring));

    let (remaining, (_, _, mailbox, _, identifier, _, mod_rights)) = parser(input)?;

    let bad_rights = || {
        nom::Err::Failure(crate::parse::IMAPParseError {
            input,
            kind: crate::parse::IMAPErrorKind::Nom(nom::error::ErrorKind::Verify),
        })
    };

    let raw = mod_rights.to_str().ok_or_else(bad_rights)?.to_owned();

    let modification = match raw.as_bytes().first() {
        Some(b'+') => {
            AclModification::Add(RightSet::try_from(&raw[1..]).map_err(|_| bad_rights())?)
        }
        Some(b'-') => {
            AclModification::Remove(RightSet::try_from(&raw[1..]).map_err(|_| bad_rights())?)
        }
        _ => AclModification::Replace(RightSet::try_from(raw.as_str()).map_err(|_| bad_rights())?),
    };

    Ok((
        remaining,
        CommandBody::SetAcl {
            mailbox,
            identifier,
            modification,
        },
    ))
}

// # Command Select

/// `command-select = "CHECK" / "CLOSE" / "UNSELECT" / "EXPUNGE" / copy /
///                   fetch / store / uid / search`
///
/// Note: Valid only when in Selected state
fn command_select(input: &[u8]) -> IMAPResult<CommandBody> {
    alt((
        value(CommandBody::Check, tag_no_case(b"CHECK")),
        value(CommandBody::Close, tag_no_case(b"CLOSE")),
        value(CommandBody::Unselect, tag_no_case(b"UNSELECT")),
        value(CommandBody::Expunge, tag_no_case(b"EXPUNGE")),
        copy(false),
        fetch(false),
        store(false),
        search(false),
        uid,
    ))(input)
}

/// `uid = "UID" SP (copy / fetch / search / store / uid-expunge)`
///
/// uid-expunge is RFC 4315.
fn uid(input: &[u8]) -> IMAPResult<CommandBody> {
    preceded(
        tag_no_case(b"UID "),
        alt((copy(true), fetch(true), search(true), store(true), uid_expunge)),
    )(input)
}

/// `uid-expunge = "EXPUNGE" SP sequence-set`
fn uid_expunge(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"EXPUNGE"), sp, sequence_set));

    let (remaining, (_, _, sequence_set)) = parser(input)?;

    Ok((remaining, CommandBody::ExpungeUid { sequence_set }))
}

/// `copy = "COPY" SP sequence-set SP mailbox`
fn copy(uid: bool) -> impl FnMut(&[u8]) -> IMAPResult<CommandBody> {
    move |input| {
        let mut parser = tuple((tag_no_case(b"COPY"), sp, sequence_set, sp, mailbox));

        let (remaining, (_, _, sequence_set, _, mailbox)) = parser(input)?;

        Ok((
            remaining,
            CommandBody::Copy {
                sequence_set,
                mailbox,
                uid,
            },
        ))
    }
}

/// `fetch = "FETCH" SP sequence-set SP ("ALL" / "FULL" / "FAST" /
///          fetch-att / "(" fetch-att *(SP fetch-att) ")")
///          [SP "(" "CHANGEDSINCE" SP mod-sequence-value ")"]`
///
/// The trailing modifier list is RFC 7162.
fn fetch(uid: bool) -> impl FnMut(&[u8]) -> IMAPResult<CommandBody> {
    move |input| {
        let mut parser = tuple((
            tag_no_case(b"FETCH"),
            sp,
            sequence_set,
            sp,
            fetch_args,
            opt(delimited(
                tag_no_case(b" (CHANGEDSINCE "),
                number64,
                tag(b")"),
            )),
        ));

        let (remaining, (_, _, sequence_set, _, macro_or_item_names, changed_since)) =
            parser(input)?;

        Ok((
            remaining,
            CommandBody::Fetch {
                sequence_set,
                macro_or_item_names,
                changed_since,
                uid,
            },
        ))
    }
}

/// `store = "STORE" SP sequence-set [SP "(" "UNCHANGEDSINCE" SP
///          mod-sequence-value ")"] SP store-att-flags`
///
/// `store-att-flags = (["+" / "-"] "FLAGS" [".SILENT"]) SP
///                    (flag-list / (flag *(SP flag)))`
fn store(uid: bool) -> impl FnMut(&[u8]) -> IMAPResult<CommandBody> {
    move |input| {
        let mut parser = tuple((
            tag_no_case(b"STORE"),
            sp,
            sequence_set,
            opt(delimited(
                tag_no_case(b" (UNCHANGEDSINCE "),
                number64,
                tag(b")"),
            )),
            sp,
            opt(alt((
                value(StoreType::Add, tag(b"+")),
                value(StoreType::Remove, tag(b"-")),
            ))),
            tag_no_case(b"FLAGS"),
            opt(value(StoreResponse::Silent, tag_no_case(b".SILENT"))),
            sp,
            alt((flag_list, separated_list1(sp, flag))),
        ));

        let (remaining, (_, _, sequence_set, unchanged_since, _, kind, _, silent, _, flags)) =
            parser(input)?;

        Ok((
            remaining,
            CommandBody::Store {
                sequence_set,
                kind: kind.unwrap_or(StoreType::Replace),
                response: silent.unwrap_or(StoreResponse::Answer),
                flags,
                unchanged_since,
                uid,
            },
        ))
    }
}

/// `search = "SEARCH" [SP "CHARSET" SP charset] 1*(SP search-key)`
fn search(uid: bool) -> impl FnMut(&[u8]) -> IMAPResult<CommandBody> {
    move |input| {
        let mut parser = tuple((
            tag_no_case(b"SEARCH"),
            opt(preceded(sp, preceded(tag_no_case(b"CHARSET "), charset))),
            preceded(sp, search_key_list),
        ));

        let (remaining, (_, charset, criteria)) = parser(input)?;

        Ok((
            remaining,
            CommandBody::Search {
                charset,
                criteria,
                uid,
            },
        ))
    }
}

/// `idle-done = "DONE" CRLF` (RFC 2177)
///
/// Parsed instead of `command` while the connection is idling.
pub(crate) fn idle_done(input: &[u8]) -> IMAPResult<()> {
    value((), tuple((tag_no_case(b"DONE"), crlf)))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        auth::AuthMechanism,
        core::{AString, Tag},
        fetch::{MacroOrMessageDataItemNames, MessageDataItemName},
        mailbox::Mailbox,
        search::SearchKey,
    };

    fn parse_one(input: &[u8]) -> Command {
        let (rem, command) = command(input).unwrap();
        assert!(rem.is_empty());
        command
    }

    #[test]
    fn test_command_any() {
        let got = parse_one(b"A001 CAPABILITY\r\n");
        assert_eq!(got.tag, Tag::try_from("A001").unwrap());
        assert_eq!(got.body, CommandBody::Capability);

        let got = parse_one(b"a.2 NOOP\r\n");
        assert_eq!(got.body, CommandBody::Noop);
    }

    #[test]
    fn test_id() {
        let got = parse_one(b"a ID NIL\r\n");
        assert_eq!(got.body, CommandBody::Id { parameters: None });

        let got = parse_one(b"a ID (\"name\" \"sodr\" \"version\" NIL)\r\n");
        match got.body {
            CommandBody::Id {
                parameters: Some(parameters),
            } => assert_eq!(parameters.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_login() {
        let got = parse_one(b"A1 LOGIN alice secret\r\n");
        match got.body {
            CommandBody::Login { username, .. } => {
                assert_eq!(username, AString::try_from("alice").unwrap());
            }
            other => panic!("unexpected: {other:?}"),
        }

        // Quoted and literal forms.
        assert!(command(b"A1 LOGIN \"alice\" {6}\r\nsecret\r\n").is_ok());
    }

    #[test]
    fn test_authenticate() {
        let got = parse_one(b"A1 AUTHENTICATE PLAIN\r\n");
        assert_eq!(
            got.body,
            CommandBody::Authenticate {
                mechanism: AuthMechanism::Plain,
                initial_response: None,
            },
        );

        // SASL-IR with empty initial response.
        let got = parse_one(b"A1 AUTHENTICATE PLAIN =\r\n");
        match got.body {
            CommandBody::Authenticate {
                initial_response: Some(data),
                ..
            } => assert!(data.declassify().is_empty()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_select_and_friends() {
        let got = parse_one(b"A1 SELECT INBOX\r\n");
        assert_eq!(
            got.body,
            CommandBody::Select {
                mailbox: Mailbox::Inbox,
            },
        );

        let got = parse_one(b"A1 RENAME foo bar\r\n");
        assert!(matches!(got.body, CommandBody::Rename { .. }));
    }

    #[test]
    fn test_fetch() {
        let got = parse_one(b"A1 FETCH 1:5 (FLAGS UID)\r\n");
        match got.body {
            CommandBody::Fetch {
                macro_or_item_names: MacroOrMessageDataItemNames::MessageDataItemNames(items),
                uid: false,
                changed_since: None,
                ..
            } => assert_eq!(
                items,
                vec![MessageDataItemName::Flags, MessageDataItemName::Uid]
            ),
            other => panic!("unexpected: {other:?}"),
        }

        let got = parse_one(b"A1 UID FETCH 1:* FLAGS (CHANGEDSINCE 42)\r\n");
        match got.body {
            CommandBody::Fetch {
                uid: true,
                changed_since: Some(42),
                ..
            } => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_store() {
        let got = parse_one(b"A1 STORE 1 +FLAGS.SILENT (\\Deleted)\r\n");
        match got.body {
            CommandBody::Store {
                kind: StoreType::Add,
                response: StoreResponse::Silent,
                unchanged_since: None,
                uid: false,
                flags,
                ..
            } => assert_eq!(flags.len(), 1),
            other => panic!("unexpected: {other:?}"),
        }

        let got = parse_one(b"A1 UID STORE 1 (UNCHANGEDSINCE 7) FLAGS \\Seen\r\n");
        match got.body {
            CommandBody::Store {
                kind: StoreType::Replace,
                response: StoreResponse::Answer,
                unchanged_since: Some(7),
                uid: true,
                ..
            } => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_search() {
        let got = parse_one(b"A1 SEARCH UNSEEN\r\n");
        assert_eq!(
            got.body,
            CommandBody::Search {
                charset: None,
                criteria: SearchKey::Unseen,
                uid: false,
            },
        );

        let got = parse_one(b"A1 UID SEARCH CHARSET UTF-8 OR SEEN DELETED\r\n");
        match got.body {
            CommandBody::Search {
                charset: Some(_),
                criteria: SearchKey::Or(..),
                uid: true,
            } => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_append() {
        let got = parse_one(b"A1 APPEND saved (\\Seen) {5}\r\nhello\r\n");
        match got.body {
            CommandBody::Append { flags, message, .. } => {
                assert_eq!(flags.len(), 1);
                assert_eq!(message.data(), b"hello");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_uid_expunge() {
        let got = parse_one(b"A1 UID EXPUNGE 1:4\r\n");
        assert!(matches!(got.body, CommandBody::ExpungeUid { .. }));
    }

    #[test]
    fn test_setacl() {
        let got = parse_one(b"A1 SETACL INBOX bob +lr\r\n");
        match got.body {
            CommandBody::SetAcl {
                modification: AclModification::Add(rights),
                ..
            } => assert_eq!(rights.to_string(), "lr"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_no_such_command() {
        assert!(command(b"A1 FOO BAR\r\n").is_err());
    }

    #[test]
    fn test_authenticate_data_line() {
        let (_, got) = authenticate_data(b"*\r\n").unwrap();
        assert_eq!(got, AuthenticateData::Cancel);

        let (_, got) = authenticate_data(b"AGFsaWNlAHNlY3JldA==\r\n").unwrap();
        match got {
            AuthenticateData::Continue(data) => {
                assert_eq!(data.declassify().as_slice(), b"\x00alice\x00secret");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_idle_done() {
        assert!(idle_done(b"DONE\r\n").is_ok());
        assert!(idle_done(b"done\r\n").is_ok());
        assert!(idle_done(b"DONE").is_err());
    }
}
