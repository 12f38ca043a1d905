//! End-to-end tests: a real connection driver on one end of an in-memory
//! stream, a scripted client on the other.

use std::{sync::Arc, time::Duration};

use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use imap_server::{
    backend::memory::MemoryBackend,
    server::{config::ImapConfig, connection::Connection, Engine},
};

const CAPS_PLAINTEXT: &str = "IMAP4rev1 AUTH=PLAIN AUTH=CRAM-MD5 LITERAL+ IDLE ID NAMESPACE \
                              UIDPLUS UNSELECT CHILDREN CONDSTORE ACL RIGHTS=ekntx";

fn test_config() -> ImapConfig {
    serde_json::from_str(r#"{ "allow-plaintext-passwords": "always" }"#).unwrap()
}

fn test_backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    let alice = backend.add_user("alice", "secret");

    backend
        .deliver(
            &alice,
            "INBOX",
            b"From: Bob <bob@example.org>\r\nSubject: hi\r\n\r\nhello\r\n",
        )
        .unwrap();

    backend
}

struct Client {
    stream: DuplexStream,
    buffer: Vec<u8>,
}

impl Client {
    /// Starts a connection task against a fresh engine and returns the
    /// client end.
    fn connect(engine: &Arc<Engine<MemoryBackend>>) -> Self {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        // The sender leaks so the shutdown channel stays open for the whole
        // test.
        std::mem::forget(_shutdown_tx);

        let connection = Connection::new(Arc::clone(engine), server, false, shutdown_rx);
        tokio::spawn(connection.run());

        Self {
            stream: client,
            buffer: Vec::new(),
        }
    }

    async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Reads one CRLF-terminated line, without the CRLF.
    async fn read_line(&mut self) -> String {
        loop {
            if let Some(at) = self
                .buffer
                .windows(2)
                .position(|window| window == b"\r\n")
            {
                let line = self.buffer.drain(..at + 2).collect::<Vec<u8>>();
                return String::from_utf8_lossy(&line[..line.len() - 2]).into_owned();
            }

            let mut chunk = [0u8; 4096];
            let read = tokio::time::timeout(
                Duration::from_secs(5),
                self.stream.read(&mut chunk),
            )
            .await
            .expect("timed out waiting for a line")
            .expect("stream failed");

            assert_ne!(read, 0, "server closed the stream unexpectedly");
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    /// Reads exactly `n` bytes (for literal payloads).
    async fn read_exact(&mut self, n: usize) -> Vec<u8> {
        while self.buffer.len() < n {
            let mut chunk = [0u8; 4096];
            let read = tokio::time::timeout(
                Duration::from_secs(5),
                self.stream.read(&mut chunk),
            )
            .await
            .expect("timed out waiting for bytes")
            .expect("stream failed");

            assert_ne!(read, 0, "server closed the stream unexpectedly");
            self.buffer.extend_from_slice(&chunk[..read]);
        }

        self.buffer.drain(..n).collect()
    }

    async fn expect(&mut self, line: &str) {
        assert_eq!(self.read_line().await, line);
    }

    async fn expect_prefix(&mut self, prefix: &str) {
        let line = self.read_line().await;
        assert!(
            line.starts_with(prefix),
            "expected a line starting with {prefix:?}, got {line:?}",
        );
    }

    async fn login(&mut self, tag: &str) {
        self.send(format!("{tag} LOGIN alice secret\r\n").as_bytes())
            .await;
        self.expect(&format!("{tag} OK LOGIN")).await;
    }

    async fn select_inbox(&mut self, tag: &str) {
        self.send(format!("{tag} SELECT INBOX\r\n").as_bytes())
            .await;

        loop {
            let line = self.read_line().await;
            if line.starts_with(tag) {
                assert!(line.starts_with(&format!("{tag} OK [READ-WRITE] SELECT")), "{line}");
                break;
            }
            assert!(line.starts_with('*'), "{line}");
        }
    }
}

fn engine_with(backend: Arc<MemoryBackend>) -> Arc<Engine<MemoryBackend>> {
    Engine::new(backend, test_config(), None)
}

// ----- Scenarios ---------------------------------------------------------------------------------

#[tokio::test]
async fn banner_capability_noop() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);

    client
        .expect(&format!("* OK [CAPABILITY {CAPS_PLAINTEXT}] localhost imapd ready"))
        .await;

    client.send(b"A001 CAPABILITY\r\n").await;
    client.expect(&format!("* CAPABILITY {CAPS_PLAINTEXT}")).await;
    client.expect("A001 OK CAPABILITY").await;

    client.send(b"A002 NOOP\r\n").await;
    client.expect("A002 OK NOOP").await;
}

#[tokio::test]
async fn pipelined_login_select() {
    let backend = test_backend();
    {
        // Two more messages so EXISTS is 3.
        let alice = alice_user();
        backend.deliver(&alice, "INBOX", b"\r\nsecond\r\n").unwrap();
        backend.deliver(&alice, "INBOX", b"\r\nthird\r\n").unwrap();
    }

    let engine = engine_with(backend);
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK [CAPABILITY ").await;

    client
        .send(b"A001 LOGIN alice secret\r\nA002 SELECT INBOX\r\n")
        .await;

    client.expect("A001 OK LOGIN").await;
    client.expect("* 3 EXISTS").await;
    client.expect("* 3 RECENT").await;
    client.expect("* OK [UNSEEN 1] First unseen").await;
    client.expect("* OK [UIDVALIDITY 1] UIDs valid").await;
    client.expect("* OK [UIDNEXT 4] Predicted next UID").await;
    client
        .expect(
            "* OK [PERMANENTFLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft \\*)] \
             Flags permitted",
        )
        .await;
    client.expect("* OK [HIGHESTMODSEQ 4] Highest").await;
    client
        .expect("* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)")
        .await;
    client.expect("A002 OK [READ-WRITE] SELECT").await;
}

/// The user `test_backend` created, without an async directory round-trip.
fn alice_user() -> imap_server::backend::User {
    imap_server::backend::User {
        id: 1,
        login: "alice".to_owned(),
    }
}

#[tokio::test]
async fn non_synchronizing_literals() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;

    // No continuation prompt may appear.
    client.send(b"A003 LOGIN {5+}\r\nalice {6+}\r\nsecret\r\n").await;
    client.expect("A003 OK LOGIN").await;
}

#[tokio::test]
async fn synchronizing_literals_prompt() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;

    client.send(b"A1 LOGIN {5}\r\n").await;
    client.expect("+ reading literal").await;
    client.send(b"alice {6}\r\n").await;
    client.expect("+ reading literal").await;
    client.send(b"secret\r\n").await;
    client.expect("A1 OK LOGIN").await;
}

#[tokio::test]
async fn unknown_command_keeps_connection_open() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;

    client.send(b"A004 FOO BAR\r\n").await;
    client.expect("A004 BAD No such command: FOO").await;

    // The connection survives.
    client.send(b"A005 NOOP\r\n").await;
    client.expect("A005 OK NOOP").await;
}

#[tokio::test]
async fn command_out_of_state_is_rejected() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;

    client.send(b"A005 SELECT INBOX\r\n").await;
    client.expect("A005 BAD Not permitted in this state").await;
}

#[tokio::test]
async fn parse_error_names_the_position() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;

    client.login("A1").await;

    // LIST is a known command, but the arguments are broken.
    client.send(b"A2 LIST oops\r\n").await;
    client.expect_prefix("A2 BAD Parse error at position ").await;
}

#[tokio::test]
async fn authenticate_plain_round_trip() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;

    client.send(b"A1 AUTHENTICATE PLAIN\r\n").await;
    client.expect("+ ").await;
    // base64("\0alice\0secret")
    client.send(b"AGFsaWNlAHNlY3JldA==\r\n").await;
    client.expect("A1 OK AUTHENTICATE").await;
}

#[tokio::test]
async fn authenticate_cancel() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;

    client.send(b"A1 AUTHENTICATE PLAIN\r\n").await;
    client.expect("+ ").await;
    client.send(b"*\r\n").await;
    client.expect("A1 BAD Authentication cancelled").await;

    client.send(b"A2 NOOP\r\n").await;
    client.expect("A2 OK NOOP").await;
}

#[tokio::test]
async fn fetch_flags_and_uid() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;
    client.login("A1").await;
    client.select_inbox("A2").await;

    client.send(b"A3 FETCH 1 (FLAGS UID RFC822.SIZE)\r\n").await;
    client
        .expect("* 1 FETCH (FLAGS (\\Recent) UID 1 RFC822.SIZE 51)")
        .await;
    client.expect("A3 OK FETCH").await;
}

#[tokio::test]
async fn fetch_body_peek_header() {
    let backend = Arc::new(MemoryBackend::new());
    let user = backend.add_user("alice", "secret");
    backend
        .deliver(&user, "INBOX", b"Subject: hi\r\n\r\nhello\r\n")
        .unwrap();

    let engine = engine_with(backend);
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;
    client.login("A1").await;
    client.select_inbox("A2").await;

    client.send(b"A3 FETCH 1 BODY.PEEK[HEADER]\r\n").await;
    client.expect("* 1 FETCH (BODY[HEADER] {15}").await;
    assert_eq!(client.read_exact(15).await, b"Subject: hi\r\n\r\n");
    client.expect(")").await;
    client.expect("A3 OK FETCH").await;

    // PEEK must not have set \Seen.
    client.send(b"A4 FETCH 1 FLAGS\r\n").await;
    client.expect("* 1 FETCH (FLAGS (\\Recent))").await;
    client.expect("A4 OK FETCH").await;
}

#[tokio::test]
async fn fetch_body_sets_seen_implicitly() {
    let backend = Arc::new(MemoryBackend::new());
    let user = backend.add_user("alice", "secret");
    backend
        .deliver(&user, "INBOX", b"Subject: hi\r\n\r\nhello\r\n")
        .unwrap();

    let engine = engine_with(backend);
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;
    client.login("A1").await;
    client.select_inbox("A2").await;

    client.send(b"A3 FETCH 1 BODY[TEXT]\r\n").await;
    client.expect("* 1 FETCH (BODY[TEXT] {7}").await;
    assert_eq!(client.read_exact(7).await, b"hello\r\n");
    client.expect(" FLAGS (\\Seen \\Recent))").await;
    client.expect("A3 OK FETCH").await;
}

#[tokio::test]
async fn store_and_expunge() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;
    client.login("A1").await;
    client.select_inbox("A2").await;

    client.send(b"A3 STORE 1 +FLAGS (\\Deleted)\r\n").await;
    client
        .expect("* 1 FETCH (FLAGS (\\Deleted \\Recent))")
        .await;
    client.expect("A3 OK STORE").await;

    client.send(b"A4 STORE 1 +FLAGS.SILENT (\\Flagged)\r\n").await;
    client.expect("A4 OK STORE").await;

    client.send(b"A5 EXPUNGE\r\n").await;
    client.expect("* 1 EXPUNGE").await;
    client.expect("A5 OK EXPUNGE").await;

    client.send(b"A6 NOOP\r\n").await;
    client.expect("A6 OK NOOP").await;
}

#[tokio::test]
async fn uid_store_unchanged_since_reports_modified() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;
    client.login("A1").await;
    client.select_inbox("A2").await;

    // Bump the modseq past 2.
    client.send(b"A3 STORE 1 +FLAGS.SILENT (\\Answered)\r\n").await;
    client.expect("A3 OK STORE").await;

    client
        .send(b"A4 UID STORE 1 (UNCHANGEDSINCE 1) FLAGS (\\Seen)\r\n")
        .await;
    client.expect("A4 OK [MODIFIED 1] UID STORE").await;
}

#[tokio::test]
async fn copy_reports_copyuid() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;
    client.login("A1").await;

    client.send(b"A2 CREATE saved\r\n").await;
    client.expect("A2 OK CREATE").await;

    client.select_inbox("A3").await;

    client.send(b"A4 COPY 1 saved\r\n").await;
    client.expect("A4 OK [COPYUID 2 1 1] COPY").await;

    client.send(b"A5 COPY 1 nosuch\r\n").await;
    client.expect("A5 NO [TRYCREATE] No such mailbox").await;
}

#[tokio::test]
async fn append_reports_appenduid() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;
    client.login("A1").await;

    client
        .send(b"A2 APPEND INBOX (\\Seen) {15+}\r\n\r\nhello world\r\n\r\n")
        .await;
    client.expect("A2 OK [APPENDUID 1 2] APPEND").await;
}

#[tokio::test]
async fn list_round_trips_utf7_names() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;
    client.login("A1").await;

    client.send(b"A2 CREATE Entw&APw-rfe\r\n").await;
    client.expect("A2 OK CREATE").await;

    client.send(b"A3 LIST \"\" %\r\n").await;
    client
        .expect("* LIST (\\HasNoChildren) \"/\" Entw&APw-rfe")
        .await;
    client.expect("* LIST (\\HasNoChildren) \"/\" INBOX").await;
    client.expect("A3 OK LIST").await;

    // A name that is not canonical modified UTF-7 is rejected outright.
    client.send(b"A4 CREATE &Jjo!\r\n").await;
    client.expect_prefix("A4 BAD ").await;
}

#[tokio::test]
async fn list_empty_pattern_returns_delimiter() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;
    client.login("A1").await;

    client.send(b"A2 LIST \"\" \"\"\r\n").await;
    client.expect("* LIST (\\Noselect) \"/\" \"\"").await;
    client.expect("A2 OK LIST").await;
}

#[tokio::test]
async fn status_reports_requested_items() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;
    client.login("A1").await;

    client.send(b"A2 STATUS INBOX (MESSAGES UIDNEXT UNSEEN)\r\n").await;
    client
        .expect("* STATUS INBOX (MESSAGES 1 UIDNEXT 2 UNSEEN 1)")
        .await;
    client.expect("A2 OK STATUS").await;
}

#[tokio::test]
async fn search_returns_msns_and_uids() {
    let backend = test_backend();
    let alice = alice_user();
    backend.deliver(&alice, "INBOX", b"\r\nsecond\r\n").unwrap();

    let engine = engine_with(backend);
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;
    client.login("A1").await;
    client.select_inbox("A2").await;

    client.send(b"A3 SEARCH UNSEEN\r\n").await;
    client.expect("* SEARCH 1 2").await;
    client.expect("A3 OK SEARCH").await;

    client.send(b"A4 UID SEARCH SUBJECT hi\r\n").await;
    client.expect("* SEARCH 1").await;
    client.expect("A4 OK UID SEARCH").await;
}

#[tokio::test]
async fn noop_reports_foreign_changes() {
    let backend = test_backend();
    let engine = engine_with(Arc::clone(&backend));

    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;
    client.login("A1").await;
    client.select_inbox("A2").await;

    let alice = alice_user();
    backend.deliver(&alice, "INBOX", b"\r\nnew mail\r\n").unwrap();

    client.send(b"A3 NOOP\r\n").await;
    client.expect("* 2 EXISTS").await;
    client.expect("* 2 RECENT").await;
    client.expect("A3 OK NOOP").await;
}

#[tokio::test]
async fn foreign_expunge_is_held_until_safe() {
    let backend = test_backend();
    let alice = alice_user();
    backend.deliver(&alice, "INBOX", b"\r\nsecond\r\n").unwrap();

    let engine = engine_with(Arc::clone(&backend));

    // Observer selects first.
    let mut observer = Client::connect(&engine);
    observer.expect_prefix("* OK ").await;
    observer.login("A1").await;
    observer.select_inbox("A2").await;

    // A second session deletes message 1.
    let mut other = Client::connect(&engine);
    other.expect_prefix("* OK ").await;
    other.login("B1").await;
    other.select_inbox("B2").await;
    other.send(b"B3 STORE 1 +FLAGS.SILENT (\\Deleted)\r\n").await;
    other.expect("B3 OK STORE").await;
    other.send(b"B4 EXPUNGE\r\n").await;
    other.expect("* 1 EXPUNGE").await;
    other.expect("B4 OK EXPUNGE").await;

    // The observer's FETCH still sees its stable MSN mapping: message 2
    // keeps MSN 2, and no EXPUNGE appears before the tagged response. The
    // foreign flag change is released, the expunge is not.
    observer.send(b"A3 FETCH 1:2 (UID)\r\n").await;
    observer.expect("* 1 FETCH (FLAGS (\\Deleted \\Recent))").await;
    observer.expect("* 2 FETCH (UID 2)").await;
    observer.expect("A3 OK FETCH").await;

    // Between commands, the expunge is released.
    observer.expect("* 1 EXPUNGE").await;
    observer.expect("* 1 EXISTS").await;
    observer.expect("* 1 RECENT").await;
}

#[tokio::test]
async fn idle_streams_updates_until_done() {
    let backend = test_backend();
    let engine = engine_with(Arc::clone(&backend));

    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;
    client.login("A1").await;
    client.select_inbox("A2").await;

    client.send(b"A3 IDLE\r\n").await;
    client.expect("+ idling").await;

    let alice = alice_user();
    backend.deliver(&alice, "INBOX", b"\r\nwhile idling\r\n").unwrap();

    client.expect("* 2 EXISTS").await;
    client.expect("* 2 RECENT").await;

    client.send(b"DONE\r\n").await;
    client.expect("A3 OK IDLE").await;
}

#[tokio::test]
async fn close_suppresses_expunge_responses() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;
    client.login("A1").await;
    client.select_inbox("A2").await;

    client.send(b"A3 STORE 1 +FLAGS.SILENT (\\Deleted)\r\n").await;
    client.expect("A3 OK STORE").await;

    // CLOSE expunges, but no EXPUNGE response may appear.
    client.send(b"A4 CLOSE\r\n").await;
    client.expect("A4 OK CLOSE").await;

    // Back in authenticated state; the mailbox is empty now.
    client.send(b"A5 STATUS INBOX (MESSAGES)\r\n").await;
    client.expect("* STATUS INBOX (MESSAGES 0)").await;
    client.expect("A5 OK STATUS").await;
}

#[tokio::test]
async fn logout_says_bye() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;

    client.send(b"A1 LOGOUT\r\n").await;
    client.expect("* BYE logging out").await;
    client.expect("A1 OK LOGOUT").await;
}

#[tokio::test]
async fn starttls_is_refused_without_tls_config() {
    let engine = engine_with(test_backend());
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;

    client.send(b"A1 STARTTLS\r\n").await;
    client.expect("A1 NO TLS is not available").await;
}

// ----- STARTTLS interposition --------------------------------------------------------------------

fn tls_test_engine() -> (Arc<Engine<MemoryBackend>>, rustls::pki_types::CertificateDer<'static>)
{
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap();
    let cert_der = certified.cert.der().clone();
    let key_der = rustls::pki_types::PrivateKeyDer::Pkcs8(
        certified.key_pair.serialize_der().into(),
    );

    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key_der)
        .unwrap();

    let config: ImapConfig = serde_json::from_str(
        r#"{ "use-tls": true, "allow-plaintext-passwords": "if-tls" }"#,
    )
    .unwrap();

    let engine = Engine::new(
        test_backend(),
        config,
        Some(tokio_rustls::TlsAcceptor::from(Arc::new(server_config))),
    );

    (engine, cert_der)
}

fn tls_connector(
    cert: &rustls::pki_types::CertificateDer<'static>,
) -> tokio_rustls::TlsConnector {
    let mut roots = rustls::RootCertStore::empty();
    roots.add(cert.clone()).unwrap();

    let client_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    tokio_rustls::TlsConnector::from(Arc::new(client_config))
}

#[tokio::test]
async fn starttls_interposes_the_stream() {
    let (engine, cert) = tls_test_engine();
    let mut client = Client::connect(&engine);

    let greeting = client.read_line().await;
    assert!(greeting.contains("STARTTLS"), "{greeting}");
    assert!(greeting.contains("LOGINDISABLED"), "{greeting}");

    client.send(b"A1 STARTTLS\r\n").await;
    client.expect("A1 OK STARTTLS").await;
    assert!(client.buffer.is_empty());

    // Everything after the OK is ciphertext.
    let connector = tls_connector(&cert);
    let domain = rustls::pki_types::ServerName::try_from("localhost").unwrap();
    let mut tls = connector.connect(domain, client.stream).await.unwrap();

    tls.write_all(b"A2 CAPABILITY\r\n").await.unwrap();

    let mut buffer = Vec::new();
    while !buffer.windows(17).any(|w| w == b"A2 OK CAPABILITY\r") {
        let mut chunk = [0u8; 4096];
        let read = tokio::time::timeout(Duration::from_secs(5), tls.read(&mut chunk))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(read, 0);
        buffer.extend_from_slice(&chunk[..read]);
    }

    let text = String::from_utf8_lossy(&buffer);
    // Plaintext is allowed now; STARTTLS is gone from the capabilities.
    assert!(text.contains("AUTH=PLAIN"), "{text}");
    assert!(!text.contains("STARTTLS"), "{text}");
}

#[tokio::test]
async fn plaintext_pipelined_after_starttls_feeds_the_handshake() {
    let (engine, cert) = tls_test_engine();
    let mut client = Client::connect(&engine);
    client.expect_prefix("* OK ").await;

    // The NOOP arrives in the same write as STARTTLS. It must never be
    // answered as an IMAP command; it becomes (bogus) handshake bytes.
    client.send(b"A1 STARTTLS\r\nA2 NOOP\r\n").await;
    client.expect("A1 OK STARTTLS").await;

    let connector = tls_connector(&cert);
    let domain = rustls::pki_types::ServerName::try_from("localhost").unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        connector.connect(domain, client.stream),
    )
    .await
    .expect("handshake neither failed nor succeeded");

    assert!(result.is_err(), "handshake unexpectedly succeeded");
}
