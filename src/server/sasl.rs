//! Server-side SASL mechanisms for AUTHENTICATE.
//!
//! The state machines here are pure: they turn exchange lines into either a
//! follow-up challenge or credentials. Verifying the credentials against the
//! [`Directory`](crate::backend::Directory) is the connection's job.

use hmac::{Hmac, Mac};
use md5::Md5;

use crate::types::auth::AuthMechanism;

/// An in-progress AUTHENTICATE exchange.
#[derive(Debug)]
pub(crate) enum SaslMachine {
    /// RFC 4616: one round of `authzid NUL authcid NUL passwd`.
    Plain,
    /// Two rounds: username, then password.
    Login { username: Option<Vec<u8>> },
    /// RFC 2195: the server sends a timestamp challenge, the client answers
    /// `login SP hex(HMAC-MD5(secret, challenge))`.
    CramMd5 { challenge: String },
    /// RFC 4505: one round carrying trace information.
    Anonymous,
}

/// What to do after feeding a line into the machine.
#[derive(Debug)]
pub(crate) enum SaslStep {
    /// Send this challenge and wait for the next line.
    Challenge(Vec<u8>),
    /// The exchange is complete; verify these credentials.
    Credentials(SaslCredentials),
    /// The exchange is broken beyond repair.
    Failed(&'static str),
}

#[derive(Debug)]
pub(crate) enum SaslCredentials {
    /// A login name and a cleartext secret.
    Secret { login: String, secret: Vec<u8> },
    /// A login name and a CRAM-MD5 response to the stored challenge.
    CramMd5 {
        login: String,
        digest: String,
        challenge: String,
    },
    /// An anonymous login with trace information.
    Anonymous { trace: String },
}

impl SaslMachine {
    /// Creates the machine for a mechanism; `None` for unsupported ones.
    pub fn new(mechanism: &AuthMechanism, hostname: &str) -> Option<Self> {
        match mechanism {
            AuthMechanism::Plain => Some(Self::Plain),
            AuthMechanism::Login => Some(Self::Login { username: None }),
            AuthMechanism::CramMd5 => Some(Self::CramMd5 {
                challenge: fresh_challenge(hostname),
            }),
            AuthMechanism::Anonymous => Some(Self::Anonymous),
            AuthMechanism::Other(_) => None,
        }
    }

    /// The challenge to send before the first client line.
    pub fn initial_challenge(&self) -> Vec<u8> {
        match self {
            Self::Plain | Self::Anonymous => Vec::new(),
            Self::Login { .. } => b"Username:".to_vec(),
            Self::CramMd5 { challenge } => challenge.clone().into_bytes(),
        }
    }

    /// Feeds one (base64-decoded) exchange line into the machine.
    pub fn step(&mut self, data: &[u8]) -> SaslStep {
        match self {
            Self::Plain => {
                // authzid NUL authcid NUL passwd
                let mut parts = data.splitn(3, |byte| *byte == 0);
                let authzid = parts.next().unwrap_or_default();
                let authcid = parts.next().unwrap_or_default();
                let Some(secret) = parts.next() else {
                    return SaslStep::Failed("Invalid PLAIN response");
                };

                if !authzid.is_empty() && authzid != authcid {
                    return SaslStep::Failed("Proxy authentication is not supported");
                }

                match String::from_utf8(authcid.to_vec()) {
                    Ok(login) if !login.is_empty() => SaslStep::Credentials(
                        SaslCredentials::Secret {
                            login,
                            secret: secret.to_vec(),
                        },
                    ),
                    _ => SaslStep::Failed("Invalid PLAIN response"),
                }
            }
            Self::Login { username } => match username {
                None => {
                    *username = Some(data.to_vec());
                    SaslStep::Challenge(b"Password:".to_vec())
                }
                Some(username) => match String::from_utf8(username.clone()) {
                    Ok(login) if !login.is_empty() => SaslStep::Credentials(
                        SaslCredentials::Secret {
                            login,
                            secret: data.to_vec(),
                        },
                    ),
                    _ => SaslStep::Failed("Invalid LOGIN response"),
                },
            },
            Self::CramMd5 { challenge } => {
                let Ok(response) = std::str::from_utf8(data) else {
                    return SaslStep::Failed("Invalid CRAM-MD5 response");
                };

                match response.rsplit_once(' ') {
                    Some((login, digest)) if !login.is_empty() => {
                        SaslStep::Credentials(SaslCredentials::CramMd5 {
                            login: login.to_owned(),
                            digest: digest.to_ascii_lowercase(),
                            challenge: challenge.clone(),
                        })
                    }
                    _ => SaslStep::Failed("Invalid CRAM-MD5 response"),
                }
            }
            Self::Anonymous => SaslStep::Credentials(SaslCredentials::Anonymous {
                trace: String::from_utf8_lossy(data).into_owned(),
            }),
        }
    }
}

/// A fresh RFC 2195 challenge, e.g. `<4148.1592520271@example.org>`.
fn fresh_challenge(hostname: &str) -> String {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();

    format!("<{}.{}@{}>", std::process::id(), timestamp, hostname)
}

/// The expected CRAM-MD5 response digest for a stored secret.
pub(crate) fn cram_md5_digest(secret: &str, challenge: &str) -> String {
    // Safety: HMAC accepts keys of any length.
    let mut mac = Hmac::<Md5>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(challenge.as_bytes());

    mac.finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain() {
        let mut machine = SaslMachine::new(&AuthMechanism::Plain, "example.org").unwrap();

        assert!(machine.initial_challenge().is_empty());

        match machine.step(b"\x00alice\x00secret") {
            SaslStep::Credentials(SaslCredentials::Secret { login, secret }) => {
                assert_eq!(login, "alice");
                assert_eq!(secret, b"secret");
            }
            other => panic!("unexpected: {other:?}"),
        }

        assert!(matches!(
            machine.step(b"no separators"),
            SaslStep::Failed(_)
        ));
    }

    #[test]
    fn test_login_two_rounds() {
        let mut machine = SaslMachine::new(&AuthMechanism::Login, "example.org").unwrap();

        assert_eq!(machine.initial_challenge(), b"Username:");

        match machine.step(b"alice") {
            SaslStep::Challenge(challenge) => assert_eq!(challenge, b"Password:"),
            other => panic!("unexpected: {other:?}"),
        }

        match machine.step(b"secret") {
            SaslStep::Credentials(SaslCredentials::Secret { login, secret }) => {
                assert_eq!(login, "alice");
                assert_eq!(secret, b"secret");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_cram_md5_digest() {
        // Example from RFC 2195, section 2.
        assert_eq!(
            cram_md5_digest(
                "tanstaaftanstaaf",
                "<1896.697170952@postoffice.reston.mci.net>",
            ),
            "b913a602c7eda7a495b4e6e7334d3890",
        );
    }

    #[test]
    fn test_cram_md5_response_split() {
        let mut machine = SaslMachine::CramMd5 {
            challenge: "<x@y>".to_owned(),
        };

        match machine.step(b"joe cafebabe") {
            SaslStep::Credentials(SaslCredentials::CramMd5 { login, digest, .. }) => {
                assert_eq!(login, "joe");
                assert_eq!(digest, "cafebabe");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
