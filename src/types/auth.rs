//! Authentication-related types.

use std::fmt::{Display, Formatter};

use crate::types::core::{Atom, Secret};

/// An authentication mechanism, named in `AUTHENTICATE` and in `AUTH=`
/// capabilities.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum AuthMechanism {
    /// RFC 4616.
    Plain,
    /// Non-standard, but widely deployed.
    Login,
    /// RFC 2195.
    CramMd5,
    /// RFC 4505.
    Anonymous,
    /// Any other mechanism.
    Other(Atom),
}

impl From<Atom> for AuthMechanism {
    fn from(atom: Atom) -> Self {
        match atom.as_ref().to_ascii_uppercase().as_ref() {
            "PLAIN" => Self::Plain,
            "LOGIN" => Self::Login,
            "CRAM-MD5" => Self::CramMd5,
            "ANONYMOUS" => Self::Anonymous,
            _ => Self::Other(atom),
        }
    }
}

impl Display for AuthMechanism {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Plain => f.write_str("PLAIN"),
            Self::Login => f.write_str("LOGIN"),
            Self::CramMd5 => f.write_str("CRAM-MD5"),
            Self::Anonymous => f.write_str("ANONYMOUS"),
            Self::Other(atom) => f.write_str(atom.as_ref()),
        }
    }
}

/// A line of the AUTHENTICATE exchange sent by the client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthenticateData {
    /// Base64-decoded data of one SASL round.
    Continue(Secret<Vec<u8>>),
    /// The client aborted the exchange with `*`.
    Cancel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mechanism_names_round_trip() {
        for name in ["PLAIN", "LOGIN", "CRAM-MD5", "ANONYMOUS", "XOAUTH2"] {
            let mechanism = AuthMechanism::from(Atom::try_from(name).unwrap());
            assert_eq!(mechanism.to_string(), name);
        }

        // Mechanism names are case-insensitive.
        assert_eq!(
            AuthMechanism::from(Atom::try_from("plain").unwrap()),
            AuthMechanism::Plain
        );
    }
}
