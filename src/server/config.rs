//! Server configuration.

use serde::Deserialize;

/// When plaintext passwords (LOGIN, AUTHENTICATE PLAIN/LOGIN) are accepted.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum PlaintextPolicy {
    /// Accept them on any connection.
    Always,
    /// Never accept them.
    Never,
    /// Accept them once the connection is encrypted.
    #[default]
    IfTls,
}

fn default_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    143
}

fn default_hostname() -> String {
    "localhost".to_owned()
}

fn default_max_line_length() -> u32 {
    32_768
}

fn default_max_literal_size() -> u32 {
    64 * 1024 * 1024
}

fn yes() -> bool {
    true
}

/// The recognized configuration, loaded from a JSON file by the binary.
///
/// Key names use dashes, e.g. `imap-address`, `allow-plaintext-passwords`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ImapConfig {
    /// Listener address.
    #[serde(default = "default_address")]
    pub imap_address: String,

    /// Listener port.
    #[serde(default = "default_port")]
    pub imap_port: u16,

    /// Implicit-TLS listener port; disabled when absent.
    #[serde(default)]
    pub imaps_port: Option<u16>,

    /// Whether to offer STARTTLS. Requires certificate and key.
    #[serde(default)]
    pub use_tls: bool,

    /// PEM files for TLS.
    #[serde(default)]
    pub tls_certificate: Option<String>,
    #[serde(default)]
    pub tls_private_key: Option<String>,

    /// Enabled authentication mechanisms.
    #[serde(default = "yes")]
    pub auth_plain: bool,
    #[serde(default)]
    pub auth_login: bool,
    #[serde(default = "yes")]
    pub auth_cram_md5: bool,
    /// Recognized for compatibility; DIGEST-MD5 is not implemented and the
    /// mechanism is never advertised.
    #[serde(default)]
    pub auth_digest_md5: bool,
    #[serde(default)]
    pub auth_anonymous: bool,

    #[serde(default)]
    pub allow_plaintext_passwords: PlaintextPolicy,

    /// Whether to advertise draft capabilities. Currently adds nothing.
    #[serde(default)]
    pub announce_draft_support: bool,

    /// Host name used in the greeting.
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// A line longer than this (literals excluded) ends the connection.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: u32,

    /// Largest accepted literal, which also bounds APPEND.
    #[serde(default = "default_max_literal_size")]
    pub max_literal_size: u32,
}

impl Default for ImapConfig {
    fn default() -> Self {
        // Same defaults the field attributes produce.
        serde_json::from_str("{}").unwrap()
    }
}

impl ImapConfig {
    /// Whether plaintext authentication is acceptable on a connection that
    /// is (or is not) encrypted.
    pub fn plaintext_allowed(&self, tls_active: bool) -> bool {
        match self.allow_plaintext_passwords {
            PlaintextPolicy::Always => true,
            PlaintextPolicy::Never => false,
            PlaintextPolicy::IfTls => tls_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ImapConfig::default();

        assert_eq!(config.imap_port, 143);
        assert_eq!(config.max_line_length, 32_768);
        assert_eq!(config.allow_plaintext_passwords, PlaintextPolicy::IfTls);
        assert!(config.auth_plain);
        assert!(!config.auth_anonymous);
    }

    #[test]
    fn test_kebab_case_keys() {
        let config: ImapConfig = serde_json::from_str(
            r#"{
                "imap-address": "127.0.0.1",
                "imap-port": 1143,
                "allow-plaintext-passwords": "always",
                "auth-cram-md5": false
            }"#,
        )
        .unwrap();

        assert_eq!(config.imap_address, "127.0.0.1");
        assert_eq!(config.imap_port, 1143);
        assert_eq!(config.allow_plaintext_passwords, PlaintextPolicy::Always);
        assert!(!config.auth_cram_md5);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(serde_json::from_str::<ImapConfig>(r#"{"imap-prot": 1}"#).is_err());
    }

    #[test]
    fn test_plaintext_policy() {
        let mut config = ImapConfig::default();

        assert!(!config.plaintext_allowed(false));
        assert!(config.plaintext_allowed(true));

        config.allow_plaintext_passwords = PlaintextPolicy::Never;
        assert!(!config.plaintext_allowed(true));
    }
}
