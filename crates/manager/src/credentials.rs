//! Exchange credential records.
//!
//! Secrets are wrapped in `SecretString` so they cannot leak through Debug
//! or logs and are zeroed on drop. Full-record equality (including the
//! secrets) defines exchange-pool identity.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// One configured account on one exchange.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    /// Name messages address this account by (matched case-insensitively).
    pub name: String,
    /// Exchange adapter to connect with.
    pub exchange: String,
    /// API key (public).
    pub key: String,
    /// API secret.
    pub secret: SecretString,
    /// Extra passphrase, required by some venues.
    #[serde(default)]
    pub passphrase: Option<SecretString>,
    /// Non-default API endpoint (e.g. a testnet).
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Credentials {
    pub fn new(
        name: impl Into<String>,
        exchange: impl Into<String>,
        key: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            exchange: exchange.into(),
            key: key.into(),
            secret: SecretString::from(secret.into()),
            passphrase: None,
            endpoint: None,
        }
    }

    /// Whether a message block addressed to `name` matches this record.
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("name", &self.name)
            .field("exchange", &self.exchange)
            .field("key", &self.key)
            .field("secret", &"[REDACTED]")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        let passphrase_eq = match (&self.passphrase, &other.passphrase) {
            (None, None) => true,
            (Some(a), Some(b)) => a.expose_secret() == b.expose_secret(),
            _ => false,
        };
        self.name == other.name
            && self.exchange == other.exchange
            && self.key == other.key
            && self.secret.expose_secret() == other.secret.expose_secret()
            && passphrase_eq
            && self.endpoint == other.endpoint
    }
}

impl Eq for Credentials {}

impl std::hash::Hash for Credentials {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Public fields only; equal records agree on these, which is all
        // the Hash/Eq contract needs.
        self.name.hash(state);
        self.exchange.hash(state);
        self.key.hash(state);
        self.endpoint.hash(state);
    }
}
