//! Analysis API credential model.
//!
//! Credentials are loaded once at startup and never change. The raw key is
//! only handed to the HTTP client; everything else (counter store rows, logs,
//! admin responses) refers to a credential by its fingerprint id.

use std::fmt;

use sha2::{Digest, Sha256};

/// Number of hex characters of the SHA-256 digest kept as the credential id.
const FINGERPRINT_LEN: usize = 16;

/// One analysis API key plus its display label.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Stable identifier derived from the key (first 16 hex chars of SHA-256)
    ///
    /// Used as the counter store key so the secret is never persisted.
    pub id: String,

    /// Human-readable name shown on the admin usage page
    pub label: String,

    secret: String,
}

impl Credential {
    pub fn new(secret: impl Into<String>, label: impl Into<String>) -> Self {
        let secret = secret.into();
        Self {
            id: fingerprint(&secret),
            label: label.into(),
            secret,
        }
    }

    /// The raw API key, for the outbound request only.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Hash the key using SHA-256 and keep a short hex prefix.
fn fingerprint(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());

    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}
