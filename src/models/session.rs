//! Credentials and rotated sessions.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One authenticated identity as supplied by configuration.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    /// Session cookie value (`auth_token`)
    pub auth_token: String,

    /// Anti-forgery token (`ct0` cookie and `x-csrf-token` header)
    pub csrf_token: String,
}

impl Credential {
    pub fn new(auth_token: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            csrf_token: csrf_token.into(),
        }
    }

    /// Both tokens are present.
    pub fn is_complete(&self) -> bool {
        !self.auth_token.trim().is_empty() && !self.csrf_token.trim().is_empty()
    }

    /// Short, non-reversible identifier of the auth token.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.auth_token.as_bytes());
        hex::encode(&digest[..4])
    }
}

// Tokens stay out of logs and panics.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Stable, log-safe name of a session: ordinal plus token fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(ordinal: usize, credential: &Credential) -> Self {
        Self(format!("#{}:{}", ordinal + 1, credential.fingerprint()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A credential owned by the session pool, with its call count.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub credential: Credential,
    /// Proxy host this session egresses through, for observability
    pub proxy: Option<String>,
    pub calls: u64,
    /// Set once the platform rejects the session
    pub rejected: bool,
}

impl Session {
    pub fn new(ordinal: usize, credential: Credential, proxy: Option<String>) -> Self {
        Self {
            key: SessionKey::new(ordinal, &credential),
            credential,
            proxy,
            calls: 0,
            rejected: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = Credential::new("token-a", "csrf");
        let b = Credential::new("token-b", "csrf");
        assert_eq!(a.fingerprint(), a.fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 8);
    }

    #[test]
    fn test_debug_hides_tokens() {
        let credential = Credential::new("super-secret-token", "csrf-secret");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("super-secret-token"));
        assert!(!rendered.contains("csrf-secret"));
    }

    #[test]
    fn test_session_key_format() {
        let credential = Credential::new("token", "csrf");
        let key = SessionKey::new(0, &credential);
        assert_eq!(key.as_str(), format!("#1:{}", credential.fingerprint()));
    }
}
