//! Credential value type and the provider seam the signer reads through.
//!
//! A [`Credentials`] value is immutable; rotation publishes a new value
//! rather than mutating the old one, so a reader always signs with a
//! consistent access key, secret and session token triple.

use std::fmt;
use std::sync::Arc;

/// A set of AWS credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Access key ID.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

impl Credentials {
    /// Create a credential set.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Read static credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`
    /// and the optional `AWS_SESSION_TOKEN`.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        Some(Self::new(access_key_id, secret_access_key, session_token))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Source of the credential snapshot used for the next signature.
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    /// The credentials currently in effect.
    fn current(&self) -> Arc<Credentials>;
}

/// A provider that always hands out the same credentials.
///
/// # Examples
///
/// ```
/// use blockswap_auth::{CredentialProvider, Credentials, StaticCredentialProvider};
///
/// let provider = StaticCredentialProvider::new(Credentials::new("AKID", "secret", None));
/// assert_eq!(provider.current().access_key_id, "AKID");
/// ```
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credentials: Arc<Credentials>,
}

impl StaticCredentialProvider {
    /// Wrap a fixed credential set.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
        }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn current(&self) -> Arc<Credentials> {
        Arc::clone(&self.credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_redact_secrets_in_debug_output() {
        let creds = Credentials::new("AKID", "top-secret", Some("token-value".to_owned()));
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("AKID"));
        assert!(!rendered.contains("top-secret"));
        assert!(!rendered.contains("token-value"));
    }

    #[test]
    fn test_should_share_the_same_snapshot() {
        let provider = StaticCredentialProvider::new(Credentials::new("AKID", "secret", None));
        assert!(Arc::ptr_eq(&provider.current(), &provider.current()));
    }
}
