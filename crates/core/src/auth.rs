use serde::{Deserialize, Serialize};

/// Proof of a successful authentication with the identity provider.
///
/// Possession of any validly issued assertion is sufficient to request a
/// grant; the claims carried here are used for logging only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    subject: String,
    expires_at_epoch_seconds: i64,
}

impl VerifiedIdentity {
    /// Creates an identity from verified assertion claims.
    #[must_use]
    pub fn new(subject: impl Into<String>, expires_at_epoch_seconds: i64) -> Self {
        Self {
            subject: subject.into(),
            expires_at_epoch_seconds,
        }
    }

    /// Returns the stable subject claim from the identity provider.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }

    /// Returns the assertion expiry as seconds since the Unix epoch.
    #[must_use]
    pub fn expires_at_epoch_seconds(&self) -> i64 {
        self.expires_at_epoch_seconds
    }
}
