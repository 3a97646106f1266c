//! Shared primitives for all Rust crates in Portwarden.

#![forbid(unsafe_code)]

/// Authentication primitives shared across services.
pub mod auth;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use auth::VerifiedIdentity;

/// Result type used across Portwarden crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::fmt::Display for NonEmptyString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input, configuration, or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No authorization code or identity assertion was presented.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Identity assertion is malformed, expired, or fails signature checks.
    #[error("invalid assertion: {0}")]
    InvalidAssertion(String),

    /// Identity provider rejected the authorization code.
    #[error("identity provider returned status {status}")]
    UpstreamExchange {
        /// Status code returned by the provider.
        status: u16,
        /// Raw response body returned by the provider.
        body: String,
    },

    /// Firewall rule mutation failed for a reason other than duplicate/absent.
    #[error("firewall mutation failed: {0}")]
    StoreMutation(String),

    /// Revocation job registration failed after the rule was applied.
    #[error("expiry scheduling failed: {0}")]
    Scheduling(String),

    /// Audit sink rejected a write.
    #[error("audit log sink failed: {0}")]
    LogSink(String),

    /// Caller is not allowed to use an internal entry point.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true for errors that mean "authenticate again" rather than "fail".
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthenticated(_) | Self::InvalidAssertion(_))
    }
}
