use async_trait::async_trait;

use portwarden_core::{AppResult, VerifiedIdentity};

/// Exchanges an authorization code at the identity provider's token endpoint.
#[async_trait]
pub trait AuthorizationCodeExchanger: Send + Sync {
    /// Returns the identity assertion, if the provider issued one.
    ///
    /// A non-success provider response is reported as
    /// `AppError::UpstreamExchange` carrying the status and raw body.
    async fn exchange_code(&self, code: &str) -> AppResult<Option<String>>;
}

/// Decodes and verifies identity assertions against the provider's key set.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verifies signature and expiry; failures are `AppError::InvalidAssertion`.
    async fn verify(&self, assertion: &str) -> AppResult<VerifiedIdentity>;
}
