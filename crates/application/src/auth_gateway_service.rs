//! Entry point of the access flow: redirect to login, or exchange and grant.

use std::sync::Arc;

use tracing::info;

use portwarden_core::AppResult;
use portwarden_domain::GrantOrigin;

use crate::access_grant_service::{AccessGrantService, GrantDecision};
use crate::identity_ports::{AuthorizationCodeExchanger, IdentityVerifier};
use crate::settings::IdentityProviderSettings;

/// What the caller should receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// Send the caller to the provider's login page.
    RedirectToLogin {
        /// Login address carrying client id, scope and callback.
        location: String,
    },
    /// Authentication succeeded and the grant manager decided.
    Decided(GrantDecision),
}

/// Drives the authorization-code callback.
#[derive(Clone)]
pub struct AuthGatewayService {
    provider: IdentityProviderSettings,
    exchanger: Arc<dyn AuthorizationCodeExchanger>,
    verifier: Arc<dyn IdentityVerifier>,
    access_grants: AccessGrantService,
}

impl AuthGatewayService {
    /// Creates a new gateway service.
    #[must_use]
    pub fn new(
        provider: IdentityProviderSettings,
        exchanger: Arc<dyn AuthorizationCodeExchanger>,
        verifier: Arc<dyn IdentityVerifier>,
        access_grants: AccessGrantService,
    ) -> Self {
        Self {
            provider,
            exchanger,
            verifier,
            access_grants,
        }
    }

    /// Handles one inbound request from `origin`, optionally carrying a code.
    ///
    /// A provider rejection is returned as `AppError::UpstreamExchange` so the
    /// caller can pass status and body through untouched.
    pub async fn handle(&self, code: Option<&str>, origin: GrantOrigin) -> AppResult<GatewayOutcome> {
        let Some(code) = code.map(str::trim).filter(|code| !code.is_empty()) else {
            return self.redirect_to_login();
        };

        let Some(assertion) = self
            .exchanger
            .exchange_code(code)
            .await?
            .filter(|assertion| !assertion.trim().is_empty())
        else {
            info!(%origin, "token response carried no identity assertion");
            return self.redirect_to_login();
        };

        let identity = match self.verifier.verify(assertion.as_str()).await {
            Ok(identity) => identity,
            Err(error) if error.requires_login() => {
                info!(%origin, error = %error, "identity assertion rejected");
                return self.redirect_to_login();
            }
            Err(error) => return Err(error),
        };

        let decision = self.access_grants.grant_access(&identity, origin).await?;
        Ok(GatewayOutcome::Decided(decision))
    }

    fn redirect_to_login(&self) -> AppResult<GatewayOutcome> {
        Ok(GatewayOutcome::RedirectToLogin {
            location: self.provider.login_url()?,
        })
    }
}
