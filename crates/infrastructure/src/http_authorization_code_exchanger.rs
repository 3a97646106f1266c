use async_trait::async_trait;
use portwarden_application::{AuthorizationCodeExchanger, IdentityProviderSettings};
use portwarden_core::{AppError, AppResult};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

/// Exchanges authorization codes at the provider's `/oauth2/token` endpoint.
#[derive(Clone)]
pub struct HttpAuthorizationCodeExchanger {
    http_client: reqwest::Client,
    settings: IdentityProviderSettings,
}

impl HttpAuthorizationCodeExchanger {
    /// Creates a new exchanger for one client registration.
    #[must_use]
    pub fn new(http_client: reqwest::Client, settings: IdentityProviderSettings) -> Self {
        Self {
            http_client,
            settings,
        }
    }
}

#[async_trait]
impl AuthorizationCodeExchanger for HttpAuthorizationCodeExchanger {
    async fn exchange_code(&self, code: &str) -> AppResult<Option<String>> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.settings.client_id()),
            ("client_secret", self.settings.client_secret()),
            ("code", code),
            ("redirect_uri", self.settings.callback_url()),
        ];

        let response = self
            .http_client
            .post(self.settings.token_url())
            .form(&form)
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!("identity provider token request failed: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_owned());
            return Err(AppError::UpstreamExchange {
                status: status.as_u16(),
                body,
            });
        }

        let token_response = response.json::<TokenResponse>().await.map_err(|error| {
            AppError::Internal(format!("identity provider token response is invalid: {error}"))
        })?;

        Ok(token_response.id_token)
    }
}
