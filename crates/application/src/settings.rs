//! Immutable deployment settings handed to services at construction.

use portwarden_core::{AppError, AppResult, NonEmptyString};
use portwarden_domain::{FirewallGroup, GrantPort};
use url::Url;

/// Flexible window, in minutes, within which a revocation job fires.
pub const FLEXIBLE_WINDOW_MINUTES: u32 = 60;

/// What a grant admits and for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantPolicy {
    /// Firewall group mutated by grants.
    pub group: FirewallGroup,
    /// Port admitted for every grant in this deployment.
    pub port: GrantPort,
    /// Lifetime of each grant.
    pub ttl_seconds: u32,
    /// Remove the just-added rule when expiry scheduling fails.
    pub compensate_on_schedule_failure: bool,
}

impl GrantPolicy {
    /// Creates a policy, rejecting a zero ttl.
    pub fn new(group: FirewallGroup, port: GrantPort, ttl_seconds: u32) -> AppResult<Self> {
        if ttl_seconds == 0 {
            return Err(AppError::Validation(
                "grant ttl_seconds must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            group,
            port,
            ttl_seconds,
            compensate_on_schedule_failure: true,
        })
    }

    /// Overrides the compensation behaviour on scheduling failure.
    #[must_use]
    pub fn with_compensation(mut self, enabled: bool) -> Self {
        self.compensate_on_schedule_failure = enabled;
        self
    }
}

/// Header carrying the execution role on scheduler invocations.
pub const EXECUTION_ROLE_HEADER: &str = "x-portwarden-execution-role";

/// Entry point the scheduler invokes when a revocation job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationTarget {
    /// Target identity: URL of the revocation entry point.
    pub target_url: String,
    /// Execution role presented when invoking the target.
    pub execution_role: String,
}

impl RevocationTarget {
    /// Creates a validated target reference.
    pub fn new(target_url: &str, execution_role: &str) -> AppResult<Self> {
        Url::parse(target_url).map_err(|error| {
            AppError::Validation(format!("invalid revocation target url '{target_url}': {error}"))
        })?;

        Ok(Self {
            target_url: target_url.to_owned(),
            execution_role: NonEmptyString::new(execution_role)?.into(),
        })
    }
}

/// OAuth client registration at the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProviderSettings {
    base_url: String,
    client_id: NonEmptyString,
    client_secret: NonEmptyString,
    callback_url: String,
}

impl IdentityProviderSettings {
    /// Creates validated provider settings.
    pub fn new(
        base_url: &str,
        client_id: &str,
        client_secret: &str,
        callback_url: &str,
    ) -> AppResult<Self> {
        let base_url = Url::parse(base_url).map_err(|error| {
            AppError::Validation(format!("invalid identity provider url '{base_url}': {error}"))
        })?;
        // Sent verbatim as redirect_uri.
        Url::parse(callback_url).map_err(|error| {
            AppError::Validation(format!("invalid callback url '{callback_url}': {error}"))
        })?;

        Ok(Self {
            base_url: base_url.as_str().trim_end_matches('/').to_owned(),
            client_id: NonEmptyString::new(client_id)?,
            client_secret: NonEmptyString::new(client_secret)?,
            callback_url: callback_url.to_owned(),
        })
    }

    /// Returns the OAuth client identifier.
    #[must_use]
    pub fn client_id(&self) -> &str {
        self.client_id.as_str()
    }

    /// Returns the OAuth client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        self.client_secret.as_str()
    }

    /// Returns the registered callback address.
    #[must_use]
    pub fn callback_url(&self) -> &str {
        self.callback_url.as_str()
    }

    /// Returns the token endpoint used for the code exchange.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.base_url)
    }

    /// Returns the hosted login address carrying client id, scope and callback.
    pub fn login_url(&self) -> AppResult<String> {
        let mut login_url = Url::parse(format!("{}/login", self.base_url).as_str())
            .map_err(|error| AppError::Internal(format!("invalid login url: {error}")))?;
        login_url
            .query_pairs_mut()
            .append_pair("client_id", self.client_id.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", "openid")
            .append_pair("redirect_uri", self.callback_url.as_str());

        Ok(login_url.to_string())
    }
}
