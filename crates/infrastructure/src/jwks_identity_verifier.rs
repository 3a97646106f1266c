use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use portwarden_application::IdentityVerifier;
use portwarden_core::{AppError, AppResult, VerifiedIdentity};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct IdentityClaims {
    sub: String,
    exp: i64,
}

/// Algorithm assumed for keys that do not publish one.
const DEFAULT_SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

#[derive(Clone)]
struct RemoteKeySet {
    http_client: reqwest::Client,
    jwks_url: String,
}

/// Verifies identity assertions against the provider's published key set.
///
/// Keys are cached in-process. An assertion signed with an unknown `kid`
/// triggers one refetch before it is rejected.
pub struct JwksIdentityVerifier {
    remote: Option<RemoteKeySet>,
    keys: RwLock<JwkSet>,
    audience: String,
    issuer: Option<String>,
}

impl JwksIdentityVerifier {
    /// Creates a verifier that fetches keys from `jwks_url` on demand.
    #[must_use]
    pub fn remote(
        http_client: reqwest::Client,
        jwks_url: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            remote: Some(RemoteKeySet {
                http_client,
                jwks_url: jwks_url.into(),
            }),
            keys: RwLock::new(JwkSet { keys: Vec::new() }),
            audience: audience.into(),
            issuer: None,
        }
    }

    /// Creates a verifier over a fixed key set.
    #[must_use]
    pub fn with_static_keys(keys: JwkSet, audience: impl Into<String>) -> Self {
        Self {
            remote: None,
            keys: RwLock::new(keys),
            audience: audience.into(),
            issuer: None,
        }
    }

    /// Requires the `iss` claim to equal `issuer`.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    async fn cached_key(&self, kid: &str) -> AppResult<Option<(DecodingKey, Algorithm)>> {
        self.keys
            .read()
            .await
            .find(kid)
            .map(|jwk| {
                let algorithm = signing_algorithm(jwk).ok_or_else(|| {
                    AppError::InvalidAssertion(format!(
                        "signing key '{kid}' does not publish a signature algorithm"
                    ))
                })?;
                let key = DecodingKey::from_jwk(jwk).map_err(|error| {
                    AppError::InvalidAssertion(format!("signing key '{kid}' is unusable: {error}"))
                })?;
                Ok((key, algorithm))
            })
            .transpose()
    }

    async fn refresh_keys(&self, remote: &RemoteKeySet) -> AppResult<()> {
        let key_set = remote
            .http_client
            .get(remote.jwks_url.as_str())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to fetch key set from '{}': {error}",
                    remote.jwks_url
                ))
            })?
            .json::<JwkSet>()
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "key set at '{}' is invalid: {error}",
                    remote.jwks_url
                ))
            })?;

        *self.keys.write().await = key_set;
        Ok(())
    }

    async fn decoding_key(&self, kid: &str) -> AppResult<(DecodingKey, Algorithm)> {
        if let Some(key) = self.cached_key(kid).await? {
            return Ok(key);
        }

        if let Some(remote) = self.remote.as_ref() {
            if let Err(error) = self.refresh_keys(remote).await {
                warn!(error = %error, "identity provider key set refresh failed");
                return Err(AppError::InvalidAssertion(
                    "signing keys are unavailable".to_owned(),
                ));
            }

            if let Some(key) = self.cached_key(kid).await? {
                return Ok(key);
            }
        }

        Err(AppError::InvalidAssertion(format!(
            "assertion is signed with unknown key '{kid}'"
        )))
    }
}

#[async_trait]
impl IdentityVerifier for JwksIdentityVerifier {
    async fn verify(&self, assertion: &str) -> AppResult<VerifiedIdentity> {
        let header = decode_header(assertion).map_err(|error| {
            AppError::InvalidAssertion(format!("assertion header is malformed: {error}"))
        })?;
        let kid = header.kid.ok_or_else(|| {
            AppError::InvalidAssertion("assertion header has no key id".to_owned())
        })?;
        let (key, algorithm) = self.decoding_key(kid.as_str()).await?;
        if header.alg != algorithm {
            return Err(AppError::InvalidAssertion(format!(
                "assertion uses {:?} but key '{kid}' is published for {algorithm:?}",
                header.alg
            )));
        }

        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[self.audience.as_str()]);
        if let Some(issuer) = self.issuer.as_deref() {
            validation.set_issuer(&[issuer]);
        }
        validation.set_required_spec_claims(&["exp", "sub", "aud"]);

        let token = decode::<IdentityClaims>(assertion, &key, &validation).map_err(|error| {
            AppError::InvalidAssertion(format!("assertion rejected: {error}"))
        })?;

        Ok(VerifiedIdentity::new(token.claims.sub, token.claims.exp))
    }
}

/// Signature algorithm pinned by `jwk`, or the provider default when absent.
///
/// Encryption algorithms yield `None`.
fn signing_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    let Some(key_algorithm) = jwk.common.key_algorithm else {
        return Some(DEFAULT_SIGNING_ALGORITHM);
    };

    match key_algorithm {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}
