use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, Utc};
use portwarden_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::network::{FirewallGroup, GrantOrigin, GrantPort, IngressRule};

/// Timestamp layout used in grant responses and audit messages.
pub const GRANT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Deterministic name of the pending revocation job for an origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleKey(String);

impl ScheduleKey {
    /// Derives the key for an origin within the current deployment.
    #[must_use]
    pub fn for_origin(origin: GrantOrigin) -> Self {
        Self(format!("remove-ip-{}", origin.to_string().replace(':', "-")))
    }

    /// Rebuilds a key read back from storage.
    #[must_use]
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the key value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for ScheduleKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// A time-bounded permission admitting one origin through a firewall on one port.
///
/// Never persisted on its own: the firewall rule and the scheduled revocation
/// job are its only state of record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    rule: IngressRule,
    ttl_seconds: u32,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    schedule_key: ScheduleKey,
}

impl AccessGrant {
    /// Builds a grant created at `created_at` that lives for `ttl_seconds`.
    pub fn new(rule: IngressRule, ttl_seconds: u32, created_at: DateTime<Utc>) -> AppResult<Self> {
        if ttl_seconds == 0 {
            return Err(AppError::Validation(
                "grant ttl_seconds must be greater than zero".to_owned(),
            ));
        }

        let expires_at = created_at
            .checked_add_signed(Duration::seconds(i64::from(ttl_seconds)))
            .ok_or_else(|| AppError::Validation("grant expiry is out of range".to_owned()))?;
        let schedule_key = ScheduleKey::for_origin(rule.origin());

        Ok(Self {
            rule,
            ttl_seconds,
            created_at,
            expires_at,
            schedule_key,
        })
    }

    /// Returns the firewall rule tuple.
    #[must_use]
    pub fn rule(&self) -> &IngressRule {
        &self.rule
    }

    /// Returns the configured lifetime.
    #[must_use]
    pub fn ttl_seconds(&self) -> u32 {
        self.ttl_seconds
    }

    /// Returns the creation instant.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns creation time plus ttl.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns the expiry rendered with [`GRANT_TIMESTAMP_FORMAT`].
    #[must_use]
    pub fn expires_at_display(&self) -> String {
        self.expires_at.format(GRANT_TIMESTAMP_FORMAT).to_string()
    }

    /// Returns the revocation job key.
    #[must_use]
    pub fn schedule_key(&self) -> &ScheduleKey {
        &self.schedule_key
    }

    /// Returns everything the revocation step needs to remove this exact rule.
    #[must_use]
    pub fn revocation_payload(&self) -> RevocationPayload {
        RevocationPayload::from_rule(&self.rule)
    }
}

/// Job payload handed to the revocation entry point at expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationPayload {
    /// Origin admitted by the grant.
    pub origin: GrantOrigin,
    /// Firewall group identifier.
    pub group: String,
    /// Admitted port.
    pub port: u16,
    /// Region hosting the firewall group.
    pub region: String,
}

impl RevocationPayload {
    /// Captures the tuple of an ingress rule.
    #[must_use]
    pub fn from_rule(rule: &IngressRule) -> Self {
        Self {
            origin: rule.origin(),
            group: rule.group().group_id().to_owned(),
            port: rule.port().value(),
            region: rule.group().region().to_owned(),
        }
    }

    /// Rebuilds the rule tuple to remove.
    pub fn to_rule(&self) -> AppResult<IngressRule> {
        Ok(IngressRule::new(
            FirewallGroup::new(self.group.as_str(), self.region.as_str())?,
            self.origin,
            GrantPort::new(self.port)?,
        ))
    }
}
