use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event kinds recorded by the grant lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when a firewall rule is added for an origin.
    GrantCreated,
    /// Emitted when the revocation step removes a rule.
    GrantRevoked,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GrantCreated => "grant.created",
            Self::GrantRevoked => "grant.revoked",
        }
    }
}

/// Date-based partition of the audit sink (`YYYY-MM-DD`, UTC).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditPartitionKey(String);

impl AuditPartitionKey {
    /// Returns the partition holding events recorded at `instant`.
    #[must_use]
    pub fn for_instant(instant: DateTime<Utc>) -> Self {
        Self(instant.format("%Y-%m-%d").to_string())
    }

    /// Returns the partition name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for AuditPartitionKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::AuditPartitionKey;

    #[test]
    fn partition_key_is_utc_date() {
        let instant = Utc
            .with_ymd_and_hms(2026, 1, 2, 23, 59, 59)
            .single()
            .unwrap_or_else(|| unreachable!());
        assert_eq!(AuditPartitionKey::for_instant(instant).as_str(), "2026-01-02");
    }
}
