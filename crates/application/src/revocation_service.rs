//! Revocation step invoked by the scheduler when a grant expires.

use std::sync::Arc;

use tracing::info;

use portwarden_core::{AppError, AppResult};
use portwarden_domain::{AuditAction, RevocationPayload};

use crate::audit_logger::AuditLogger;
use crate::grant_ports::{Clock, GrantStore};

/// End state reached by a revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationOutcome {
    /// The rule was present and has been removed.
    Removed,
    /// The rule was already gone, e.g. removed by an operator.
    AlreadyAbsent,
}

impl RevocationOutcome {
    /// Caller-facing message. Identical for both outcomes.
    #[must_use]
    pub fn message(&self) -> &'static str {
        "IP removed from Security Group."
    }
}

/// Removes expired grants exactly as described by their job payload.
#[derive(Clone)]
pub struct RevocationService {
    store: Arc<dyn GrantStore>,
    audit_logger: AuditLogger,
    clock: Arc<dyn Clock>,
}

impl RevocationService {
    /// Creates a new revocation service.
    #[must_use]
    pub fn new(store: Arc<dyn GrantStore>, audit_logger: AuditLogger, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            audit_logger,
            clock,
        }
    }

    /// Removes the rule named by `payload`.
    ///
    /// The payload is trusted as-is. A rule that is already absent counts as
    /// success; any other store failure is returned.
    pub async fn revoke(&self, payload: RevocationPayload) -> AppResult<RevocationOutcome> {
        let rule = payload.to_rule()?;

        let outcome = match self.store.remove(&rule).await {
            Ok(()) => RevocationOutcome::Removed,
            Err(AppError::NotFound(_)) => RevocationOutcome::AlreadyAbsent,
            Err(AppError::StoreMutation(message)) => return Err(AppError::StoreMutation(message)),
            Err(error) => return Err(AppError::StoreMutation(error.to_string())),
        };

        let message = match outcome {
            RevocationOutcome::Removed => format!(
                "IP {} removed from Security Group {} on port {}.",
                rule.origin(),
                rule.group().group_id(),
                rule.port()
            ),
            RevocationOutcome::AlreadyAbsent => format!(
                "IP {} was already absent from Security Group {} on port {}.",
                rule.origin(),
                rule.group().group_id(),
                rule.port()
            ),
        };
        self.audit_logger
            .record(AuditAction::GrantRevoked, message, self.clock.now())
            .await;

        info!(
            origin = %rule.origin(),
            group_id = rule.group().group_id(),
            port = rule.port().value(),
            outcome = ?outcome,
            "access revoked"
        );

        Ok(outcome)
    }
}
