//! Grant orchestration: check the firewall, admit the origin, schedule expiry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use portwarden_core::{AppError, AppResult, VerifiedIdentity};
use portwarden_domain::{AccessGrant, AuditAction, GrantOrigin, IngressRule};

use crate::audit_logger::AuditLogger;
use crate::grant_ports::{Clock, ExpiryScheduler, GrantMutationGuard, GrantStore, OneShotJob};
use crate::settings::{FLEXIBLE_WINDOW_MINUTES, GrantPolicy, RevocationTarget};

/// Seconds a tuple stays leased while one request runs the grant sequence.
const MUTATION_LEASE_SECONDS: u32 = 30;

/// Result of a grant request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantDecision {
    /// A matching rule already admits the origin. Its expiry is unchanged.
    AlreadyAllowed,
    /// A new rule was added and its revocation scheduled.
    Granted {
        /// Instant the revocation job is registered for.
        expires_at: DateTime<Utc>,
        /// `expires_at` rendered for the caller.
        expires_at_display: String,
    },
}

impl GrantDecision {
    /// Caller-facing message for this decision.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::AlreadyAllowed => "IP already allowed.".to_owned(),
            Self::Granted {
                expires_at_display,
                ..
            } => format!("IP allowed until {expires_at_display}."),
        }
    }
}

/// Application service deciding and applying access grants.
#[derive(Clone)]
pub struct AccessGrantService {
    store: Arc<dyn GrantStore>,
    scheduler: Arc<dyn ExpiryScheduler>,
    audit_logger: AuditLogger,
    clock: Arc<dyn Clock>,
    mutation_guard: Option<Arc<dyn GrantMutationGuard>>,
    policy: GrantPolicy,
    revocation_target: RevocationTarget,
}

impl AccessGrantService {
    /// Creates a new grant service.
    #[must_use]
    pub fn new(
        store: Arc<dyn GrantStore>,
        scheduler: Arc<dyn ExpiryScheduler>,
        audit_logger: AuditLogger,
        clock: Arc<dyn Clock>,
        policy: GrantPolicy,
        revocation_target: RevocationTarget,
    ) -> Self {
        Self {
            store,
            scheduler,
            audit_logger,
            clock,
            mutation_guard: None,
            policy,
            revocation_target,
        }
    }

    /// Serializes concurrent grant sequences for the same tuple.
    #[must_use]
    pub fn with_mutation_guard(mut self, mutation_guard: Arc<dyn GrantMutationGuard>) -> Self {
        self.mutation_guard = Some(mutation_guard);
        self
    }

    /// Admits `origin` on the configured port unless it already is.
    ///
    /// The identity is only proof of authentication; no claim is consulted.
    pub async fn grant_access(
        &self,
        identity: &VerifiedIdentity,
        origin: GrantOrigin,
    ) -> AppResult<GrantDecision> {
        let rule = IngressRule::new(self.policy.group.clone(), origin, self.policy.port);

        let Some(mutation_guard) = self.mutation_guard.as_ref() else {
            return self.apply_grant(identity, rule).await;
        };

        let Some(lease) = mutation_guard
            .try_acquire(&rule, MUTATION_LEASE_SECONDS)
            .await?
        else {
            if self.store.exists(&rule).await? {
                info!(
                    tuple = %rule.tuple_key(),
                    "origin already allowed while another grant holds the tuple"
                );
                return Ok(GrantDecision::AlreadyAllowed);
            }

            info!(
                tuple = %rule.tuple_key(),
                "grant already in progress for tuple"
            );
            return Err(AppError::Conflict(format!(
                "a grant for {} is already in progress",
                rule.origin()
            )));
        };

        let decision = self.apply_grant(identity, rule).await;

        if let Err(error) = mutation_guard.release(&lease).await {
            warn!(key = %lease.key, error = %error, "failed to release grant mutation lease");
        }

        decision
    }

    async fn apply_grant(
        &self,
        identity: &VerifiedIdentity,
        rule: IngressRule,
    ) -> AppResult<GrantDecision> {
        if self.store.exists(&rule).await? {
            info!(
                origin = %rule.origin(),
                group_id = rule.group().group_id(),
                port = rule.port().value(),
                "origin already allowed"
            );
            return Ok(GrantDecision::AlreadyAllowed);
        }

        match self.store.add(&rule).await {
            Ok(()) => {}
            Err(AppError::Conflict(_)) => {
                info!(
                    origin = %rule.origin(),
                    group_id = rule.group().group_id(),
                    "concurrent grant added the rule first"
                );
                return Ok(GrantDecision::AlreadyAllowed);
            }
            Err(AppError::StoreMutation(message)) => return Err(AppError::StoreMutation(message)),
            Err(error) => return Err(AppError::StoreMutation(error.to_string())),
        }

        let grant = AccessGrant::new(rule, self.policy.ttl_seconds, self.clock.now())?;

        if let Err(error) = self.schedule_revocation(&grant).await {
            self.compensate(&grant).await;
            return Err(error);
        }

        let expires_at_display = grant.expires_at_display();
        self.audit_logger
            .record(
                AuditAction::GrantCreated,
                format!(
                    "IP {} allowed in Security Group {} on port {} until {}.",
                    grant.rule().origin(),
                    grant.rule().group().group_id(),
                    grant.rule().port(),
                    expires_at_display
                ),
                grant.created_at(),
            )
            .await;

        info!(
            subject = identity.subject(),
            origin = %grant.rule().origin(),
            group_id = grant.rule().group().group_id(),
            port = grant.rule().port().value(),
            schedule_key = %grant.schedule_key(),
            expires_at = %expires_at_display,
            "access granted"
        );

        Ok(GrantDecision::Granted {
            expires_at: grant.expires_at(),
            expires_at_display,
        })
    }

    async fn schedule_revocation(&self, grant: &AccessGrant) -> AppResult<()> {
        let job = OneShotJob {
            schedule_key: grant.schedule_key().clone(),
            fire_at: grant.expires_at(),
            flexible_window_minutes: FLEXIBLE_WINDOW_MINUTES,
            target: self.revocation_target.clone(),
            payload: grant.revocation_payload(),
        };

        self.scheduler.register(job).await.map_err(|error| match error {
            AppError::Scheduling(message) => AppError::Scheduling(message),
            other => AppError::Scheduling(other.to_string()),
        })
    }

    async fn compensate(&self, grant: &AccessGrant) {
        if !self.policy.compensate_on_schedule_failure {
            warn!(
                origin = %grant.rule().origin(),
                group_id = grant.rule().group().group_id(),
                "expiry scheduling failed; rule left without pending revocation"
            );
            return;
        }

        match self.store.remove(grant.rule()).await {
            Ok(()) | Err(AppError::NotFound(_)) => {
                warn!(
                    origin = %grant.rule().origin(),
                    group_id = grant.rule().group().group_id(),
                    "expiry scheduling failed; rule removed"
                );
            }
            Err(error) => {
                warn!(
                    origin = %grant.rule().origin(),
                    group_id = grant.rule().group().group_id(),
                    error = %error,
                    "expiry scheduling failed and compensating removal failed; rule is orphaned"
                );
            }
        }
    }
}
