//! Ports over the firewall rule set, the one-shot scheduler and the clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use portwarden_core::AppResult;
use portwarden_domain::{FirewallGroup, IngressPermission, IngressRule, RevocationPayload, ScheduleKey};

use crate::settings::RevocationTarget;

/// Query and mutate interface over a firewall group's ingress rules.
///
/// `add` and `remove` are not idempotent: a duplicate add reports
/// `AppError::Conflict` and removing an absent rule reports
/// `AppError::NotFound`. Callers decide how to treat either.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Lists every ingress permission currently stored in the group.
    async fn list_permissions(&self, group: &FirewallGroup) -> AppResult<Vec<IngressPermission>>;

    /// Returns whether a permission matching the exact tuple is present.
    async fn exists(&self, rule: &IngressRule) -> AppResult<bool> {
        let permissions = self.list_permissions(rule.group()).await?;
        Ok(permissions
            .iter()
            .any(|permission| rule.is_satisfied_by(permission)))
    }

    /// Admits the tuple.
    async fn add(&self, rule: &IngressRule) -> AppResult<()>;

    /// Removes the tuple.
    async fn remove(&self, rule: &IngressRule) -> AppResult<()>;
}

/// A one-shot revocation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShotJob {
    /// Deterministic job name.
    pub schedule_key: ScheduleKey,
    /// Earliest instant the job may fire.
    pub fire_at: DateTime<Utc>,
    /// Width of the window after `fire_at` within which the job fires.
    pub flexible_window_minutes: u32,
    /// Entry point invoked when the job fires.
    pub target: RevocationTarget,
    /// Sole input of the revocation step.
    pub payload: RevocationPayload,
}

/// Registers one-shot jobs that fire once and then delete themselves.
#[async_trait]
pub trait ExpiryScheduler: Send + Sync {
    /// Registers a job. A pending job under the same key is replaced.
    async fn register(&self, job: OneShotJob) -> AppResult<()>;
}

/// A due job leased by one scheduler executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedRevocationJob {
    /// Storage identifier.
    pub job_id: String,
    /// Lease token proving ownership of the claim.
    pub lease_token: String,
    /// Job definition.
    pub job: OneShotJob,
}

/// Executor-side view of the scheduler: claim, then complete or fail.
#[async_trait]
pub trait RevocationJobQueue: Send + Sync {
    /// Leases up to `limit` jobs whose fire time has passed.
    async fn claim_due_jobs(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedRevocationJob>>;

    /// Deletes a job after its target completed.
    async fn complete_job(&self, job: &ClaimedRevocationJob) -> AppResult<()>;

    /// Marks a job failed. Failed jobs are not retried.
    async fn fail_job(&self, job: &ClaimedRevocationJob, error_message: &str) -> AppResult<()>;
}

/// Invokes a job's revocation target with the job payload.
#[async_trait]
pub trait RevocationInvoker: Send + Sync {
    /// Calls the target once. Any error marks the job failed.
    async fn invoke(&self, job: &OneShotJob) -> AppResult<()>;
}

/// Lease held while one request mutates a tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantMutationLease {
    /// Lock key derived from the tuple.
    pub key: String,
    /// Token used for compare-and-delete on release.
    pub token: String,
}

/// Distributed compare-and-set guarding the check-then-act grant sequence.
#[async_trait]
pub trait GrantMutationGuard: Send + Sync {
    /// Attempts to lease the tuple. Returns `None` when another request holds it.
    async fn try_acquire(
        &self,
        rule: &IngressRule,
        lease_seconds: u32,
    ) -> AppResult<Option<GrantMutationLease>>;

    /// Releases a lease if it is still owned.
    async fn release(&self, lease: &GrantMutationLease) -> AppResult<()>;
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Returns the current UTC instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
