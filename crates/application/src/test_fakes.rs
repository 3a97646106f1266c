//! In-process fakes shared by the service tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;

use portwarden_core::{AppError, AppResult, VerifiedIdentity};
use portwarden_domain::{
    AuditPartitionKey, FirewallGroup, GrantOrigin, GrantPort, IngressPermission, IngressRule,
};

use crate::audit_ports::{AuditLogSink, AuditRecord};
use crate::grant_ports::{
    ClaimedRevocationJob, Clock, ExpiryScheduler, GrantMutationGuard, GrantMutationLease,
    GrantStore, OneShotJob, RevocationInvoker, RevocationJobQueue,
};
use crate::identity_ports::{AuthorizationCodeExchanger, IdentityVerifier};
use crate::settings::{GrantPolicy, RevocationTarget};

pub(crate) const VALID_ASSERTION: &str = "valid-assertion";

pub(crate) fn creation_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0)
        .single()
        .unwrap_or_else(|| unreachable!())
}

pub(crate) fn group() -> FirewallGroup {
    FirewallGroup::new("sg-0123", "us-east-1").unwrap_or_else(|_| unreachable!())
}

pub(crate) fn origin(value: &str) -> GrantOrigin {
    value.parse().unwrap_or_else(|_| unreachable!())
}

pub(crate) fn rule(origin_value: &str, port: u16) -> IngressRule {
    IngressRule::new(
        group(),
        origin(origin_value),
        GrantPort::new(port).unwrap_or_else(|_| unreachable!()),
    )
}

pub(crate) fn policy(port: u16, ttl_seconds: u32) -> GrantPolicy {
    GrantPolicy::new(
        group(),
        GrantPort::new(port).unwrap_or_else(|_| unreachable!()),
        ttl_seconds,
    )
    .unwrap_or_else(|_| unreachable!())
}

pub(crate) fn revocation_target() -> RevocationTarget {
    RevocationTarget::new(
        "https://api.example.com/api/internal/revocations",
        "portwarden-scheduler",
    )
    .unwrap_or_else(|_| unreachable!())
}

pub(crate) fn identity() -> VerifiedIdentity {
    VerifiedIdentity::new("user-1", 1_900_000_000)
}

#[derive(Default)]
pub(crate) struct FakeGrantStore {
    pub(crate) rules: Mutex<Vec<IngressRule>>,
    pub(crate) add_calls: Mutex<usize>,
    pub(crate) fail_add: bool,
    pub(crate) fail_remove: bool,
    pub(crate) report_conflict_on_add: bool,
}

#[async_trait]
impl GrantStore for FakeGrantStore {
    async fn list_permissions(&self, group: &FirewallGroup) -> AppResult<Vec<IngressPermission>> {
        Ok(self
            .rules
            .lock()
            .await
            .iter()
            .filter(|rule| rule.group() == group)
            .map(IngressRule::to_permission)
            .collect())
    }

    async fn add(&self, rule: &IngressRule) -> AppResult<()> {
        *self.add_calls.lock().await += 1;
        if self.fail_add {
            return Err(AppError::StoreMutation("firewall rejected the rule".to_owned()));
        }
        if self.report_conflict_on_add {
            return Err(AppError::Conflict("rule already exists".to_owned()));
        }

        let mut rules = self.rules.lock().await;
        if rules.contains(rule) {
            return Err(AppError::Conflict("rule already exists".to_owned()));
        }
        rules.push(rule.clone());
        Ok(())
    }

    async fn remove(&self, rule: &IngressRule) -> AppResult<()> {
        if self.fail_remove {
            return Err(AppError::StoreMutation("firewall unavailable".to_owned()));
        }

        let mut rules = self.rules.lock().await;
        let before = rules.len();
        rules.retain(|stored| stored != rule);
        if rules.len() == before {
            return Err(AppError::NotFound("rule is not present".to_owned()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeExpiryScheduler {
    pub(crate) jobs: Mutex<HashMap<String, OneShotJob>>,
    pub(crate) registrations: Mutex<usize>,
    pub(crate) failing: bool,
}

impl FakeExpiryScheduler {
    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Drains every pending job as the scheduler would when they come due.
    pub(crate) async fn fire_all(&self) -> Vec<OneShotJob> {
        self.jobs.lock().await.drain().map(|(_, job)| job).collect()
    }
}

#[async_trait]
impl ExpiryScheduler for FakeExpiryScheduler {
    async fn register(&self, job: OneShotJob) -> AppResult<()> {
        if self.failing {
            return Err(AppError::Scheduling("scheduler unavailable".to_owned()));
        }

        *self.registrations.lock().await += 1;
        self.jobs
            .lock()
            .await
            .insert(job.schedule_key.as_str().to_owned(), job);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeAuditLogSink {
    pub(crate) partitions: Mutex<HashSet<String>>,
    pub(crate) records: Mutex<Vec<(String, AuditRecord)>>,
    pub(crate) failing: bool,
}

impl FakeAuditLogSink {
    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl AuditLogSink for FakeAuditLogSink {
    async fn create_partition(
        &self,
        _log_group: &str,
        partition: &AuditPartitionKey,
    ) -> AppResult<()> {
        if self.failing {
            return Err(AppError::Internal("sink unavailable".to_owned()));
        }

        if !self
            .partitions
            .lock()
            .await
            .insert(partition.as_str().to_owned())
        {
            return Err(AppError::Conflict("partition exists".to_owned()));
        }
        Ok(())
    }

    async fn put_record(
        &self,
        _log_group: &str,
        partition: &AuditPartitionKey,
        record: &AuditRecord,
    ) -> AppResult<()> {
        self.records
            .lock()
            .await
            .push((partition.as_str().to_owned(), record.clone()));
        Ok(())
    }
}

pub(crate) struct FixedClock(pub(crate) DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub(crate) enum FakeExchange {
    Issued(Option<String>),
    Rejected { status: u16, body: String },
}

pub(crate) struct FakeCodeExchanger {
    pub(crate) outcome: FakeExchange,
    pub(crate) calls: Mutex<Vec<String>>,
}

impl FakeCodeExchanger {
    pub(crate) fn new(outcome: FakeExchange) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AuthorizationCodeExchanger for FakeCodeExchanger {
    async fn exchange_code(&self, code: &str) -> AppResult<Option<String>> {
        self.calls.lock().await.push(code.to_owned());
        match &self.outcome {
            FakeExchange::Issued(assertion) => Ok(assertion.clone()),
            FakeExchange::Rejected { status, body } => Err(AppError::UpstreamExchange {
                status: *status,
                body: body.clone(),
            }),
        }
    }
}

pub(crate) struct FakeIdentityVerifier;

#[async_trait]
impl IdentityVerifier for FakeIdentityVerifier {
    async fn verify(&self, assertion: &str) -> AppResult<VerifiedIdentity> {
        if assertion == VALID_ASSERTION {
            return Ok(identity());
        }

        Err(AppError::InvalidAssertion("signature mismatch".to_owned()))
    }
}

#[derive(Default)]
pub(crate) struct FakeMutationGuard {
    pub(crate) held: Mutex<HashSet<String>>,
}

#[async_trait]
impl GrantMutationGuard for FakeMutationGuard {
    async fn try_acquire(
        &self,
        rule: &IngressRule,
        _lease_seconds: u32,
    ) -> AppResult<Option<GrantMutationLease>> {
        let key = rule.tuple_key();
        if !self.held.lock().await.insert(key.clone()) {
            return Ok(None);
        }

        Ok(Some(GrantMutationLease {
            key,
            token: "token".to_owned(),
        }))
    }

    async fn release(&self, lease: &GrantMutationLease) -> AppResult<()> {
        self.held.lock().await.remove(lease.key.as_str());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeJobQueue {
    pub(crate) due: Mutex<Vec<OneShotJob>>,
    pub(crate) completed: Mutex<Vec<String>>,
    pub(crate) failed: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl RevocationJobQueue for FakeJobQueue {
    async fn claim_due_jobs(
        &self,
        worker_id: &str,
        limit: usize,
        _lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedRevocationJob>> {
        let mut due = self.due.lock().await;
        let take = limit.min(due.len());

        Ok(due
            .drain(..take)
            .map(|job| ClaimedRevocationJob {
                job_id: job.schedule_key.as_str().to_owned(),
                lease_token: format!("{worker_id}:lease"),
                job,
            })
            .collect())
    }

    async fn complete_job(&self, job: &ClaimedRevocationJob) -> AppResult<()> {
        self.completed.lock().await.push(job.job_id.clone());
        Ok(())
    }

    async fn fail_job(&self, job: &ClaimedRevocationJob, error_message: &str) -> AppResult<()> {
        self.failed
            .lock()
            .await
            .push((job.job_id.clone(), error_message.to_owned()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeRevocationInvoker {
    pub(crate) invoked: Mutex<Vec<OneShotJob>>,
    pub(crate) failing_keys: HashSet<String>,
}

#[async_trait]
impl RevocationInvoker for FakeRevocationInvoker {
    async fn invoke(&self, job: &OneShotJob) -> AppResult<()> {
        self.invoked.lock().await.push(job.clone());
        if self.failing_keys.contains(job.schedule_key.as_str()) {
            return Err(AppError::Internal("target returned status 500".to_owned()));
        }
        Ok(())
    }
}
