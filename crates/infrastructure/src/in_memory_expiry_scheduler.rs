use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use portwarden_application::{
    ClaimedRevocationJob, Clock, ExpiryScheduler, OneShotJob, RevocationJobQueue,
};
use portwarden_core::{AppError, AppResult};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
enum JobState {
    Pending,
    Leased {
        lease_token: String,
        lease_expires_at: DateTime<Utc>,
    },
    Failed {
        last_error: String,
    },
}

#[derive(Debug, Clone)]
struct StoredJob {
    job_id: String,
    job: OneShotJob,
    state: JobState,
}

/// In-memory one-shot scheduler used by single-process deployments and tests.
pub struct InMemoryExpiryScheduler {
    clock: Arc<dyn Clock>,
    jobs: RwLock<HashMap<String, StoredJob>>,
}

impl InMemoryExpiryScheduler {
    /// Creates an empty scheduler reading due times from the given clock.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the registered job under a schedule key, if any.
    pub async fn find_job(&self, schedule_key: &str) -> Option<OneShotJob> {
        self.jobs
            .read()
            .await
            .get(schedule_key)
            .map(|stored| stored.job.clone())
    }

    /// Returns the recorded error of a failed job.
    pub async fn failure_of(&self, schedule_key: &str) -> Option<String> {
        match self.jobs.read().await.get(schedule_key).map(|stored| &stored.state) {
            Some(JobState::Failed { last_error }) => Some(last_error.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl ExpiryScheduler for InMemoryExpiryScheduler {
    async fn register(&self, job: OneShotJob) -> AppResult<()> {
        let key = job.schedule_key.as_str().to_owned();
        self.jobs.write().await.insert(
            key,
            StoredJob {
                job_id: Uuid::new_v4().to_string(),
                job,
                state: JobState::Pending,
            },
        );

        Ok(())
    }
}

#[async_trait]
impl RevocationJobQueue for InMemoryExpiryScheduler {
    async fn claim_due_jobs(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedRevocationJob>> {
        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "revocation job lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let now = self.clock.now();
        let mut jobs = self.jobs.write().await;
        let mut due: Vec<&mut StoredJob> = jobs
            .values_mut()
            .filter(|stored| {
                stored.job.fire_at <= now
                    && match &stored.state {
                        JobState::Pending => true,
                        JobState::Leased {
                            lease_expires_at, ..
                        } => *lease_expires_at < now,
                        JobState::Failed { .. } => false,
                    }
            })
            .collect();
        due.sort_by_key(|stored| stored.job.fire_at);

        Ok(due
            .into_iter()
            .take(limit)
            .map(|stored| {
                let lease_token = format!("{worker_id}:{}", Uuid::new_v4());
                stored.state = JobState::Leased {
                    lease_token: lease_token.clone(),
                    lease_expires_at: now + Duration::seconds(i64::from(lease_seconds)),
                };

                ClaimedRevocationJob {
                    job_id: stored.job_id.clone(),
                    lease_token,
                    job: stored.job.clone(),
                }
            })
            .collect())
    }

    async fn complete_job(&self, job: &ClaimedRevocationJob) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        let key = job.job.schedule_key.as_str();

        if !holds_lease(jobs.get(key), job) {
            return Err(AppError::Conflict(format!(
                "revocation job '{key}' is no longer leased by this executor"
            )));
        }

        jobs.remove(key);
        Ok(())
    }

    async fn fail_job(&self, job: &ClaimedRevocationJob, error_message: &str) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        let key = job.job.schedule_key.as_str();

        if !holds_lease(jobs.get(key), job) {
            return Err(AppError::Conflict(format!(
                "revocation job '{key}' is no longer leased by this executor"
            )));
        }

        if let Some(stored) = jobs.get_mut(key) {
            stored.state = JobState::Failed {
                last_error: error_message.to_owned(),
            };
        }

        Ok(())
    }
}

fn holds_lease(stored: Option<&StoredJob>, claimed: &ClaimedRevocationJob) -> bool {
    stored.is_some_and(|stored| {
        stored.job_id == claimed.job_id
            && matches!(
                &stored.state,
                JobState::Leased { lease_token, .. } if *lease_token == claimed.lease_token
            )
    })
}
