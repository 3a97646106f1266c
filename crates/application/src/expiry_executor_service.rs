//! Scheduler executor: fires due revocation jobs once and deletes them.

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use portwarden_core::AppResult;

use crate::grant_ports::{ClaimedRevocationJob, Clock, RevocationInvoker, RevocationJobQueue};

/// Counters for one executor pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Jobs leased in this pass.
    pub claimed: usize,
    /// Jobs whose target succeeded and that were deleted.
    pub completed: usize,
    /// Jobs whose target failed and that were marked failed.
    pub failed: usize,
}

/// Claims due one-shot jobs and invokes their revocation target.
#[derive(Clone)]
pub struct ExpiryExecutorService {
    queue: Arc<dyn RevocationJobQueue>,
    invoker: Arc<dyn RevocationInvoker>,
    clock: Arc<dyn Clock>,
}

impl ExpiryExecutorService {
    /// Creates a new executor service.
    #[must_use]
    pub fn new(
        queue: Arc<dyn RevocationJobQueue>,
        invoker: Arc<dyn RevocationInvoker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            invoker,
            clock,
        }
    }

    /// Runs one claim-and-fire pass.
    ///
    /// Jobs are never retried: a failed invocation marks the job failed and
    /// leaves it for an operator.
    pub async fn run_once(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<ExecutionSummary> {
        let claimed_jobs = self
            .queue
            .claim_due_jobs(worker_id, limit, lease_seconds)
            .await?;
        let mut summary = ExecutionSummary {
            claimed: claimed_jobs.len(),
            ..ExecutionSummary::default()
        };

        for claimed in claimed_jobs {
            self.warn_if_outside_window(worker_id, &claimed);

            match self.invoker.invoke(&claimed.job).await {
                Ok(()) => {
                    if let Err(error) = self.queue.complete_job(&claimed).await {
                        warn!(
                            worker_id = worker_id,
                            job_id = %claimed.job_id,
                            error = %error,
                            "failed to delete completed revocation job"
                        );
                        continue;
                    }

                    summary.completed += 1;
                    info!(
                        worker_id = worker_id,
                        job_id = %claimed.job_id,
                        schedule_key = %claimed.job.schedule_key,
                        origin = %claimed.job.payload.origin,
                        "revocation job completed"
                    );
                }
                Err(error) => {
                    warn!(
                        worker_id = worker_id,
                        job_id = %claimed.job_id,
                        schedule_key = %claimed.job.schedule_key,
                        error = %error,
                        "revocation target failed"
                    );

                    if let Err(fail_error) =
                        self.queue.fail_job(&claimed, error.to_string().as_str()).await
                    {
                        warn!(
                            worker_id = worker_id,
                            job_id = %claimed.job_id,
                            error = %fail_error,
                            "failed to mark revocation job failed"
                        );
                        continue;
                    }

                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    fn warn_if_outside_window(&self, worker_id: &str, claimed: &ClaimedRevocationJob) {
        let window_end = claimed.job.fire_at
            + Duration::minutes(i64::from(claimed.job.flexible_window_minutes));
        let now = self.clock.now();

        if now > window_end {
            warn!(
                worker_id = worker_id,
                job_id = %claimed.job_id,
                schedule_key = %claimed.job.schedule_key,
                fire_at = %claimed.job.fire_at,
                "revocation job fired after its flexible window"
            );
        }
    }
}
