use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use portwarden_application::{
    ClaimedRevocationJob, ExpiryScheduler, OneShotJob, RevocationJobQueue, RevocationTarget,
};
use portwarden_core::{AppError, AppResult};
use portwarden_domain::{RevocationPayload, ScheduleKey};

/// PostgreSQL-backed one-shot scheduler shared by the API and the worker.
#[derive(Clone)]
pub struct PostgresExpiryScheduler {
    pool: PgPool,
}

impl PostgresExpiryScheduler {
    /// Creates a scheduler with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ClaimedJobRow {
    job_id: uuid::Uuid,
    lease_token: String,
    schedule_key: String,
    fire_at: DateTime<Utc>,
    flexible_window_minutes: i32,
    target_url: String,
    execution_role: String,
    payload: Value,
}

impl ClaimedJobRow {
    fn into_claimed(self) -> AppResult<ClaimedRevocationJob> {
        let payload: RevocationPayload = serde_json::from_value(self.payload).map_err(|error| {
            AppError::Internal(format!(
                "stored revocation payload for '{}' is invalid: {error}",
                self.schedule_key
            ))
        })?;
        let flexible_window_minutes = u32::try_from(self.flexible_window_minutes).map_err(
            |error| AppError::Internal(format!("stored flexible window is invalid: {error}")),
        )?;

        Ok(ClaimedRevocationJob {
            job_id: self.job_id.to_string(),
            lease_token: self.lease_token,
            job: OneShotJob {
                schedule_key: ScheduleKey::from_stored(self.schedule_key),
                fire_at: self.fire_at,
                flexible_window_minutes,
                target: RevocationTarget::new(
                    self.target_url.as_str(),
                    self.execution_role.as_str(),
                )?,
                payload,
            },
        })
    }
}

fn parse_job_id(job: &ClaimedRevocationJob) -> AppResult<uuid::Uuid> {
    uuid::Uuid::parse_str(job.job_id.as_str()).map_err(|error| {
        AppError::Validation(format!(
            "invalid revocation job id '{}': {error}",
            job.job_id
        ))
    })
}

#[async_trait]
impl ExpiryScheduler for PostgresExpiryScheduler {
    async fn register(&self, job: OneShotJob) -> AppResult<()> {
        let payload = serde_json::to_value(&job.payload).map_err(|error| {
            AppError::Internal(format!("failed to encode revocation payload: {error}"))
        })?;
        let flexible_window_minutes = i32::try_from(job.flexible_window_minutes).map_err(
            |error| AppError::Validation(format!("invalid flexible window: {error}")),
        )?;

        sqlx::query(
            r#"
            INSERT INTO scheduled_revocation_jobs (
                schedule_key,
                fire_at,
                flexible_window_minutes,
                target_url,
                execution_role,
                payload,
                status,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', now(), now())
            ON CONFLICT (schedule_key)
            DO UPDATE SET
                fire_at = EXCLUDED.fire_at,
                flexible_window_minutes = EXCLUDED.flexible_window_minutes,
                target_url = EXCLUDED.target_url,
                execution_role = EXCLUDED.execution_role,
                payload = EXCLUDED.payload,
                status = 'pending',
                leased_by = NULL,
                lease_token = NULL,
                lease_expires_at = NULL,
                last_error = NULL,
                updated_at = now()
            "#,
        )
        .bind(job.schedule_key.as_str())
        .bind(job.fire_at)
        .bind(flexible_window_minutes)
        .bind(job.target.target_url.as_str())
        .bind(job.target.execution_role.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to register revocation job '{}': {error}",
                job.schedule_key
            ))
        })?;

        Ok(())
    }
}

#[async_trait]
impl RevocationJobQueue for PostgresExpiryScheduler {
    async fn claim_due_jobs(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedRevocationJob>> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start revocation job claim transaction: {error}"
            ))
        })?;

        let rows = sqlx::query_as::<_, ClaimedJobRow>(
            r#"
            WITH candidate_jobs AS (
                SELECT id
                FROM scheduled_revocation_jobs
                WHERE fire_at <= now()
                  AND (
                        status = 'pending'
                        OR (status = 'leased' AND lease_expires_at < now())
                      )
                ORDER BY fire_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE scheduled_revocation_jobs jobs
            SET
                status = 'leased',
                leased_by = $2,
                lease_token = gen_random_uuid()::TEXT,
                lease_expires_at = now() + make_interval(secs => $3::INT),
                updated_at = now()
            FROM candidate_jobs
            WHERE jobs.id = candidate_jobs.id
            RETURNING
                jobs.id AS job_id,
                jobs.lease_token,
                jobs.schedule_key,
                jobs.fire_at,
                jobs.flexible_window_minutes,
                jobs.target_url,
                jobs.execution_role,
                jobs.payload
            "#,
        )
        .bind(i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid revocation claim limit: {error}"))
        })?)
        .bind(worker_id)
        .bind(i32::try_from(lease_seconds).map_err(|error| {
            AppError::Validation(format!("invalid revocation lease_seconds: {error}"))
        })?)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to claim revocation jobs for worker '{worker_id}': {error}"
            ))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit revocation job claim transaction: {error}"
            ))
        })?;

        rows.into_iter().map(ClaimedJobRow::into_claimed).collect()
    }

    async fn complete_job(&self, job: &ClaimedRevocationJob) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM scheduled_revocation_jobs
            WHERE id = $1 AND status = 'leased' AND lease_token = $2
            "#,
        )
        .bind(parse_job_id(job)?)
        .bind(job.lease_token.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to complete revocation job '{}': {error}",
                job.job_id
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "revocation job '{}' is no longer leased by this executor",
                job.job_id
            )));
        }

        Ok(())
    }

    async fn fail_job(&self, job: &ClaimedRevocationJob, error_message: &str) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_revocation_jobs
            SET
                status = 'failed',
                last_error = $3,
                lease_token = NULL,
                lease_expires_at = NULL,
                updated_at = now()
            WHERE id = $1 AND status = 'leased' AND lease_token = $2
            "#,
        )
        .bind(parse_job_id(job)?)
        .bind(job.lease_token.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to mark revocation job '{}' failed: {error}",
                job.job_id
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "revocation job '{}' is no longer leased by this executor",
                job.job_id
            )));
        }

        Ok(())
    }
}
