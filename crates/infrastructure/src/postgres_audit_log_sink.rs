use async_trait::async_trait;
use sqlx::PgPool;

use portwarden_application::{AuditLogSink, AuditRecord};
use portwarden_core::{AppError, AppResult};
use portwarden_domain::AuditPartitionKey;

/// PostgreSQL-backed append-only audit log partitioned by UTC date.
#[derive(Clone)]
pub struct PostgresAuditLogSink {
    pool: PgPool,
}

impl PostgresAuditLogSink {
    /// Creates a sink with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogSink for PostgresAuditLogSink {
    async fn create_partition(
        &self,
        log_group: &str,
        partition: &AuditPartitionKey,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_log_partitions (log_group, partition_key)
            VALUES ($1, $2)
            ON CONFLICT (log_group, partition_key) DO NOTHING
            "#,
        )
        .bind(log_group)
        .bind(partition.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to create audit partition '{partition}' in '{log_group}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "audit partition '{partition}' already exists in '{log_group}'"
            )));
        }

        Ok(())
    }

    async fn put_record(
        &self,
        log_group: &str,
        partition: &AuditPartitionKey,
        record: &AuditRecord,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log_events (log_group, partition_key, action, message, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(log_group)
        .bind(partition.as_str())
        .bind(record.action.as_str())
        .bind(record.message.as_str())
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if let sqlx::Error::Database(database_error) = &error
                && database_error.code().as_deref() == Some("23503")
            {
                return AppError::NotFound(format!(
                    "audit partition '{partition}' does not exist in '{log_group}'"
                ));
            }

            AppError::Internal(format!(
                "failed to append audit record to '{log_group}/{partition}': {error}"
            ))
        })?;

        Ok(())
    }
}
