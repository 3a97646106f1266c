use async_trait::async_trait;
use chrono::{DateTime, Utc};

use portwarden_core::AppResult;
use portwarden_domain::{AuditAction, AuditPartitionKey};

/// Immutable audit event appended to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    /// Stable audit action identifier.
    pub action: AuditAction,
    /// Human-readable message.
    pub message: String,
    /// Event timestamp; also the ordering key inside a partition.
    pub recorded_at: DateTime<Utc>,
}

/// Port for the append-only audit log sink.
#[async_trait]
pub trait AuditLogSink: Send + Sync {
    /// Creates a partition. Reports `AppError::Conflict` when it already exists.
    async fn create_partition(&self, log_group: &str, partition: &AuditPartitionKey)
    -> AppResult<()>;

    /// Appends one record to an existing partition.
    async fn put_record(
        &self,
        log_group: &str,
        partition: &AuditPartitionKey,
        record: &AuditRecord,
    ) -> AppResult<()>;
}
