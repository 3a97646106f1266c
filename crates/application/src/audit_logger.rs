//! Append-only audit trail of grant and revocation events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use portwarden_core::{AppError, AppResult};
use portwarden_domain::{AuditAction, AuditPartitionKey};

use crate::audit_ports::{AuditLogSink, AuditRecord};

/// Writes audit records into date-partitioned log groups.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditLogSink>,
    log_group: String,
}

impl AuditLogger {
    /// Creates a logger writing into `log_group`.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditLogSink>, log_group: impl Into<String>) -> Self {
        Self {
            sink,
            log_group: log_group.into(),
        }
    }

    /// Appends one record to the partition of its timestamp.
    ///
    /// A partition that already exists is not an error. Any other sink
    /// failure is reported as `AppError::LogSink`.
    pub async fn append(
        &self,
        action: AuditAction,
        message: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let partition = AuditPartitionKey::for_instant(recorded_at);

        match self
            .sink
            .create_partition(self.log_group.as_str(), &partition)
            .await
        {
            Ok(()) | Err(AppError::Conflict(_)) => {}
            Err(error) => return Err(as_log_sink_error(error)),
        }

        let record = AuditRecord {
            action,
            message: message.into(),
            recorded_at,
        };

        self.sink
            .put_record(self.log_group.as_str(), &partition, &record)
            .await
            .map_err(as_log_sink_error)
    }

    /// Appends one record and swallows sink failures after logging them.
    pub async fn record(
        &self,
        action: AuditAction,
        message: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) {
        if let Err(error) = self.append(action, message, recorded_at).await {
            warn!(
                log_group = %self.log_group,
                action = action.as_str(),
                error = %error,
                "audit record dropped"
            );
        }
    }
}

fn as_log_sink_error(error: AppError) -> AppError {
    match error {
        AppError::LogSink(message) => AppError::LogSink(message),
        other => AppError::LogSink(other.to_string()),
    }
}
