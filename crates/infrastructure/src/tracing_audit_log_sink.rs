//! Console audit sink for development. Writes audit records to tracing output.

use std::collections::HashSet;

use async_trait::async_trait;
use portwarden_application::{AuditLogSink, AuditRecord};
use portwarden_core::{AppError, AppResult};
use portwarden_domain::AuditPartitionKey;
use tokio::sync::RwLock;
use tracing::info;

/// Development audit sink that logs records to the console.
#[derive(Debug, Default)]
pub struct TracingAuditLogSink {
    partitions: RwLock<HashSet<(String, String)>>,
}

impl TracingAuditLogSink {
    /// Creates a new console audit sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLogSink for TracingAuditLogSink {
    async fn create_partition(
        &self,
        log_group: &str,
        partition: &AuditPartitionKey,
    ) -> AppResult<()> {
        let inserted = self
            .partitions
            .write()
            .await
            .insert((log_group.to_owned(), partition.as_str().to_owned()));

        if !inserted {
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
        if !self
            .partitions
            .read()
            .await
            .contains(&(log_group.to_owned(), partition.as_str().to_owned()))
        {
            return Err(AppError::NotFound(format!(
                "audit partition '{partition}' does not exist in '{log_group}'"
            )));
        }

        info!(
            log_group = log_group,
            partition = %partition,
            action = record.action.as_str(),
            recorded_at = %record.recorded_at,
            "{}",
            record.message
        );

        Ok(())
    }
}
