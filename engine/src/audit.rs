use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use modgate_core::audit::AuditRecord;

use crate::error::StoreError;

/// External destination for audit records.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError>;
}

/// Writes records to the tracing output. Used when no durable log is
/// configured.
pub struct TracingAuditLog;

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        tracing::info!(
            audit_id = %record.id,
            action = %record.action,
            actor_id = record.actor_id,
            target_id = ?record.target_id,
            guild_id = record.guild_id,
            reason = %record.reason,
            "moderation audit"
        );
        Ok(())
    }
}

/// Fire-and-forget delivery of audit records.
#[derive(Clone)]
pub struct AuditSink {
    log: Arc<dyn AuditLog>,
}

impl AuditSink {
    pub fn new(log: Arc<dyn AuditLog>) -> Self {
        Self { log }
    }

    /// Deliver in the background. Failures are logged and never reach the
    /// actor; the returned handle is only useful to tests.
    pub fn record(&self, record: AuditRecord) -> JoinHandle<()> {
        let log = self.log.clone();
        tokio::spawn(async move {
            if let Err(err) = log.append(&record).await {
                tracing::warn!(
                    error = %err,
                    audit_id = %record.id,
                    action = %record.action,
                    "failed to deliver audit record"
                );
            }
        })
    }
}
