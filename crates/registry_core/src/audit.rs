//! Audit Recorder (C11): a structured log of every registry verb attempt, success or
//! failure.
//!
//! Recording failures are swallowed per §4.11/§7 -- callers never propagate an `Err`
//! from [`AuditSink::record`].
use async_trait::async_trait;
use serde_json::Value;

/// One audited registry verb attempt.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: &'static str,
    pub resource_kind: &'static str,
    pub resource_id: Option<String>,
    pub user_id: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub details: Value,
    pub success: bool,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

/// Default sink: writes one structured `tracing` event per entry. Suitable as the
/// out-of-the-box implementation since the core has no opinion about where audit
/// records should ultimately land (file, DB, log aggregator).
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) {
        tracing::info!(
            action = entry.action,
            resource.kind = entry.resource_kind,
            resource.id = entry.resource_id.as_deref(),
            user_id = entry.user_id.as_deref(),
            client_ip = entry.client_ip.as_deref(),
            user_agent = entry.user_agent.as_deref(),
            success = entry.success,
            details = %entry.details,
            "registry audit",
        );
    }
}
