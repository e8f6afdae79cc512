//! Audit trail side channel.
//!
//! Every state transition, override and consistency fix produces one audit
//! record (entity, action, actor, timestamp, details). Delivery is
//! best-effort: the primary operation completes first, then the record is
//! dispatched through [`audit_best_effort`].

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use rxledger_core::ActorId;

use crate::SinkError;

/// One audit fact. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Entity kind, e.g. `"bill"`, `"batch"`, `"payment"`.
    pub entity_kind: String,
    /// Display form of the entity id.
    pub entity_id: String,
    /// Action name, e.g. `"finalize"`, `"cancel"`, `"consistency_fix"`.
    pub action: String,
    pub actor_id: ActorId,
    pub at: DateTime<Utc>,
    /// Free-form structured context (before/after values, reasons).
    pub details: JsonValue,
}

impl AuditRecord {
    pub fn new(
        entity_kind: impl Into<String>,
        entity_id: impl ToString,
        action: impl Into<String>,
        actor_id: ActorId,
        details: JsonValue,
    ) -> Self {
        Self {
            entity_kind: entity_kind.into(),
            entity_id: entity_id.to_string(),
            action: action.into(),
            actor_id,
            at: Utc::now(),
            details,
        }
    }
}

/// Audit record consumer.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord) -> Result<(), SinkError>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn record(&self, record: AuditRecord) -> Result<(), SinkError> {
        (**self).record(record)
    }
}

/// Dispatch an audit record, isolating sink failures.
///
/// A failure is surfaced as a warning only; the caller's operation has already
/// committed and must not be affected.
pub fn audit_best_effort(sink: &dyn AuditSink, record: AuditRecord) {
    let entity = format!("{}/{}", record.entity_kind, record.entity_id);
    let action = record.action.clone();
    if let Err(e) = sink.record(record) {
        warn!(%entity, %action, error = %e, "audit record dropped");
    }
}

/// Sink that emits audit records as structured log lines.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) -> Result<(), SinkError> {
        info!(
            entity_kind = %record.entity_kind,
            entity_id = %record.entity_id,
            action = %record.action,
            actor_id = %record.actor_id,
            details = %record.details,
            "audit"
        );
        Ok(())
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Records matching an action name, for targeted assertions.
    pub fn records_for_action(&self, action: &str) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.action == action)
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: AuditRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .map_err(|_| SinkError::new("audit sink lock poisoned"))?
            .push(record);
        Ok(())
    }
}
