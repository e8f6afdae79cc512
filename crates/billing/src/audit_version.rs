use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use rxledger_core::{ActorId, BillId};

/// One field-level change captured by an override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: JsonValue,
    pub new: JsonValue,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, old: JsonValue, new: JsonValue) -> Self {
        Self {
            field: field.into(),
            old,
            new,
        }
    }
}

/// Immutable snapshot of a diff applied to a locked bill.
///
/// The only permitted write path once a bill is finalized: the version is
/// appended atomically with the change it describes, and survives even a
/// force-delete of the bill itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillAuditVersion {
    pub id: Uuid,
    pub bill_id: BillId,
    pub actor_id: ActorId,
    pub reason: String,
    pub at: DateTime<Utc>,
    pub changes: Vec<FieldChange>,
}

impl BillAuditVersion {
    pub fn new(
        bill_id: BillId,
        actor_id: ActorId,
        reason: impl Into<String>,
        changes: Vec<FieldChange>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            bill_id,
            actor_id,
            reason: reason.into(),
            at: Utc::now(),
            changes,
        }
    }
}
