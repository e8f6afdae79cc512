//! `rxledger-events` — best-effort side channels.
//!
//! Audit records and stock notifications are dispatched **after** the primary
//! transaction commits. A failing sink is caught and logged; it can never roll
//! back or abort a financial operation.

pub mod audit;
pub mod notify;

pub use audit::{AuditRecord, AuditSink, InMemoryAuditSink, TracingAuditSink, audit_best_effort};
pub use notify::{
    InMemoryNotificationSink, NotificationSink, StockAlert, TracingNotificationSink,
    notify_best_effort,
};

use thiserror::Error;

/// Failure inside a side-channel sink.
///
/// Deliberately a single opaque variant: callers only ever log it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("sink failure: {0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
