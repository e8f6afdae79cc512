//! Stock notification side channel.
//!
//! Low-stock and near-expiry alerts are emitted after ledger postings.
//! Fire-and-forget: a failing sink never rolls back a posting.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rxledger_core::{BatchId, ProductId};

use crate::SinkError;

/// Alert emitted by the stock ledger after a posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockAlert {
    /// Total on-hand quantity for a product dropped to or below its minimum.
    LowStock {
        product_id: ProductId,
        on_hand: i64,
        min_stock: i64,
    },
    /// A batch with remaining quantity is close to (or past) expiry.
    ExpiryApproaching {
        product_id: ProductId,
        batch_id: BatchId,
        expiry: NaiveDate,
        quantity: i64,
    },
}

/// Alert consumer.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, alert: StockAlert) -> Result<(), SinkError>;
}

impl<S> NotificationSink for Arc<S>
where
    S: NotificationSink + ?Sized,
{
    fn notify(&self, alert: StockAlert) -> Result<(), SinkError> {
        (**self).notify(alert)
    }
}

/// Dispatch an alert, isolating sink failures.
pub fn notify_best_effort(sink: &dyn NotificationSink, alert: StockAlert) {
    if let Err(e) = sink.notify(alert) {
        warn!(error = %e, "stock alert dropped");
    }
}

/// Sink that emits alerts as structured log lines.
#[derive(Debug, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, alert: StockAlert) -> Result<(), SinkError> {
        match &alert {
            StockAlert::LowStock {
                product_id,
                on_hand,
                min_stock,
            } => info!(%product_id, on_hand, min_stock, "low stock"),
            StockAlert::ExpiryApproaching {
                product_id,
                batch_id,
                expiry,
                quantity,
            } => info!(%product_id, %batch_id, %expiry, quantity, "batch nearing expiry"),
        }
        Ok(())
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct InMemoryNotificationSink {
    alerts: Mutex<Vec<StockAlert>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<StockAlert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn notify(&self, alert: StockAlert) -> Result<(), SinkError> {
        self.alerts
            .lock()
            .map_err(|_| SinkError::new("notification sink lock poisoned"))?
            .push(alert);
        Ok(())
    }
}
