//! Authoritative per-batch quantity state.
//!
//! The store's write lock is the serialization point for the whole engine:
//! every quantity mutation is a single atomic read-validate-write, and the
//! per-batch sequence numbers handed out here order the movement log.

use std::collections::HashMap;
use std::sync::RwLock;

use rxledger_core::{BatchId, DomainError, DomainResult, ProductId};

use crate::batch::Batch;

/// Outcome of one applied delta: the new quantity and the sequence slot the
/// corresponding movement row must record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedDelta {
    pub batch_id: BatchId,
    pub delta: i64,
    pub new_quantity: i64,
    pub batch_seq: u64,
}

/// In-memory batch store.
#[derive(Debug, Default)]
pub struct BatchStore {
    batches: RwLock<HashMap<BatchId, Batch>>,
}

impl BatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, batch: Batch) -> DomainResult<()> {
        let mut batches = self.write()?;
        if batches.contains_key(&batch.id) {
            return Err(DomainError::conflict(format!(
                "batch {} already exists",
                batch.id
            )));
        }
        if batch.quantity < 0 {
            return Err(DomainError::validation("batch quantity cannot be negative"));
        }
        batches.insert(batch.id, batch);
        Ok(())
    }

    pub fn get(&self, id: BatchId) -> Option<Batch> {
        self.read().ok()?.get(&id).cloned()
    }

    pub fn require(&self, id: BatchId) -> DomainResult<Batch> {
        self.get(id)
            .ok_or_else(|| DomainError::not_found(format!("batch {id}")))
    }

    pub fn list(&self) -> Vec<Batch> {
        self.read()
            .map(|b| b.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn for_product(&self, product_id: ProductId) -> Vec<Batch> {
        self.read()
            .map(|b| {
                b.values()
                    .filter(|batch| batch.product_id == product_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total on-hand quantity for a product across its batches.
    pub fn on_hand(&self, product_id: ProductId) -> i64 {
        self.for_product(product_id)
            .iter()
            .map(|b| b.quantity)
            .sum()
    }

    /// Apply a set of quantity deltas as one atomic unit.
    ///
    /// Every delta is validated against the projected quantities (multiple
    /// deltas may hit the same batch within one document) before anything is
    /// written; a would-be negative quantity anywhere fails the whole call
    /// with `InsufficientStock` and leaves no state change behind.
    ///
    /// Returns one [`AppliedDelta`] per input, in input order.
    pub fn apply_deltas(&self, deltas: &[(BatchId, i64)]) -> DomainResult<Vec<AppliedDelta>> {
        let mut batches = self.write()?;

        // Validation pass over projected quantities.
        let mut projected: HashMap<BatchId, i64> = HashMap::new();
        for (batch_id, delta) in deltas {
            let current = match projected.get(batch_id) {
                Some(q) => *q,
                None => {
                    batches
                        .get(batch_id)
                        .ok_or_else(|| DomainError::not_found(format!("batch {batch_id}")))?
                        .quantity
                }
            };
            let next = current.checked_add(*delta).ok_or_else(|| {
                DomainError::integrity(format!("quantity overflow on batch {batch_id}"))
            })?;
            if next < 0 {
                let product_id = batches
                    .get(batch_id)
                    .map(|b| b.product_id)
                    .unwrap_or_default();
                return Err(DomainError::InsufficientStock {
                    product_id,
                    batch_id: Some(*batch_id),
                    requested: delta.unsigned_abs() as i64,
                    shortfall: -next,
                });
            }
            projected.insert(*batch_id, next);
        }

        // Write pass. Infallible after validation; still behind the same lock.
        let mut applied = Vec::with_capacity(deltas.len());
        for (batch_id, delta) in deltas {
            let batch = batches
                .get_mut(batch_id)
                .ok_or_else(|| DomainError::not_found(format!("batch {batch_id}")))?;
            batch.quantity += delta;
            batch.seq += 1;
            applied.push(AppliedDelta {
                batch_id: *batch_id,
                delta: *delta,
                new_quantity: batch.quantity,
                batch_seq: batch.seq,
            });
        }
        Ok(applied)
    }

    /// Overwrite a batch quantity from a ledger recomputation.
    ///
    /// Repair path only: callable by the stock ledger, which treats the
    /// movement log as the source of truth. Returns `(old, new)`.
    pub(crate) fn rebase_quantity(
        &self,
        batch_id: BatchId,
        new_quantity: i64,
    ) -> DomainResult<(i64, i64)> {
        if new_quantity < 0 {
            return Err(DomainError::integrity(format!(
                "ledger recomputation produced negative quantity for batch {batch_id}"
            )));
        }
        let mut batches = self.write()?;
        let batch = batches
            .get_mut(&batch_id)
            .ok_or_else(|| DomainError::not_found(format!("batch {batch_id}")))?;
        let old = batch.quantity;
        batch.quantity = new_quantity;
        Ok((old, new_quantity))
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<BatchId, Batch>>, DomainError> {
        self.batches
            .read()
            .map_err(|_| DomainError::integrity("batch store lock poisoned"))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<BatchId, Batch>>, DomainError> {
        self.batches
            .write()
            .map_err(|_| DomainError::integrity("batch store lock poisoned"))
    }
}
