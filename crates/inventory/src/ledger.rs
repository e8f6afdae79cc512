//! Append-only stock ledger + batch allocator.
//!
//! Single choke point for batch-quantity changes. Lock order is always
//! `movements` (outer) then the batch store (inner); holding the movement log
//! across the store mutation makes "write new quantity + append movement row"
//! indivisible with respect to concurrent postings.

use std::sync::{Arc, RwLock};

use chrono::{Days, NaiveDate, Utc};
use tracing::{debug, warn};

use rxledger_catalog::CatalogService;
use rxledger_core::{BatchId, DomainError, DomainResult, MovementId, ProductId};
use rxledger_events::{NotificationSink, StockAlert, notify_best_effort};

use crate::movement::{MovementKind, MovementRef, StockMovement};
use crate::store::BatchStore;

/// One intended quantity change, before it is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub product_id: ProductId,
    pub batch_id: BatchId,
    pub kind: MovementKind,
    pub delta: i64,
    pub godown: Option<String>,
}

/// Batch selection strategy when the caller did not pin a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationStrategy {
    /// First-expiry-first-out; ties broken by batch id ascending.
    Fefo {
        /// Allow consuming already-expired batches (explicit opt-in).
        permit_expired: bool,
    },
}

impl Default for AllocationStrategy {
    fn default() -> Self {
        Self::Fefo {
            permit_expired: false,
        }
    }
}

/// Append-only movement log over a shared [`BatchStore`].
#[derive(Debug)]
pub struct StockLedger {
    store: Arc<BatchStore>,
    movements: RwLock<Vec<StockMovement>>,
}

impl StockLedger {
    pub fn new(store: Arc<BatchStore>) -> Self {
        Self {
            store,
            movements: RwLock::new(Vec::new()),
        }
    }

    pub fn batch_store(&self) -> &Arc<BatchStore> {
        &self.store
    }

    /// Post a single movement: validate signedness, apply the delta and append
    /// the row carrying the resulting balance, all in one atomic unit.
    pub fn post_movement(
        &self,
        posting: Posting,
        reference: MovementRef,
    ) -> DomainResult<StockMovement> {
        let mut rows = self.post_movements(vec![posting], reference)?;
        // post_movements returns exactly one row per posting.
        rows.pop()
            .ok_or_else(|| DomainError::integrity("posting produced no movement row"))
    }

    /// Post a set of movements for one document as an all-or-nothing unit.
    ///
    /// Used by bill finalization: if any line's delta cannot be applied, no
    /// posting for the document is committed.
    pub fn post_movements(
        &self,
        postings: Vec<Posting>,
        reference: MovementRef,
    ) -> DomainResult<Vec<StockMovement>> {
        if postings.is_empty() {
            return Ok(Vec::new());
        }
        for p in &postings {
            p.kind.validate_delta(p.delta)?;
        }

        let mut log = self.write_log()?;
        let deltas: Vec<(BatchId, i64)> = postings.iter().map(|p| (p.batch_id, p.delta)).collect();
        let applied = self.store.apply_deltas(&deltas)?;

        let now = Utc::now();
        let mut rows = Vec::with_capacity(postings.len());
        for (posting, outcome) in postings.into_iter().zip(applied) {
            let row = StockMovement {
                id: MovementId::new(),
                product_id: posting.product_id,
                batch_id: posting.batch_id,
                godown: posting.godown,
                kind: posting.kind,
                delta: posting.delta,
                balance_after: outcome.new_quantity,
                reference: reference.clone(),
                is_reversal: false,
                batch_seq: outcome.batch_seq,
                occurred_at: now,
            };
            debug!(
                batch_id = %row.batch_id,
                delta = row.delta,
                balance = row.balance_after,
                reference = %row.reference,
                "posted stock movement"
            );
            log.push(row.clone());
            rows.push(row);
        }
        Ok(rows)
    }

    /// Select batches to satisfy `requested` base units of a product.
    ///
    /// Returns `(batch, quantity_taken)` pairs summing exactly to the request,
    /// or `InsufficientStock` naming the shortfall. Never a silent partial.
    /// The result is a plan: the commit re-validates atomically, so a stale
    /// plan fails cleanly instead of driving quantities negative.
    pub fn allocate_for_sale(
        &self,
        product_id: ProductId,
        requested: i64,
        strategy: AllocationStrategy,
        today: NaiveDate,
    ) -> DomainResult<Vec<(BatchId, i64)>> {
        if requested <= 0 {
            return Err(DomainError::validation("requested quantity must be positive"));
        }

        let AllocationStrategy::Fefo { permit_expired } = strategy;
        let mut candidates: Vec<_> = self
            .store
            .for_product(product_id)
            .into_iter()
            .filter(|b| b.has_stock())
            .filter(|b| permit_expired || !b.is_expired(today))
            .collect();
        candidates.sort_by(|a, b| a.expiry.cmp(&b.expiry).then(a.id.cmp(&b.id)));

        let mut plan = Vec::new();
        let mut remaining = requested;
        for batch in candidates {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(batch.quantity);
            plan.push((batch.id, take));
            remaining -= take;
        }

        if remaining > 0 {
            return Err(DomainError::InsufficientStock {
                product_id,
                batch_id: None,
                requested,
                shortfall: remaining,
            });
        }
        Ok(plan)
    }

    /// Post compensating movements for every movement tied to `reference`.
    ///
    /// Idempotent: if a reversal for this reference already exists the call is
    /// a no-op and returns the empty set, never a double reversal.
    pub fn reverse_movements_for_reference(
        &self,
        reference: &MovementRef,
    ) -> DomainResult<Vec<StockMovement>> {
        let mut log = self.write_log()?;

        let mut originals = Vec::new();
        for row in log.iter() {
            if row.reference != *reference {
                continue;
            }
            if row.is_reversal {
                debug!(%reference, "reference already reversed; skipping");
                return Ok(Vec::new());
            }
            originals.push(row.clone());
        }
        if originals.is_empty() {
            return Ok(Vec::new());
        }

        let deltas: Vec<(BatchId, i64)> =
            originals.iter().map(|m| (m.batch_id, -m.delta)).collect();
        let applied = self.store.apply_deltas(&deltas)?;

        let now = Utc::now();
        let mut rows = Vec::with_capacity(originals.len());
        for (original, outcome) in originals.into_iter().zip(applied) {
            let row = StockMovement {
                id: MovementId::new(),
                product_id: original.product_id,
                batch_id: original.batch_id,
                godown: original.godown,
                kind: original.kind,
                delta: -original.delta,
                balance_after: outcome.new_quantity,
                reference: reference.clone(),
                is_reversal: true,
                batch_seq: outcome.batch_seq,
                occurred_at: now,
            };
            log.push(row.clone());
            rows.push(row);
        }
        Ok(rows)
    }

    /// Movements for one batch, in applied order.
    pub fn movements_for_batch(&self, batch_id: BatchId) -> Vec<StockMovement> {
        let mut rows: Vec<_> = self
            .read_log()
            .iter()
            .filter(|m| m.batch_id == batch_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.batch_seq);
        rows
    }

    pub fn movements_for_reference(&self, reference: &MovementRef) -> Vec<StockMovement> {
        self.read_log()
            .iter()
            .filter(|m| m.reference == *reference)
            .cloned()
            .collect()
    }

    pub fn movements_for_product(&self, product_id: ProductId) -> Vec<StockMovement> {
        self.read_log()
            .iter()
            .filter(|m| m.product_id == product_id)
            .cloned()
            .collect()
    }

    pub fn all_movements(&self) -> Vec<StockMovement> {
        self.read_log().clone()
    }

    /// Net quantity for a batch according to the movement log alone.
    pub fn ledger_quantity(&self, batch_id: BatchId) -> i64 {
        self.read_log()
            .iter()
            .filter(|m| m.batch_id == batch_id)
            .map(|m| m.delta)
            .sum()
    }

    /// Repair hook: recompute a batch quantity from the movement log (the
    /// source of truth) and write it. Returns `Some((old, new))` when a drift
    /// was corrected, `None` when the batch was already consistent.
    pub fn rebase_batch_quantity(&self, batch_id: BatchId) -> DomainResult<Option<(i64, i64)>> {
        let _log = self.write_log()?; // exclude concurrent postings
        let from_ledger: i64 = _log
            .iter()
            .filter(|m| m.batch_id == batch_id)
            .map(|m| m.delta)
            .sum();
        let current = self.store.require(batch_id)?.quantity;
        if current == from_ledger {
            return Ok(None);
        }
        warn!(%batch_id, current, from_ledger, "rebasing drifted batch quantity");
        let (old, new) = self.store.rebase_quantity(batch_id, from_ledger)?;
        Ok(Some((old, new)))
    }

    /// Emit low-stock and near-expiry alerts for the given products.
    ///
    /// Fire-and-forget: runs after postings have committed; sink failures are
    /// logged and dropped.
    pub fn check_alerts(
        &self,
        catalog: &dyn CatalogService,
        sink: &dyn NotificationSink,
        product_ids: &[ProductId],
        today: NaiveDate,
        expiry_horizon_days: u64,
    ) {
        let horizon = today
            .checked_add_days(Days::new(expiry_horizon_days))
            .unwrap_or(today);
        for product_id in product_ids {
            let Some(product) = catalog.product(*product_id) else {
                continue;
            };
            let on_hand = self.store.on_hand(*product_id);
            if on_hand <= product.min_stock {
                notify_best_effort(
                    sink,
                    StockAlert::LowStock {
                        product_id: *product_id,
                        on_hand,
                        min_stock: product.min_stock,
                    },
                );
            }
            for batch in self.store.for_product(*product_id) {
                if batch.has_stock() && batch.expiry <= horizon {
                    notify_best_effort(
                        sink,
                        StockAlert::ExpiryApproaching {
                            product_id: *product_id,
                            batch_id: batch.id,
                            expiry: batch.expiry,
                            quantity: batch.quantity,
                        },
                    );
                }
            }
        }
    }

    fn read_log(&self) -> std::sync::RwLockReadGuard<'_, Vec<StockMovement>> {
        // Lock poisoning only happens after a panic mid-posting; the log is
        // still readable and the poisoned flag carries no torn row.
        match self.movements.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_log(
        &self,
    ) -> DomainResult<std::sync::RwLockWriteGuard<'_, Vec<StockMovement>>> {
        self.movements
            .write()
            .map_err(|_| DomainError::integrity("movement log lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Batch, BatchPricing};
    use proptest::prelude::*;
    use rxledger_core::BillId;
    use std::sync::Barrier;
    use std::thread;

    fn pricing() -> BatchPricing {
        BatchPricing {
            mrp: 1_000,
            trade_price: 700,
            tax_inclusive: false,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ledger_with_batches(batches: Vec<Batch>) -> StockLedger {
        let store = Arc::new(BatchStore::new());
        for b in batches {
            store.insert(b).unwrap();
        }
        StockLedger::new(store)
    }

    fn batch(product: ProductId, expiry: NaiveDate, qty: i64) -> Batch {
        Batch::new(BatchId::new(), product, "B", expiry, qty, pricing()).unwrap()
    }

    fn sale(product: ProductId, batch_id: BatchId, qty: i64) -> Posting {
        Posting {
            product_id: product,
            batch_id,
            kind: MovementKind::SaleOut,
            delta: -qty,
            godown: None,
        }
    }

    #[test]
    fn movement_balance_matches_batch_quantity() {
        let product = ProductId::new();
        let b = batch(product, date(2027, 1, 1), 10);
        let b_id = b.id;
        let ledger = ledger_with_batches(vec![b]);

        let row = ledger
            .post_movement(sale(product, b_id, 4), MovementRef::Manual("t".into()))
            .unwrap();
        assert_eq!(row.balance_after, 6);
        assert_eq!(ledger.batch_store().get(b_id).unwrap().quantity, 6);
        assert_eq!(ledger.ledger_quantity(b_id), -4);
    }

    #[test]
    fn failed_decrement_leaves_no_movement_row() {
        let product = ProductId::new();
        let b = batch(product, date(2027, 1, 1), 3);
        let b_id = b.id;
        let ledger = ledger_with_batches(vec![b]);

        let err = ledger
            .post_movement(sale(product, b_id, 5), MovementRef::Manual("t".into()))
            .unwrap_err();
        assert_eq!(err.kind(), "insufficient_stock");
        assert_eq!(ledger.batch_store().get(b_id).unwrap().quantity, 3);
        assert!(ledger.movements_for_batch(b_id).is_empty());
    }

    #[test]
    fn fefo_allocates_earliest_expiry_first() {
        let product = ProductId::new();
        let b1 = batch(product, date(2025, 1, 1), 5);
        let b2 = batch(product, date(2025, 6, 1), 5);
        let (b1_id, b2_id) = (b1.id, b2.id);
        let ledger = ledger_with_batches(vec![b2, b1]);

        let plan = ledger
            .allocate_for_sale(product, 7, AllocationStrategy::default(), date(2024, 6, 1))
            .unwrap();
        assert_eq!(plan, vec![(b1_id, 5), (b2_id, 2)]);
    }

    #[test]
    fn fefo_ties_break_by_batch_id_ascending() {
        let product = ProductId::new();
        let expiry = date(2027, 3, 1);
        let b1 = batch(product, expiry, 5);
        let b2 = batch(product, expiry, 5);
        let mut ids = [b1.id, b2.id];
        ids.sort();
        let ledger = ledger_with_batches(vec![b1, b2]);

        let plan = ledger
            .allocate_for_sale(product, 8, AllocationStrategy::default(), date(2026, 1, 1))
            .unwrap();
        assert_eq!(plan, vec![(ids[0], 5), (ids[1], 3)]);
    }

    #[test]
    fn expired_batches_excluded_unless_permitted() {
        let product = ProductId::new();
        let expired = batch(product, date(2025, 1, 1), 5);
        let fresh = batch(product, date(2027, 1, 1), 5);
        let fresh_id = fresh.id;
        let expired_id = expired.id;
        let ledger = ledger_with_batches(vec![expired, fresh]);
        let today = date(2026, 8, 30);

        let plan = ledger
            .allocate_for_sale(product, 5, AllocationStrategy::default(), today)
            .unwrap();
        assert_eq!(plan, vec![(fresh_id, 5)]);

        let plan = ledger
            .allocate_for_sale(
                product,
                8,
                AllocationStrategy::Fefo {
                    permit_expired: true,
                },
                today,
            )
            .unwrap();
        assert_eq!(plan, vec![(expired_id, 5), (fresh_id, 3)]);
    }

    #[test]
    fn shortfall_is_named_and_nothing_partial_returned() {
        let product = ProductId::new();
        let b = batch(product, date(2027, 1, 1), 4);
        let ledger = ledger_with_batches(vec![b]);

        let err = ledger
            .allocate_for_sale(product, 10, AllocationStrategy::default(), date(2026, 1, 1))
            .unwrap_err();
        match err {
            DomainError::InsufficientStock {
                requested,
                shortfall,
                ..
            } => {
                assert_eq!(requested, 10);
                assert_eq!(shortfall, 6);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn reversal_is_idempotent() {
        let product = ProductId::new();
        let b = batch(product, date(2027, 1, 1), 10);
        let b_id = b.id;
        let ledger = ledger_with_batches(vec![b]);
        let reference = MovementRef::Bill(BillId::new());

        ledger
            .post_movement(sale(product, b_id, 6), reference.clone())
            .unwrap();
        assert_eq!(ledger.batch_store().get(b_id).unwrap().quantity, 4);

        let first = ledger.reverse_movements_for_reference(&reference).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(ledger.batch_store().get(b_id).unwrap().quantity, 10);

        let second = ledger.reverse_movements_for_reference(&reference).unwrap();
        assert!(second.is_empty());
        assert_eq!(ledger.batch_store().get(b_id).unwrap().quantity, 10);
    }

    #[test]
    fn concurrent_sales_cannot_oversell() {
        let product = ProductId::new();
        let b = batch(product, date(2027, 1, 1), 10);
        let b_id = b.id;
        let ledger = Arc::new(ledger_with_batches(vec![b]));

        let barrier = Arc::new(Barrier::new(2));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                ledger.post_movement(
                    Posting {
                        product_id: product,
                        batch_id: b_id,
                        kind: MovementKind::SaleOut,
                        delta: -6,
                        godown: None,
                    },
                    MovementRef::Manual("race".into()),
                )
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let short = results
            .iter()
            .filter(|r| matches!(r, Err(DomainError::InsufficientStock { .. })))
            .count();
        assert_eq!((ok, short), (1, 1));
        assert_eq!(ledger.batch_store().get(b_id).unwrap().quantity, 4);
    }

    #[test]
    fn rebase_corrects_drift_and_is_a_noop_when_consistent() {
        let product = ProductId::new();
        let b = batch(product, date(2027, 1, 1), 0);
        let b_id = b.id;
        let ledger = ledger_with_batches(vec![b]);
        ledger
            .post_movement(
                Posting {
                    product_id: product,
                    batch_id: b_id,
                    kind: MovementKind::PurchaseIn,
                    delta: 10,
                    godown: None,
                },
                MovementRef::Manual("grn".into()),
            )
            .unwrap();
        ledger
            .post_movement(sale(product, b_id, 4), MovementRef::Manual("t".into()))
            .unwrap();

        // Consistent: no-op.
        assert_eq!(ledger.rebase_batch_quantity(b_id).unwrap(), None);

        // Inject drift behind the ledger's back (simulating external damage).
        ledger.batch_store().rebase_quantity(b_id, 9).unwrap();
        assert_eq!(ledger.rebase_batch_quantity(b_id).unwrap(), Some((9, 6)));
        assert_eq!(ledger.batch_store().get(b_id).unwrap().quantity, 6);
    }

    proptest! {
        /// Ledger-balance invariant: after any sequence of inbound/outbound
        /// postings, the batch quantity equals the movement-delta sum and
        /// every recorded balance equals the running sum up to that row.
        #[test]
        fn ledger_balance_invariant(deltas in proptest::collection::vec(-20i64..=20, 1..40)) {
            let product = ProductId::new();
            let b = batch(product, date(2027, 1, 1), 0);
            let b_id = b.id;
            let ledger = ledger_with_batches(vec![b]);

            for d in deltas {
                if d == 0 {
                    continue;
                }
                let posting = Posting {
                    product_id: product,
                    batch_id: b_id,
                    kind: MovementKind::Adjustment,
                    delta: d,
                    godown: None,
                };
                // Outbound beyond stock is expected to fail; state must be unchanged.
                let _ = ledger.post_movement(posting, MovementRef::Manual("prop".into()));
            }

            let quantity = ledger.batch_store().get(b_id).unwrap().quantity;
            prop_assert!(quantity >= 0);
            prop_assert_eq!(quantity, ledger.ledger_quantity(b_id));

            let mut running = 0i64;
            for row in ledger.movements_for_batch(b_id) {
                running += row.delta;
                prop_assert_eq!(row.balance_after, running);
            }
        }
    }
}
