//! Scan and repair.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use rxledger_billing::{BillStatus, BillStore};
use rxledger_catalog::CatalogService;
use rxledger_core::{ActorContext, DomainError, DomainResult};
use rxledger_events::{AuditRecord, AuditSink, audit_best_effort};
use rxledger_inventory::StockLedger;
use rxledger_receivables::{OutstandingLedger, PaymentStore};

use crate::issue::{ConsistencyIssue, IssueKind};

/// Outcome of an auto-fix sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixReport {
    pub fixed: usize,
    /// Findings with no mechanical fix, left for a human.
    pub skipped: usize,
    pub failed: usize,
}

/// Reads every store and reports invariant violations.
pub struct ConsistencyScanner {
    catalog: Arc<dyn CatalogService>,
    ledger: Arc<StockLedger>,
    bills: Arc<BillStore>,
    payments: Arc<PaymentStore>,
    outstanding: Arc<OutstandingLedger>,
    audit: Arc<dyn AuditSink>,
}

impl ConsistencyScanner {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        ledger: Arc<StockLedger>,
        bills: Arc<BillStore>,
        payments: Arc<PaymentStore>,
        outstanding: Arc<OutstandingLedger>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            bills,
            payments,
            outstanding,
            audit,
        }
    }

    /// Full scan across batches, the movement log, payments and bills.
    /// Read-only; never mutates anything.
    pub fn scan(&self) -> Vec<ConsistencyIssue> {
        let mut issues = Vec::new();

        for batch in self.ledger.batch_store().list() {
            if self.catalog.product(batch.product_id).is_none() {
                issues.push(ConsistencyIssue::new(IssueKind::OrphanBatch {
                    batch_id: batch.id,
                    product_id: batch.product_id,
                }));
            }

            let from_ledger = self.ledger.ledger_quantity(batch.id);
            if from_ledger != batch.quantity {
                issues.push(ConsistencyIssue::new(IssueKind::StockMismatch {
                    product_id: batch.product_id,
                    batch_id: batch.id,
                    expected: from_ledger,
                    actual: batch.quantity,
                }));
            }

            // Replay the batch's rows in applied order; every recorded balance
            // must equal the running sum at that point.
            let mut running = 0i64;
            for row in self.ledger.movements_for_batch(batch.id) {
                running += row.delta;
                if row.balance_after != running {
                    issues.push(ConsistencyIssue::new(IssueKind::LedgerInconsistency {
                        batch_id: batch.id,
                        batch_seq: row.batch_seq,
                        expected_balance: running,
                        actual_balance: row.balance_after,
                    }));
                    // Later rows inherit the same discrepancy; one finding
                    // per batch is enough to flag the log.
                    break;
                }
            }
        }

        for payment in self.payments.list() {
            if self.bills.get(payment.bill_id).is_none() {
                issues.push(ConsistencyIssue::new(IssueKind::OrphanPayment {
                    payment_id: payment.id,
                    bill_id: payment.bill_id,
                }));
            }
        }

        // Drafts carry no payment state; finalized and cancelled bills both
        // keep a live `paid_amount`.
        for bill in self.bills.list() {
            if bill.status == BillStatus::Draft {
                continue;
            }
            let counted = self.outstanding.counted_paid(bill.id);
            if counted != bill.paid_amount {
                issues.push(ConsistencyIssue::new(IssueKind::PaymentMismatch {
                    bill_id: bill.id,
                    expected: counted,
                    actual: bill.paid_amount,
                }));
            }
        }

        issues
    }

    /// Repair one finding. Idempotent: re-fixing an already-consistent target
    /// is a no-op. Findings without a mechanical fix are rejected.
    pub fn fix_issue(&self, actor: &ActorContext, issue: &ConsistencyIssue) -> DomainResult<()> {
        match &issue.kind {
            IssueKind::StockMismatch { batch_id, .. } => {
                let corrected = self.ledger.rebase_batch_quantity(*batch_id)?;
                audit_best_effort(
                    self.audit.as_ref(),
                    AuditRecord::new(
                        "batch",
                        batch_id,
                        "consistency_fix",
                        actor.actor_id(),
                        json!({ "issue": issue.kind, "corrected": corrected }),
                    ),
                );
                Ok(())
            }
            IssueKind::PaymentMismatch { bill_id, .. } => {
                let recon = self.outstanding.reconcile_bill(*bill_id)?;
                audit_best_effort(
                    self.audit.as_ref(),
                    AuditRecord::new(
                        "bill",
                        bill_id,
                        "consistency_fix",
                        actor.actor_id(),
                        json!({ "issue": issue.kind, "paid_amount": recon.paid_amount }),
                    ),
                );
                Ok(())
            }
            kind => Err(DomainError::invalid_state(format!(
                "issue {kind:?} has no automatic fix"
            ))),
        }
    }

    /// Scan, then repair every auto-fixable finding. Individual fix failures
    /// are logged and counted, never abort the sweep.
    pub fn auto_fix_all_issues(&self, actor: &ActorContext) -> FixReport {
        let mut report = FixReport::default();
        for issue in self.scan() {
            if !issue.auto_fixable {
                report.skipped += 1;
                continue;
            }
            match self.fix_issue(actor, &issue) {
                Ok(()) => report.fixed += 1,
                Err(err) => {
                    warn!(issue = ?issue.kind, error = %err, "consistency fix failed");
                    report.failed += 1;
                }
            }
        }
        info!(
            fixed = report.fixed,
            skipped = report.skipped,
            failed = report.failed,
            "consistency sweep finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rxledger_billing::{
        BillDocument, BillTotals, BillType, PaymentStatus,
    };
    use rxledger_catalog::{InMemoryCatalog, Product};
    use rxledger_core::{
        ActorId, ActorRole, BatchId, BillId, PartyId, PaymentId, Percent, ProductId,
    };
    use rxledger_events::InMemoryAuditSink;
    use rxledger_inventory::{
        Batch, BatchPricing, BatchStore, MovementKind, MovementRef, Posting,
    };
    use rxledger_receivables::{
        ChequeState, NewPayment, Payment, PaymentMethod, PaymentService, ReconcilePolicy,
    };

    struct Harness {
        catalog: Arc<InMemoryCatalog>,
        ledger: Arc<StockLedger>,
        bills: Arc<BillStore>,
        payments: Arc<PaymentStore>,
        service: PaymentService,
        scanner: ConsistencyScanner,
    }

    fn harness() -> Harness {
        let catalog = Arc::new(InMemoryCatalog::new());
        let ledger = Arc::new(StockLedger::new(Arc::new(BatchStore::new())));
        let bills = Arc::new(BillStore::new());
        let payments = Arc::new(PaymentStore::new());
        let outstanding = Arc::new(OutstandingLedger::new(
            Arc::clone(&bills),
            Arc::clone(&payments),
            ReconcilePolicy::default(),
        ));
        let audit = Arc::new(InMemoryAuditSink::new());
        let service = PaymentService::new(
            Arc::clone(&payments),
            Arc::clone(&bills),
            Arc::clone(&outstanding),
            Arc::clone(&audit) as Arc<dyn AuditSink>,
        );
        let scanner = ConsistencyScanner::new(
            Arc::clone(&catalog) as Arc<dyn CatalogService>,
            Arc::clone(&ledger),
            Arc::clone(&bills),
            Arc::clone(&payments),
            outstanding,
            audit as Arc<dyn AuditSink>,
        );
        Harness {
            catalog,
            ledger,
            bills,
            payments,
            service,
            scanner,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn operator() -> ActorContext {
        ActorContext::new(ActorId::new(), ActorRole::Operator)
    }

    fn product(h: &Harness) -> ProductId {
        let p = Product {
            id: ProductId::new(),
            name: "Cetirizine 10mg".to_string(),
            gst_rate: Percent::from_percent(12),
            strip_size: 10,
            min_stock: 0,
            max_stock: 1_000,
            unit: "tab".to_string(),
        };
        let id = p.id;
        h.catalog.upsert(p);
        id
    }

    fn stocked_batch(h: &Harness, product: ProductId, qty: i64) -> BatchId {
        let batch = Batch::new(
            BatchId::new(),
            product,
            "LOT-9",
            date(2028, 1, 1),
            0,
            BatchPricing {
                mrp: 900,
                trade_price: 600,
                tax_inclusive: false,
            },
        )
        .unwrap();
        let id = batch.id;
        h.ledger.batch_store().insert(batch).unwrap();
        h.ledger
            .post_movement(
                Posting {
                    product_id: product,
                    batch_id: id,
                    kind: MovementKind::PurchaseIn,
                    delta: qty,
                    godown: None,
                },
                MovementRef::Manual("grn".into()),
            )
            .unwrap();
        id
    }

    fn finalized_bill(grand_total: i64) -> BillDocument {
        BillDocument {
            id: BillId::new(),
            bill_type: BillType::Sales,
            status: BillStatus::Finalized,
            counterparty_id: PartyId::new(),
            lines: Vec::new(),
            totals: BillTotals {
                subtotal: grand_total,
                grand_total,
                ..Default::default()
            },
            paid_amount: 0,
            payment_status: PaymentStatus::Unpaid,
            bill_date: date(2026, 8, 1),
            due_date: None,
            template: None,
            created_at: Utc::now(),
            created_by: ActorId::new(),
            finalized_at: Some(Utc::now()),
            finalized_by: None,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
        }
    }

    #[test]
    fn clean_system_scans_empty() {
        let h = harness();
        let p = product(&h);
        let b = stocked_batch(&h, p, 10);
        h.ledger
            .post_movement(
                Posting {
                    product_id: p,
                    batch_id: b,
                    kind: MovementKind::SaleOut,
                    delta: -3,
                    godown: None,
                },
                MovementRef::Manual("s".into()),
            )
            .unwrap();

        let bill = finalized_bill(10_000);
        let bill_id = bill.id;
        h.bills.insert(bill).unwrap();
        h.service
            .record_payment(
                &operator(),
                NewPayment {
                    bill_id,
                    amount: 4_000,
                    method: PaymentMethod::Cash,
                    reference: None,
                },
            )
            .unwrap();

        assert!(h.scanner.scan().is_empty());
    }

    #[test]
    fn stock_drift_is_found_and_rebased() {
        let h = harness();
        let p = product(&h);
        let b = stocked_batch(&h, p, 10);

        // Quantity change that bypassed the movement log.
        h.ledger.batch_store().apply_deltas(&[(b, -2)]).unwrap();

        let issues = h.scanner.scan();
        assert_eq!(issues.len(), 1);
        match &issues[0].kind {
            IssueKind::StockMismatch {
                expected, actual, ..
            } => assert_eq!((*expected, *actual), (10, 8)),
            other => panic!("expected StockMismatch, got {other:?}"),
        }

        let report = h.scanner.auto_fix_all_issues(&operator());
        assert_eq!(report, FixReport { fixed: 1, skipped: 0, failed: 0 });
        assert_eq!(h.ledger.batch_store().get(b).unwrap().quantity, 10);

        // Fixed point: rescanning finds nothing.
        assert!(h.scanner.scan().is_empty());
    }

    #[test]
    fn damaged_movement_log_is_critical_and_not_auto_fixed() {
        let h = harness();
        let p = product(&h);
        let b = stocked_batch(&h, p, 10);

        // An unlogged decrement followed by a logged one leaves the logged
        // row's balance out of step with the running sum.
        h.ledger.batch_store().apply_deltas(&[(b, -2)]).unwrap();
        h.ledger
            .post_movement(
                Posting {
                    product_id: p,
                    batch_id: b,
                    kind: MovementKind::SaleOut,
                    delta: -3,
                    godown: None,
                },
                MovementRef::Manual("s".into()),
            )
            .unwrap();

        let issues = h.scanner.scan();
        let ledger_issue = issues
            .iter()
            .find(|i| matches!(i.kind, IssueKind::LedgerInconsistency { .. }))
            .unwrap();
        assert_eq!(ledger_issue.severity, crate::Severity::Critical);
        assert!(!ledger_issue.auto_fixable);
        assert!(h.scanner.fix_issue(&operator(), ledger_issue).is_err());

        // The stock mismatch alongside it is fixed; the damaged log remains.
        let report = h.scanner.auto_fix_all_issues(&operator());
        assert_eq!(report.fixed, 1);
        assert_eq!(report.skipped, 1);
        assert!(
            h.scanner
                .scan()
                .iter()
                .all(|i| matches!(i.kind, IssueKind::LedgerInconsistency { .. }))
        );
    }

    #[test]
    fn payment_mismatch_is_found_and_reconciled() {
        let h = harness();
        let bill = finalized_bill(10_000);
        let bill_id = bill.id;
        h.bills.insert(bill).unwrap();
        h.service
            .record_payment(
                &operator(),
                NewPayment {
                    bill_id,
                    amount: 4_000,
                    method: PaymentMethod::Cash,
                    reference: None,
                },
            )
            .unwrap();

        // Tamper with the stored paid state.
        h.bills
            .apply_reconciliation(bill_id, 9_000, PaymentStatus::Paid)
            .unwrap();

        let issues = h.scanner.scan();
        assert_eq!(issues.len(), 1);
        match &issues[0].kind {
            IssueKind::PaymentMismatch {
                expected, actual, ..
            } => assert_eq!((*expected, *actual), (4_000, 9_000)),
            other => panic!("expected PaymentMismatch, got {other:?}"),
        }

        let report = h.scanner.auto_fix_all_issues(&operator());
        assert_eq!(report.fixed, 1);
        let stored = h.bills.require(bill_id).unwrap();
        assert_eq!(stored.paid_amount, 4_000);
        assert_eq!(stored.payment_status, PaymentStatus::Partial);
        assert!(h.scanner.scan().is_empty());
    }

    #[test]
    fn orphan_batch_and_payment_are_warnings_without_a_fix() {
        let h = harness();
        let p = product(&h);
        stocked_batch(&h, p, 5);
        h.catalog.remove(p);

        h.payments
            .insert(Payment {
                id: PaymentId::new(),
                bill_id: BillId::new(),
                amount: 1_000,
                method: PaymentMethod::Cheque,
                cheque_state: Some(ChequeState::Pending),
                reference: None,
                received_at: Utc::now(),
                recorded_by: ActorId::new(),
            })
            .unwrap();

        let issues = h.scanner.scan();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.severity == crate::Severity::Warning));
        assert!(issues.iter().all(|i| !i.auto_fixable));

        let report = h.scanner.auto_fix_all_issues(&operator());
        assert_eq!(report, FixReport { fixed: 0, skipped: 2, failed: 0 });
    }
}
