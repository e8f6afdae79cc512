//! Outstanding ledger: payment reconciliation and receivables aging.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use rxledger_billing::{BillDocument, BillStatus, BillStore, BillType, PaymentStatus};
use rxledger_core::{BillId, DomainError, DomainResult, Paise, PartyId};

use crate::payment::{ChequeState, Payment, PaymentStore};

/// How uncertain payments count toward a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Count cheques that have not cleared yet. Bounced cheques never count.
    pub include_pending_cheques: bool,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            include_pending_cheques: true,
        }
    }
}

/// Outcome of reconciling one bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub bill_id: BillId,
    pub outstanding_before: Paise,
    pub outstanding_after: Paise,
    pub paid_amount: Paise,
    pub payment_status: PaymentStatus,
}

impl Reconciliation {
    /// Whether reconciling actually changed the stored state.
    pub fn changed(&self) -> bool {
        self.outstanding_before != self.outstanding_after
    }
}

/// Aging bucket by days overdue past the bill's anchor date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgingBucket {
    Current,
    Days30,
    Days60,
    Days90,
    Days90Plus,
}

impl AgingBucket {
    pub fn for_days_overdue(days: i64) -> Self {
        match days {
            i64::MIN..=0 => Self::Current,
            1..=30 => Self::Days30,
            31..=60 => Self::Days60,
            61..=90 => Self::Days90,
            _ => Self::Days90Plus,
        }
    }
}

/// Outstanding amounts for one counterparty, bucketed by age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyAging {
    pub counterparty_id: PartyId,
    pub current: Paise,
    pub days30: Paise,
    pub days60: Paise,
    pub days90: Paise,
    pub days90_plus: Paise,
}

impl PartyAging {
    fn new(counterparty_id: PartyId) -> Self {
        Self {
            counterparty_id,
            current: 0,
            days30: 0,
            days60: 0,
            days90: 0,
            days90_plus: 0,
        }
    }

    fn add(&mut self, bucket: AgingBucket, amount: Paise) {
        match bucket {
            AgingBucket::Current => self.current += amount,
            AgingBucket::Days30 => self.days30 += amount,
            AgingBucket::Days60 => self.days60 += amount,
            AgingBucket::Days90 => self.days90 += amount,
            AgingBucket::Days90Plus => self.days90_plus += amount,
        }
    }

    pub fn total(&self) -> Paise {
        self.current + self.days30 + self.days60 + self.days90 + self.days90_plus
    }
}

/// Receivables aging report as of a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingReport {
    pub as_of: NaiveDate,
    pub parties: Vec<PartyAging>,
}

impl AgingReport {
    pub fn total_outstanding(&self) -> Paise {
        self.parties.iter().map(PartyAging::total).sum()
    }
}

/// Derives `paid_amount`/`payment_status` from the payment set and buckets
/// what remains by age.
pub struct OutstandingLedger {
    bills: Arc<BillStore>,
    payments: Arc<PaymentStore>,
    policy: ReconcilePolicy,
}

impl OutstandingLedger {
    pub fn new(bills: Arc<BillStore>, payments: Arc<PaymentStore>, policy: ReconcilePolicy) -> Self {
        Self {
            bills,
            payments,
            policy,
        }
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    /// How much of a payment counts toward its bill under the policy.
    fn counted_amount(&self, payment: &Payment) -> Paise {
        match payment.cheque_state {
            Some(ChequeState::Bounced) => 0,
            Some(ChequeState::Pending) if !self.policy.include_pending_cheques => 0,
            _ => payment.amount,
        }
    }

    /// Counted payment total for a bill.
    pub fn counted_paid(&self, bill_id: BillId) -> Paise {
        self.payments
            .for_bill(bill_id)
            .iter()
            .map(|p| self.counted_amount(p))
            .sum()
    }

    /// Outstanding amount per the payment set, not the bill's stored field.
    pub fn counted_outstanding(&self, bill: &BillDocument) -> DomainResult<Paise> {
        Ok(bill.totals.grand_total - self.counted_paid(bill.id))
    }

    /// Recompute and store one bill's paid state from its payments.
    ///
    /// Cancelled bills reconcile too: their payments stay on record for
    /// audit, so corrections (a deleted mis-entry, a bounced cheque) must
    /// still land in `paid_amount`. Only drafts have no payment state.
    pub fn reconcile_bill(&self, bill_id: BillId) -> DomainResult<Reconciliation> {
        let bill = self.bills.require(bill_id)?;
        if bill.status == BillStatus::Draft {
            return Err(DomainError::invalid_state(format!(
                "cannot reconcile bill {bill_id} in status Draft"
            )));
        }

        let paid = self.counted_paid(bill_id);
        let status = if paid <= 0 {
            PaymentStatus::Unpaid
        } else if paid >= bill.totals.grand_total {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        };
        self.bills.apply_reconciliation(bill_id, paid, status)?;

        let recon = Reconciliation {
            bill_id,
            outstanding_before: bill.outstanding(),
            outstanding_after: bill.totals.grand_total - paid,
            paid_amount: paid,
            payment_status: status,
        };
        debug!(
            %bill_id,
            paid,
            outstanding = recon.outstanding_after,
            status = ?status,
            "bill reconciled"
        );
        Ok(recon)
    }

    /// Sweep every non-draft bill, reconciling each. Failures on individual
    /// bills are logged and skipped; returns the reconciliations that changed
    /// stored state.
    pub fn auto_reconcile_all_bills(&self) -> Vec<Reconciliation> {
        let mut changed = Vec::new();
        for bill in self.bills.list() {
            if bill.status == BillStatus::Draft {
                continue;
            }
            match self.reconcile_bill(bill.id) {
                Ok(recon) if recon.changed() => changed.push(recon),
                Ok(_) => {}
                Err(err) => warn!(bill_id = %bill.id, error = %err, "reconcile sweep skipped bill"),
            }
        }
        changed
    }

    /// Aging report over finalized sales bills with outstanding balances,
    /// grouped by counterparty. Age is measured from the due date, falling
    /// back to the bill date.
    pub fn aging_report(&self, as_of: NaiveDate) -> AgingReport {
        let mut by_party: std::collections::HashMap<PartyId, PartyAging> =
            std::collections::HashMap::new();
        for bill in self.bills.list() {
            if bill.status != BillStatus::Finalized || bill.bill_type != BillType::Sales {
                continue;
            }
            let outstanding = bill.totals.grand_total - self.counted_paid(bill.id);
            if outstanding <= 0 {
                continue;
            }
            let days = (as_of - bill.aging_anchor()).num_days();
            by_party
                .entry(bill.counterparty_id)
                .or_insert_with(|| PartyAging::new(bill.counterparty_id))
                .add(AgingBucket::for_days_overdue(days), outstanding);
        }
        let mut parties: Vec<PartyAging> = by_party.into_values().collect();
        parties.sort_by(|a, b| b.total().cmp(&a.total()));
        AgingReport { as_of, parties }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::{NewPayment, PaymentMethod, PaymentService};
    use chrono::{Days, Utc};
    use rxledger_billing::BillTotals;
    use rxledger_core::{ActorContext, ActorId, ActorRole};
    use rxledger_events::InMemoryAuditSink;

    fn finalized_bill(party: PartyId, grand_total: Paise, due: Option<NaiveDate>) -> BillDocument {
        BillDocument {
            id: BillId::new(),
            bill_type: BillType::Sales,
            status: BillStatus::Finalized,
            counterparty_id: party,
            lines: Vec::new(),
            totals: BillTotals {
                subtotal: grand_total,
                grand_total,
                ..Default::default()
            },
            paid_amount: 0,
            payment_status: PaymentStatus::Unpaid,
            bill_date: date(2026, 8, 1),
            due_date: due,
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

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn operator() -> ActorContext {
        ActorContext::new(ActorId::new(), ActorRole::Operator)
    }

    struct Harness {
        bills: Arc<BillStore>,
        ledger: Arc<OutstandingLedger>,
        service: PaymentService,
    }

    fn harness(policy: ReconcilePolicy) -> Harness {
        let bills = Arc::new(BillStore::new());
        let payments = Arc::new(PaymentStore::new());
        let ledger = Arc::new(OutstandingLedger::new(
            Arc::clone(&bills),
            Arc::clone(&payments),
            policy,
        ));
        let service = PaymentService::new(
            payments,
            Arc::clone(&bills),
            Arc::clone(&ledger),
            Arc::new(InMemoryAuditSink::new()),
        );
        Harness {
            bills,
            ledger,
            service,
        }
    }

    fn cash(bill_id: BillId, amount: Paise) -> NewPayment {
        NewPayment {
            bill_id,
            amount,
            method: PaymentMethod::Cash,
            reference: None,
        }
    }

    #[test]
    fn partial_payment_yields_partial_status_and_outstanding() {
        let h = harness(ReconcilePolicy::default());
        let bill = finalized_bill(PartyId::new(), 100_000, None);
        let bill_id = bill.id;
        h.bills.insert(bill).unwrap();

        let (_, recon) = h
            .service
            .record_payment(&operator(), cash(bill_id, 30_000))
            .unwrap();
        assert_eq!(recon.paid_amount, 30_000);
        assert_eq!(recon.payment_status, PaymentStatus::Partial);
        assert_eq!(recon.outstanding_after, 70_000);

        let stored = h.bills.require(bill_id).unwrap();
        assert_eq!(stored.paid_amount, 30_000);
        assert_eq!(stored.outstanding(), 70_000);
    }

    #[test]
    fn exact_payment_marks_bill_paid() {
        let h = harness(ReconcilePolicy::default());
        let bill = finalized_bill(PartyId::new(), 50_000, None);
        let bill_id = bill.id;
        h.bills.insert(bill).unwrap();

        h.service
            .record_payment(&operator(), cash(bill_id, 20_000))
            .unwrap();
        let (_, recon) = h
            .service
            .record_payment(&operator(), cash(bill_id, 30_000))
            .unwrap();
        assert_eq!(recon.payment_status, PaymentStatus::Paid);
        assert_eq!(recon.outstanding_after, 0);
    }

    #[test]
    fn overpayment_is_rejected() {
        let h = harness(ReconcilePolicy::default());
        let bill = finalized_bill(PartyId::new(), 10_000, None);
        let bill_id = bill.id;
        h.bills.insert(bill).unwrap();

        let err = h
            .service
            .record_payment(&operator(), cash(bill_id, 10_001))
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn payment_against_non_finalized_bill_is_rejected() {
        let h = harness(ReconcilePolicy::default());
        let mut bill = finalized_bill(PartyId::new(), 10_000, None);
        bill.status = BillStatus::Draft;
        let bill_id = bill.id;
        h.bills.insert(bill).unwrap();

        let err = h
            .service
            .record_payment(&operator(), cash(bill_id, 1_000))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
    }

    #[test]
    fn deleting_a_payment_on_a_cancelled_bill_stays_atomic() {
        let h = harness(ReconcilePolicy::default());
        let bill = finalized_bill(PartyId::new(), 10_000, None);
        let bill_id = bill.id;
        h.bills.insert(bill).unwrap();

        let (payment, _) = h
            .service
            .record_payment(&operator(), cash(bill_id, 4_000))
            .unwrap();
        h.bills
            .update_with(bill_id, |bill| {
                bill.status = BillStatus::Cancelled;
                Ok(())
            })
            .unwrap();

        // New payments stay off the table,
        let err = h
            .service
            .record_payment(&operator(), cash(bill_id, 1_000))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");

        // but removing the mis-entry succeeds and the stored paid state
        // follows the payment set rather than going stale.
        let recon = h.service.delete_payment(&operator(), payment.id).unwrap();
        assert_eq!(recon.paid_amount, 0);
        assert_eq!(recon.payment_status, PaymentStatus::Unpaid);
        assert_eq!(h.bills.require(bill_id).unwrap().paid_amount, 0);
    }

    #[test]
    fn cheque_bounce_after_cancellation_updates_paid_amount() {
        let h = harness(ReconcilePolicy::default());
        let bill = finalized_bill(PartyId::new(), 10_000, None);
        let bill_id = bill.id;
        h.bills.insert(bill).unwrap();

        let (payment, recon) = h
            .service
            .record_payment(
                &operator(),
                NewPayment {
                    bill_id,
                    amount: 10_000,
                    method: PaymentMethod::Cheque,
                    reference: Some("CHQ-77".to_string()),
                },
            )
            .unwrap();
        assert_eq!(recon.payment_status, PaymentStatus::Paid);

        h.bills
            .update_with(bill_id, |bill| {
                bill.status = BillStatus::Cancelled;
                Ok(())
            })
            .unwrap();

        let recon = h.service.bounce_cheque(&operator(), payment.id).unwrap();
        assert_eq!(recon.paid_amount, 0);
        assert_eq!(h.bills.require(bill_id).unwrap().paid_amount, 0);
    }

    #[test]
    fn bounced_cheque_stops_counting() {
        let h = harness(ReconcilePolicy::default());
        let bill = finalized_bill(PartyId::new(), 100_000, None);
        let bill_id = bill.id;
        h.bills.insert(bill).unwrap();

        let (payment, recon) = h
            .service
            .record_payment(
                &operator(),
                NewPayment {
                    bill_id,
                    amount: 40_000,
                    method: PaymentMethod::Cheque,
                    reference: Some("CHQ-88121".to_string()),
                },
            )
            .unwrap();
        // Pending cheques count under the default policy.
        assert_eq!(recon.payment_status, PaymentStatus::Partial);
        assert_eq!(recon.outstanding_after, 60_000);

        let recon = h.service.bounce_cheque(&operator(), payment.id).unwrap();
        assert_eq!(recon.paid_amount, 0);
        assert_eq!(recon.payment_status, PaymentStatus::Unpaid);
        assert_eq!(recon.outstanding_after, 100_000);

        // A bounced cheque is resolved; it cannot clear afterwards.
        assert!(h.service.clear_cheque(&operator(), payment.id).is_err());
    }

    #[test]
    fn strict_policy_counts_cheques_only_after_clearing() {
        let h = harness(ReconcilePolicy {
            include_pending_cheques: false,
        });
        let bill = finalized_bill(PartyId::new(), 100_000, None);
        let bill_id = bill.id;
        h.bills.insert(bill).unwrap();

        let (payment, recon) = h
            .service
            .record_payment(
                &operator(),
                NewPayment {
                    bill_id,
                    amount: 40_000,
                    method: PaymentMethod::Cheque,
                    reference: None,
                },
            )
            .unwrap();
        assert_eq!(recon.paid_amount, 0);
        assert_eq!(recon.payment_status, PaymentStatus::Unpaid);

        let recon = h.service.clear_cheque(&operator(), payment.id).unwrap();
        assert_eq!(recon.paid_amount, 40_000);
        assert_eq!(recon.payment_status, PaymentStatus::Partial);
    }

    #[test]
    fn clearing_a_cash_payment_is_rejected() {
        let h = harness(ReconcilePolicy::default());
        let bill = finalized_bill(PartyId::new(), 10_000, None);
        let bill_id = bill.id;
        h.bills.insert(bill).unwrap();

        let (payment, _) = h
            .service
            .record_payment(&operator(), cash(bill_id, 1_000))
            .unwrap();
        let err = h.service.clear_cheque(&operator(), payment.id).unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
    }

    #[test]
    fn deleting_a_payment_restores_outstanding() {
        let h = harness(ReconcilePolicy::default());
        let bill = finalized_bill(PartyId::new(), 10_000, None);
        let bill_id = bill.id;
        h.bills.insert(bill).unwrap();

        let (payment, _) = h
            .service
            .record_payment(&operator(), cash(bill_id, 10_000))
            .unwrap();
        assert_eq!(
            h.bills.require(bill_id).unwrap().payment_status,
            PaymentStatus::Paid
        );

        let recon = h.service.delete_payment(&operator(), payment.id).unwrap();
        assert_eq!(recon.paid_amount, 0);
        assert_eq!(recon.payment_status, PaymentStatus::Unpaid);
    }

    #[test]
    fn auto_reconcile_repairs_tampered_paid_amount() {
        let h = harness(ReconcilePolicy::default());
        let bill = finalized_bill(PartyId::new(), 10_000, None);
        let bill_id = bill.id;
        h.bills.insert(bill).unwrap();
        h.service
            .record_payment(&operator(), cash(bill_id, 4_000))
            .unwrap();

        // Damage the stored paid state behind the ledger's back.
        h.bills
            .apply_reconciliation(bill_id, 9_999, PaymentStatus::Paid)
            .unwrap();

        let changed = h.ledger.auto_reconcile_all_bills();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].paid_amount, 4_000);
        assert_eq!(
            h.bills.require(bill_id).unwrap().payment_status,
            PaymentStatus::Partial
        );

        // Fixed point: a second sweep changes nothing.
        assert!(h.ledger.auto_reconcile_all_bills().is_empty());
    }

    #[test]
    fn aging_buckets_split_on_bucket_boundaries() {
        assert_eq!(AgingBucket::for_days_overdue(-3), AgingBucket::Current);
        assert_eq!(AgingBucket::for_days_overdue(0), AgingBucket::Current);
        assert_eq!(AgingBucket::for_days_overdue(1), AgingBucket::Days30);
        assert_eq!(AgingBucket::for_days_overdue(30), AgingBucket::Days30);
        assert_eq!(AgingBucket::for_days_overdue(31), AgingBucket::Days60);
        assert_eq!(AgingBucket::for_days_overdue(60), AgingBucket::Days60);
        assert_eq!(AgingBucket::for_days_overdue(61), AgingBucket::Days90);
        assert_eq!(AgingBucket::for_days_overdue(90), AgingBucket::Days90);
        assert_eq!(AgingBucket::for_days_overdue(91), AgingBucket::Days90Plus);
        assert_eq!(AgingBucket::for_days_overdue(400), AgingBucket::Days90Plus);
    }

    #[test]
    fn aging_report_groups_outstanding_by_party_and_age() {
        let h = harness(ReconcilePolicy::default());
        let as_of = date(2026, 8, 30);
        let party_a = PartyId::new();
        let party_b = PartyId::new();

        // Due 15 days ago, 45 days ago, 120 days ago, and not yet due.
        let overdue_15 = as_of.checked_sub_days(Days::new(15)).unwrap();
        let overdue_45 = as_of.checked_sub_days(Days::new(45)).unwrap();
        let overdue_120 = as_of.checked_sub_days(Days::new(120)).unwrap();
        let not_due = as_of.checked_add_days(Days::new(10)).unwrap();

        h.bills
            .insert(finalized_bill(party_a, 10_000, Some(overdue_15)))
            .unwrap();
        h.bills
            .insert(finalized_bill(party_a, 20_000, Some(overdue_45)))
            .unwrap();
        h.bills
            .insert(finalized_bill(party_b, 30_000, Some(overdue_120)))
            .unwrap();
        h.bills
            .insert(finalized_bill(party_b, 5_000, Some(not_due)))
            .unwrap();

        // A fully paid bill never appears.
        let paid = finalized_bill(party_a, 7_000, Some(overdue_120));
        let paid_id = paid.id;
        h.bills.insert(paid).unwrap();
        h.service
            .record_payment(&operator(), cash(paid_id, 7_000))
            .unwrap();

        let report = h.ledger.aging_report(as_of);
        assert_eq!(report.total_outstanding(), 65_000);

        let a = report
            .parties
            .iter()
            .find(|p| p.counterparty_id == party_a)
            .unwrap();
        assert_eq!((a.days30, a.days60), (10_000, 20_000));
        assert_eq!(a.total(), 30_000);

        let b = report
            .parties
            .iter()
            .find(|p| p.counterparty_id == party_b)
            .unwrap();
        assert_eq!((b.current, b.days90_plus), (5_000, 30_000));
    }

    #[test]
    fn aging_falls_back_to_bill_date_without_due_date() {
        let h = harness(ReconcilePolicy::default());
        let party = PartyId::new();
        // bill_date fixed at 2026-08-01 by the helper; 45 days later.
        h.bills.insert(finalized_bill(party, 10_000, None)).unwrap();

        let report = h.ledger.aging_report(date(2026, 9, 15));
        let entry = &report.parties[0];
        assert_eq!(entry.days60, 10_000);
    }
}
