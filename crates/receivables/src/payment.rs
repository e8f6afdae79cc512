//! Payment records and the payment lifecycle service.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use rxledger_billing::{BillStatus, BillStore};
use rxledger_core::{ActorContext, ActorId, BillId, DomainError, DomainResult, Paise, PaymentId};
use rxledger_events::{AuditRecord, AuditSink, audit_best_effort};

use crate::ledger::{OutstandingLedger, Reconciliation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Upi,
    Card,
    BankTransfer,
    Cheque,
}

/// Lifecycle of a cheque payment. Non-cheque payments carry no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChequeState {
    Pending,
    Cleared,
    Bounced,
}

impl ChequeState {
    /// Legal transitions: `Pending` resolves exactly once, to `Cleared` or
    /// `Bounced`; resolved cheques never change again.
    pub fn transition(self, to: ChequeState) -> DomainResult<ChequeState> {
        match (self, to) {
            (Self::Pending, Self::Cleared) | (Self::Pending, Self::Bounced) => Ok(to),
            _ => Err(DomainError::invalid_state(format!(
                "cheque cannot go from {self:?} to {to:?}"
            ))),
        }
    }
}

/// One payment against a bill. Immutable except for cheque resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub bill_id: BillId,
    pub amount: Paise,
    pub method: PaymentMethod,
    /// `Some` iff `method == Cheque`.
    pub cheque_state: Option<ChequeState>,
    /// Instrument/transaction reference as entered.
    pub reference: Option<String>,
    pub received_at: DateTime<Utc>,
    pub recorded_by: ActorId,
}

/// Fields supplied when recording a payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub bill_id: BillId,
    pub amount: Paise,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

#[derive(Debug, Default)]
pub struct PaymentStore {
    payments: RwLock<HashMap<PaymentId, Payment>>,
}

impl PaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, payment: Payment) -> DomainResult<()> {
        let mut payments = self.write()?;
        if payments.contains_key(&payment.id) {
            return Err(DomainError::conflict(format!(
                "payment {} already exists",
                payment.id
            )));
        }
        payments.insert(payment.id, payment);
        Ok(())
    }

    pub fn get(&self, id: PaymentId) -> Option<Payment> {
        self.read().ok()?.get(&id).cloned()
    }

    pub fn require(&self, id: PaymentId) -> DomainResult<Payment> {
        self.get(id)
            .ok_or_else(|| DomainError::not_found(format!("payment {id}")))
    }

    pub fn remove(&self, id: PaymentId) -> DomainResult<Payment> {
        self.write()?
            .remove(&id)
            .ok_or_else(|| DomainError::not_found(format!("payment {id}")))
    }

    pub fn for_bill(&self, bill_id: BillId) -> Vec<Payment> {
        self.read()
            .map(|p| {
                let mut rows: Vec<_> = p
                    .values()
                    .filter(|p| p.bill_id == bill_id)
                    .cloned()
                    .collect();
                rows.sort_by_key(|p| p.received_at);
                rows
            })
            .unwrap_or_default()
    }

    pub fn list(&self) -> Vec<Payment> {
        self.read()
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn update_cheque_state(
        &self,
        id: PaymentId,
        to: ChequeState,
    ) -> DomainResult<Payment> {
        let mut payments = self.write()?;
        let payment = payments
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("payment {id}")))?;
        let current = payment.cheque_state.ok_or_else(|| {
            DomainError::invalid_state(format!("payment {id} is not a cheque"))
        })?;
        payment.cheque_state = Some(current.transition(to)?);
        Ok(payment.clone())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<PaymentId, Payment>>, DomainError>
    {
        self.payments
            .read()
            .map_err(|_| DomainError::integrity("payment store lock poisoned"))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<PaymentId, Payment>>, DomainError> {
        self.payments
            .write()
            .map_err(|_| DomainError::integrity("payment store lock poisoned"))
    }
}

/// Payment lifecycle operations. Every mutation ends by reconciling the bill
/// so the stored `paid_amount`/`payment_status` never lag the payment set.
pub struct PaymentService {
    payments: Arc<PaymentStore>,
    bills: Arc<BillStore>,
    ledger: Arc<OutstandingLedger>,
    audit: Arc<dyn AuditSink>,
}

impl PaymentService {
    pub fn new(
        payments: Arc<PaymentStore>,
        bills: Arc<BillStore>,
        ledger: Arc<OutstandingLedger>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            payments,
            bills,
            ledger,
            audit,
        }
    }

    pub fn payment_store(&self) -> &Arc<PaymentStore> {
        &self.payments
    }

    /// Record a payment against a finalized bill. Rejects amounts that would
    /// push the counted total past the grand total.
    pub fn record_payment(
        &self,
        actor: &ActorContext,
        new: NewPayment,
    ) -> DomainResult<(Payment, Reconciliation)> {
        if new.amount <= 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        let bill = self.bills.require(new.bill_id)?;
        bill.ensure_status(BillStatus::Finalized, "pay")?;

        let outstanding = self.ledger.counted_outstanding(&bill)?;
        if new.amount > outstanding {
            return Err(DomainError::validation(format!(
                "payment {} exceeds outstanding {} on bill {}",
                new.amount, outstanding, new.bill_id
            )));
        }

        let payment = Payment {
            id: PaymentId::new(),
            bill_id: new.bill_id,
            amount: new.amount,
            method: new.method,
            cheque_state: (new.method == PaymentMethod::Cheque).then_some(ChequeState::Pending),
            reference: new.reference,
            received_at: Utc::now(),
            recorded_by: actor.actor_id(),
        };
        self.payments.insert(payment.clone())?;
        let recon = self.ledger.reconcile_bill(new.bill_id)?;

        info!(
            payment_id = %payment.id,
            bill_id = %payment.bill_id,
            amount = payment.amount,
            method = ?payment.method,
            "payment recorded"
        );
        audit_best_effort(
            self.audit.as_ref(),
            AuditRecord::new(
                "payment",
                payment.id,
                "record_payment",
                actor.actor_id(),
                json!({ "bill_id": payment.bill_id, "amount": payment.amount, "method": payment.method }),
            ),
        );
        Ok((payment, recon))
    }

    /// Remove a payment (mis-entry) and re-derive the bill's paid state.
    pub fn delete_payment(
        &self,
        actor: &ActorContext,
        payment_id: PaymentId,
    ) -> DomainResult<Reconciliation> {
        let payment = self.payments.require(payment_id)?;
        // Checked before the payment set changes; a failure here must not
        // leave the bill's stored paid state stale.
        self.bills.require(payment.bill_id)?;
        let removed = self.payments.remove(payment_id)?;
        let recon = self.ledger.reconcile_bill(removed.bill_id)?;
        audit_best_effort(
            self.audit.as_ref(),
            AuditRecord::new(
                "payment",
                payment_id,
                "delete_payment",
                actor.actor_id(),
                json!({ "bill_id": removed.bill_id, "amount": removed.amount }),
            ),
        );
        Ok(recon)
    }

    pub fn clear_cheque(
        &self,
        actor: &ActorContext,
        payment_id: PaymentId,
    ) -> DomainResult<Reconciliation> {
        self.resolve_cheque(actor, payment_id, ChequeState::Cleared, "clear_cheque")
    }

    /// A bounced cheque stops counting toward the bill immediately.
    pub fn bounce_cheque(
        &self,
        actor: &ActorContext,
        payment_id: PaymentId,
    ) -> DomainResult<Reconciliation> {
        self.resolve_cheque(actor, payment_id, ChequeState::Bounced, "bounce_cheque")
    }

    fn resolve_cheque(
        &self,
        actor: &ActorContext,
        payment_id: PaymentId,
        to: ChequeState,
        action: &str,
    ) -> DomainResult<Reconciliation> {
        let payment = self.payments.require(payment_id)?;
        self.bills.require(payment.bill_id)?;
        let payment = self.payments.update_cheque_state(payment_id, to)?;
        let recon = self.ledger.reconcile_bill(payment.bill_id)?;
        audit_best_effort(
            self.audit.as_ref(),
            AuditRecord::new(
                "payment",
                payment_id,
                action,
                actor.actor_id(),
                json!({ "bill_id": payment.bill_id, "cheque_state": payment.cheque_state }),
            ),
        );
        Ok(recon)
    }
}
