use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use rxledger_catalog::QuantityUnit;
use rxledger_core::{
    ActorId, BatchId, BillId, DomainError, DomainResult, Paise, PartyId, Percent, ProductId,
};

/// Billing document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillType {
    Sales,
    Purchase,
    CreditNote,
}

/// Document lifecycle. No transition may skip a state; `Finalized` and
/// `Cancelled` are terminal for ordinary edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Draft,
    Finalized,
    Cancelled,
}

/// Derived payment state, owned by the outstanding ledger's reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

/// Monetary totals, frozen at finalization. All paise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BillTotals {
    /// Gross line value before discount.
    pub subtotal: Paise,
    pub discount: Paise,
    pub cgst: Paise,
    pub sgst: Paise,
    pub igst: Paise,
    /// Signed delta applied once, at document level, to reach a whole rupee.
    pub round_off: Paise,
    pub grand_total: Paise,
}

/// One bill line. Quantities are captured as entered plus the resolved
/// base-unit quantity; all ledger math uses `base_quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillLine {
    pub product_id: ProductId,
    /// Explicitly pinned batch; `None` lets finalization allocate (FEFO).
    pub batch_id: Option<BatchId>,
    pub quantity: i64,
    pub unit: QuantityUnit,
    pub base_quantity: i64,
    /// Rate per entered unit.
    pub rate: Paise,
    pub discount: Percent,
    pub tax: Percent,
    pub taxable: Paise,
    pub cgst: Paise,
    pub sgst: Paise,
    pub igst: Paise,
    pub line_total: Paise,
}

/// Billing document: header + owned lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillDocument {
    pub id: BillId,
    pub bill_type: BillType,
    pub status: BillStatus,
    pub counterparty_id: PartyId,
    pub lines: Vec<BillLine>,
    pub totals: BillTotals,
    pub paid_amount: Paise,
    pub payment_status: PaymentStatus,
    pub bill_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    /// Print template reference, if a custom one was chosen.
    pub template: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: ActorId,
    pub finalized_at: Option<DateTime<Utc>>,
    pub finalized_by: Option<ActorId>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<ActorId>,
    pub cancel_reason: Option<String>,
}

impl BillDocument {
    pub fn outstanding(&self) -> Paise {
        self.totals.grand_total - self.paid_amount
    }

    /// Date aging is measured from: due date, falling back to the bill date.
    pub fn aging_anchor(&self) -> NaiveDate {
        self.due_date.unwrap_or(self.bill_date)
    }

    pub fn ensure_status(&self, expected: BillStatus, operation: &str) -> DomainResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(DomainError::invalid_state(format!(
                "cannot {operation} bill {} in status {:?}",
                self.id, self.status
            )))
        }
    }
}

/// Read-only renderable snapshot handed to the print/template collaborator.
///
/// Only produced for finalized bills, whose contents are immutable, so renders
/// are stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintableBill {
    pub bill_id: BillId,
    pub bill_type: BillType,
    pub counterparty_name: String,
    pub bill_date: NaiveDate,
    pub lines: Vec<BillLine>,
    pub totals: BillTotals,
    pub paid_amount: Paise,
    pub payment_status: PaymentStatus,
    pub template: Option<String>,
}
