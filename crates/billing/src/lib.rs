//! `rxledger-billing` — billing document engine.
//!
//! State machine for bills (`Draft → Finalized → Cancelled`), GST tax
//! computation, and the admin-override path with field-level audit versions.
//! Finalization is the only writer of sale/purchase stock effects, posting
//! through the stock ledger as one all-or-nothing unit per document.

mod audit_version;
mod bill;
mod engine;
mod store;
mod tax;

pub use audit_version::{BillAuditVersion, FieldChange};
pub use bill::{
    BillDocument, BillLine, BillStatus, BillTotals, BillType, PaymentStatus, PrintableBill,
};
pub use engine::{BillPatch, BillingEngine, CompanyProfile, DraftHeader, DraftLine};
pub use store::BillStore;
pub use tax::{LineTax, TaxRegime, compute_line_tax, document_totals};
