//! `rxledger-receivables` — payments and the outstanding/aging ledger.
//!
//! A bill's `paid_amount` and `payment_status` are derived facts, recomputed
//! from its payments by [`OutstandingLedger::reconcile_bill`] after every
//! payment mutation. Cheques participate per the reconcile policy and drop out
//! when they bounce.

mod ledger;
mod payment;

pub use ledger::{
    AgingBucket, AgingReport, OutstandingLedger, PartyAging, ReconcilePolicy, Reconciliation,
};
pub use payment::{ChequeState, NewPayment, Payment, PaymentMethod, PaymentService, PaymentStore};
