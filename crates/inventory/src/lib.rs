//! `rxledger-inventory` — batch store + stock ledger.
//!
//! Every batch-quantity change in the system flows through [`StockLedger`];
//! the [`BatchStore`] write lock is the serialization point that makes the
//! quantity mutation and the appended movement row indivisible.

mod batch;
mod ledger;
mod movement;
mod store;

pub use batch::{Batch, BatchPricing};
pub use ledger::{AllocationStrategy, Posting, StockLedger};
pub use movement::{MovementKind, MovementRef, StockMovement};
pub use store::{AppliedDelta, BatchStore};
