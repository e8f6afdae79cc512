//! `rxledger-parties` — counterparty lookup contract.
//!
//! Customers and suppliers live outside the engine; billing only needs their
//! identity and GST state code (intra/inter-state tax determination).

mod party;

pub use party::{Counterparty, CounterpartyService, InMemoryDirectory, PartyKind};
