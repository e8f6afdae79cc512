//! `rxledger-catalog` — product lookup contract.
//!
//! The catalog owns products; the ledger and billing engine only reference
//! them by id (tax rate, strip factor, stock thresholds). Catalog mutation
//! flows are out of scope here; this crate carries the consumed contract and
//! an in-memory implementation used by tests and the dev wiring.

mod product;

pub use product::{CatalogService, InMemoryCatalog, Product, QuantityUnit};
