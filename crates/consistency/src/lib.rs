//! `rxledger-consistency` — cross-store invariant scanner and repair.
//!
//! The scanner reads every store, reports where denormalized state disagrees
//! with its source of truth, and can repair the drift classes that have a
//! safe, deterministic fix: batch quantities are rebased onto the movement
//! log, bill paid state is re-derived from payments. Everything else is
//! surfaced for a human.

mod issue;
mod scanner;

pub use issue::{ConsistencyIssue, IssueKind, Severity};
pub use scanner::{ConsistencyScanner, FixReport};
