//! Domain error model.

use thiserror::Error;

use crate::id::{BatchId, ProductId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// state-machine violations, stock shortfalls). Infrastructure concerns belong
/// elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A requested entity id did not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// A transition is not legal from the current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Allocation cannot cover the requested quantity.
    ///
    /// Expected business outcome on a sale against thin stock; never retried
    /// automatically past the engine's internal re-allocation attempts.
    #[error("insufficient stock for product {product_id}: requested {requested}, short by {shortfall}")]
    InsufficientStock {
        product_id: ProductId,
        batch_id: Option<BatchId>,
        requested: i64,
        shortfall: i64,
    },

    /// Admin-gated operation attempted without administrator capability.
    #[error("unauthorized")]
    Unauthorized,

    /// Malformed line/header data or out-of-band value.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Optimistic check lost a race on a batch or bill. Retried internally a
    /// bounded number of times before surfacing.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A ledger invariant failed a defensive check. Bug signal: always logged
    /// at high severity, never silently continued.
    #[error("integrity violation: {0}")]
    Integrity(String),
}

impl DomainError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    /// Stable machine-readable kind, so callers can react without parsing
    /// free text.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::Unauthorized => "unauthorized",
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "concurrency_conflict",
            Self::Integrity(_) => "integrity_violation",
        }
    }

    /// Whether an internal bounded retry is worthwhile (lost optimistic race).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
