use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rxledger_core::{BatchId, BillId, DomainError, DomainResult, MovementId, ProductId};

/// Movement type. Determines the legal sign of the quantity delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    PurchaseIn,
    SaleOut,
    ReturnIn,
    TransferIn,
    TransferOut,
    Adjustment,
    ExpiryWriteOff,
}

impl MovementKind {
    /// Validate the signedness of a delta for this kind.
    ///
    /// Inbound kinds must add stock, outbound kinds must remove it; an
    /// adjustment may go either way but never zero.
    pub fn validate_delta(self, delta: i64) -> DomainResult<()> {
        let ok = match self {
            Self::PurchaseIn | Self::ReturnIn | Self::TransferIn => delta > 0,
            Self::SaleOut | Self::TransferOut | Self::ExpiryWriteOff => delta < 0,
            Self::Adjustment => delta != 0,
        };
        if ok {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "illegal delta {delta} for movement kind {self:?}"
            )))
        }
    }
}

/// Originating document of a movement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MovementRef {
    /// A billing document (sale, purchase, credit note).
    Bill(BillId),
    /// A manual operation (stocktake, write-off run), free-form tag.
    Manual(String),
}

impl core::fmt::Display for MovementRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bill(id) => write!(f, "bill:{id}"),
            Self::Manual(tag) => write!(f, "manual:{tag}"),
        }
    }
}

/// Immutable stock movement fact.
///
/// Append-only: rows are never updated or deleted; mistakes are corrected by
/// explicit reversal movements. `balance_after` must equal the batch quantity
/// immediately after the movement was applied; per-batch rows ordered by
/// `batch_seq` carry a running sum equal to each recorded balance. That is the
/// ledger's auditability invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub batch_id: BatchId,
    /// Optional storage location (godown) for transfer postings.
    pub godown: Option<String>,
    pub kind: MovementKind,
    pub delta: i64,
    pub balance_after: i64,
    pub reference: MovementRef,
    /// Set on compensating movements posted by a reversal.
    pub is_reversal: bool,
    /// Position in this batch's movement order, assigned by the batch store.
    pub batch_seq: u64,
    pub occurred_at: DateTime<Utc>,
}
