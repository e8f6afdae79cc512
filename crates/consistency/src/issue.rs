use serde::{Deserialize, Serialize};

use rxledger_core::{BatchId, BillId, Paise, PaymentId, ProductId};

/// How bad a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Dangling reference; reads still produce correct numbers.
    Warning,
    /// Denormalized state disagrees with its source of truth.
    Error,
    /// The source of truth itself is damaged.
    Critical,
}

/// One class of invariant violation, with the ids and values involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    /// Stored batch quantity differs from the movement-log sum.
    StockMismatch {
        product_id: ProductId,
        batch_id: BatchId,
        expected: i64,
        actual: i64,
    },
    /// Batch references a product the catalog no longer knows.
    OrphanBatch {
        batch_id: BatchId,
        product_id: ProductId,
    },
    /// Payment references a bill that does not exist.
    OrphanPayment {
        payment_id: PaymentId,
        bill_id: BillId,
    },
    /// Stored paid amount differs from the counted payment total.
    PaymentMismatch {
        bill_id: BillId,
        expected: Paise,
        actual: Paise,
    },
    /// A movement row's recorded balance disagrees with the running sum at
    /// its position. The append-only log itself is wrong; never auto-fixed.
    LedgerInconsistency {
        batch_id: BatchId,
        batch_seq: u64,
        expected_balance: i64,
        actual_balance: i64,
    },
}

impl IssueKind {
    pub fn severity(&self) -> Severity {
        match self {
            Self::OrphanBatch { .. } | Self::OrphanPayment { .. } => Severity::Warning,
            Self::StockMismatch { .. } | Self::PaymentMismatch { .. } => Severity::Error,
            Self::LedgerInconsistency { .. } => Severity::Critical,
        }
    }

    /// Only drift of denormalized state is safe to repair mechanically.
    pub fn auto_fixable(&self) -> bool {
        matches!(
            self,
            Self::StockMismatch { .. } | Self::PaymentMismatch { .. }
        )
    }
}

/// One scanner finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub auto_fixable: bool,
}

impl ConsistencyIssue {
    pub fn new(kind: IssueKind) -> Self {
        let severity = kind.severity();
        let auto_fixable = kind.auto_fixable();
        Self {
            kind,
            severity,
            auto_fixable,
        }
    }
}
