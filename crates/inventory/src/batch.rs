use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use rxledger_core::{BatchId, DomainError, DomainResult, Paise, ProductId};

/// Pricing captured on a batch at receipt time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPricing {
    /// Maximum retail price per base unit.
    pub mrp: Paise,
    /// Trade/purchase price per base unit.
    pub trade_price: Paise,
    /// Whether the rate quoted on this batch already includes tax.
    pub tax_inclusive: bool,
}

/// One receipt lot of a product.
///
/// `quantity` is in base units and is mutated **only** by the stock ledger;
/// the `seq` counter orders that batch's movements and is advanced by the
/// batch store together with each quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub product_id: ProductId,
    pub batch_no: String,
    pub expiry: NaiveDate,
    pub quantity: i64,
    pub pricing: BatchPricing,
    /// Per-batch movement sequence; last assigned value.
    pub seq: u64,
}

impl Batch {
    pub fn new(
        id: BatchId,
        product_id: ProductId,
        batch_no: impl Into<String>,
        expiry: NaiveDate,
        quantity: i64,
        pricing: BatchPricing,
    ) -> DomainResult<Self> {
        let batch_no = batch_no.into();
        if batch_no.trim().is_empty() {
            return Err(DomainError::validation("batch number cannot be empty"));
        }
        if quantity < 0 {
            return Err(DomainError::validation("batch quantity cannot be negative"));
        }
        Ok(Self {
            id,
            product_id,
            batch_no,
            expiry,
            quantity,
            pricing,
            seq: 0,
        })
    }

    /// Whether the batch is expired as of `today` (expiry day itself still sellable).
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry < today
    }

    pub fn has_stock(&self) -> bool {
        self.quantity > 0
    }
}
