//! Request DTOs and their mapping into domain types.
//!
//! Monetary fields are paise, percentage fields are basis points; the JSON
//! field names say so to keep clients honest.

use chrono::NaiveDate;
use serde::Deserialize;

use rxledger_billing::{BillPatch, BillType, DraftHeader, DraftLine};
use rxledger_catalog::{Product, QuantityUnit};
use rxledger_core::{
    BatchId, BillId, DomainError, DomainResult, Paise, PartyId, Percent, ProductId,
};
use rxledger_inventory::{BatchPricing, MovementKind};
use rxledger_parties::{Counterparty, PartyKind};
use rxledger_receivables::{NewPayment, PaymentMethod};

#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub name: String,
    pub gst_rate_bp: u32,
    pub strip_size: u32,
    pub min_stock: i64,
    pub max_stock: i64,
    pub unit: String,
}

impl ProductRequest {
    pub fn into_product(self) -> DomainResult<Product> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if self.strip_size == 0 {
            return Err(DomainError::validation("strip size must be at least 1"));
        }
        Ok(Product {
            id: ProductId::new(),
            name: self.name,
            gst_rate: Percent::from_basis_points(self.gst_rate_bp),
            strip_size: self.strip_size,
            min_stock: self.min_stock,
            max_stock: self.max_stock,
            unit: self.unit,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PartyRequest {
    pub kind: PartyKind,
    pub name: String,
    pub state_code: String,
}

impl PartyRequest {
    pub fn into_party(self) -> DomainResult<Counterparty> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("party name cannot be empty"));
        }
        if self.state_code.trim().is_empty() {
            return Err(DomainError::validation("state code cannot be empty"));
        }
        Ok(Counterparty {
            id: PartyId::new(),
            kind: self.kind,
            name: self.name,
            state_code: self.state_code,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub product_id: ProductId,
    pub batch_no: String,
    pub expiry: NaiveDate,
    /// Opening quantity, posted as an opening-stock movement so the movement
    /// log stays the source of truth.
    pub opening_quantity: i64,
    pub mrp_paise: Paise,
    pub trade_price_paise: Paise,
    pub tax_inclusive: bool,
}

impl BatchRequest {
    pub fn pricing(&self) -> BatchPricing {
        BatchPricing {
            mrp: self.mrp_paise,
            trade_price: self.trade_price_paise,
            tax_inclusive: self.tax_inclusive,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BillLineRequest {
    pub product_id: ProductId,
    pub batch_id: Option<BatchId>,
    pub quantity: i64,
    pub unit: QuantityUnit,
    pub rate_paise: Paise,
    #[serde(default)]
    pub discount_bp: u32,
}

impl BillLineRequest {
    pub fn into_draft_line(self) -> DraftLine {
        DraftLine {
            product_id: self.product_id,
            batch_id: self.batch_id,
            quantity: self.quantity,
            unit: self.unit,
            rate: self.rate_paise,
            discount: Percent::from_basis_points(self.discount_bp),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BillRequest {
    pub bill_type: BillType,
    pub counterparty_id: PartyId,
    pub bill_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub template: Option<String>,
    pub lines: Vec<BillLineRequest>,
}

impl BillRequest {
    pub fn into_draft(self) -> (DraftHeader, Vec<DraftLine>) {
        let header = DraftHeader {
            bill_type: self.bill_type,
            counterparty_id: self.counterparty_id,
            bill_date: self.bill_date,
            due_date: self.due_date,
            template: self.template,
        };
        let lines = self
            .lines
            .into_iter()
            .map(BillLineRequest::into_draft_line)
            .collect();
        (header, lines)
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub reason: String,
    pub due_date: Option<NaiveDate>,
    pub template: Option<String>,
}

impl OverrideRequest {
    pub fn into_patch(self) -> (BillPatch, String) {
        (
            BillPatch {
                due_date: self.due_date,
                template: self.template,
            },
            self.reason,
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub bill_id: BillId,
    pub amount_paise: Paise,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

impl PaymentRequest {
    pub fn into_new_payment(self) -> NewPayment {
        NewPayment {
            bill_id: self.bill_id,
            amount: self.amount_paise,
            method: self.method,
            reference: self.reference,
        }
    }
}

/// Manual stock posting (stocktake adjustment, write-off, godown transfer).
#[derive(Debug, Deserialize)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub batch_id: BatchId,
    pub kind: MovementKind,
    pub delta: i64,
    pub godown: Option<String>,
    /// Free-form tag recorded as the movement reference.
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct MovementQuery {
    pub batch_id: Option<BatchId>,
    pub product_id: Option<ProductId>,
}

#[derive(Debug, Deserialize)]
pub struct AgingQuery {
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub force: bool,
    /// Justification recorded in the audit trail; required for forced deletes.
    pub reason: Option<String>,
}
