use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use rxledger_core::{DomainError, DomainResult, Percent, ProductId};

/// Unit a bill line quantity is expressed in.
///
/// All ledger math runs in base units; strips are converted up front using the
/// product's strip size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantityUnit {
    /// Smallest sellable unit (tablet, ml, piece).
    Base,
    /// One strip/pack of `Product::strip_size` base units.
    Strip,
}

/// Catalog product as seen by the ledger: identity + tax rate + packaging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// GST rate applied to lines of this product.
    pub gst_rate: Percent,
    /// Base units per strip; 1 for unpacked goods.
    pub strip_size: u32,
    /// Reorder threshold in base units.
    pub min_stock: i64,
    /// Overstock threshold in base units.
    pub max_stock: i64,
    /// Display label for the base unit ("tab", "ml", ...).
    pub unit: String,
}

impl Product {
    /// Convert a line quantity to base units.
    pub fn to_base_units(&self, quantity: i64, unit: QuantityUnit) -> DomainResult<i64> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        match unit {
            QuantityUnit::Base => Ok(quantity),
            QuantityUnit::Strip => quantity
                .checked_mul(self.strip_size.max(1) as i64)
                .ok_or_else(|| DomainError::validation("quantity overflow")),
        }
    }
}

/// Consumed contract: product lookup by id.
pub trait CatalogService: Send + Sync {
    fn product(&self, id: ProductId) -> Option<Product>;

    fn require_product(&self, id: ProductId) -> DomainResult<Product> {
        self.product(id)
            .ok_or_else(|| DomainError::not_found(format!("product {id}")))
    }
}

impl<S> CatalogService for std::sync::Arc<S>
where
    S: CatalogService + ?Sized,
{
    fn product(&self, id: ProductId) -> Option<Product> {
        (**self).product(id)
    }
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, product: Product) {
        if let Ok(mut products) = self.products.write() {
            products.insert(product.id, product);
        }
    }

    pub fn remove(&self, id: ProductId) {
        if let Ok(mut products) = self.products.write() {
            products.remove(&id);
        }
    }
}

impl CatalogService for InMemoryCatalog {
    fn product(&self, id: ProductId) -> Option<Product> {
        self.products.read().ok()?.get(&id).cloned()
    }
}
