use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use rxledger_core::{DomainError, DomainResult, PartyId};

/// Party kind: customer or supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Supplier,
}

/// Counterparty as seen by billing: identity + GST state code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    /// GST state code (e.g. `"27"` for Maharashtra). Compared against the
    /// company's state to pick the CGST/SGST vs IGST split.
    pub state_code: String,
}

/// Consumed contract: counterparty lookup by id.
pub trait CounterpartyService: Send + Sync {
    fn counterparty(&self, id: PartyId) -> Option<Counterparty>;

    fn require_counterparty(&self, id: PartyId) -> DomainResult<Counterparty> {
        self.counterparty(id)
            .ok_or_else(|| DomainError::not_found(format!("counterparty {id}")))
    }
}

impl<S> CounterpartyService for std::sync::Arc<S>
where
    S: CounterpartyService + ?Sized,
{
    fn counterparty(&self, id: PartyId) -> Option<Counterparty> {
        (**self).counterparty(id)
    }
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    parties: RwLock<HashMap<PartyId, Counterparty>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, party: Counterparty) {
        if let Ok(mut parties) = self.parties.write() {
            parties.insert(party.id, party);
        }
    }
}

impl CounterpartyService for InMemoryDirectory {
    fn counterparty(&self, id: PartyId) -> Option<Counterparty> {
        self.parties.read().ok()?.get(&id).cloned()
    }
}
