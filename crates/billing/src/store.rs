//! In-memory bill store.
//!
//! Bills are mutated only through closures run under the store's write lock,
//! so a status check and the transition it guards are one atomic unit. Audit
//! versions live beside the bills and outlive force-deleted documents.

use std::collections::HashMap;
use std::sync::RwLock;

use rxledger_core::{BillId, DomainError, DomainResult, Paise};

use crate::audit_version::BillAuditVersion;
use crate::bill::{BillDocument, PaymentStatus};

#[derive(Debug, Default)]
struct Inner {
    bills: HashMap<BillId, BillDocument>,
    audit_versions: HashMap<BillId, Vec<BillAuditVersion>>,
}

#[derive(Debug, Default)]
pub struct BillStore {
    inner: RwLock<Inner>,
}

impl BillStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bill: BillDocument) -> DomainResult<()> {
        let mut inner = self.write()?;
        if inner.bills.contains_key(&bill.id) {
            return Err(DomainError::conflict(format!("bill {} already exists", bill.id)));
        }
        inner.bills.insert(bill.id, bill);
        Ok(())
    }

    pub fn get(&self, id: BillId) -> Option<BillDocument> {
        self.read().ok()?.bills.get(&id).cloned()
    }

    pub fn require(&self, id: BillId) -> DomainResult<BillDocument> {
        self.get(id)
            .ok_or_else(|| DomainError::not_found(format!("bill {id}")))
    }

    pub fn list(&self) -> Vec<BillDocument> {
        self.read()
            .map(|i| i.bills.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Atomic read-modify-write on one bill. The closure validates the current
    /// state and applies the transition; any error leaves the bill untouched.
    pub fn update_with<T>(
        &self,
        id: BillId,
        f: impl FnOnce(&mut BillDocument) -> DomainResult<T>,
    ) -> DomainResult<T> {
        let mut inner = self.write()?;
        let bill = inner
            .bills
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("bill {id}")))?;
        let mut scratch = bill.clone();
        let out = f(&mut scratch)?;
        *bill = scratch;
        Ok(out)
    }

    /// Atomic variant that also appends an audit version with the change.
    /// Used by the admin-override and force-delete paths.
    pub fn update_with_audit<T>(
        &self,
        id: BillId,
        f: impl FnOnce(&mut BillDocument) -> DomainResult<(T, BillAuditVersion)>,
    ) -> DomainResult<T> {
        let mut inner = self.write()?;
        let bill = inner
            .bills
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("bill {id}")))?;
        let mut scratch = bill.clone();
        let (out, version) = f(&mut scratch)?;
        *bill = scratch;
        inner.audit_versions.entry(id).or_default().push(version);
        Ok(out)
    }

    /// Remove a bill, keeping any audit versions recorded against it.
    pub fn remove(&self, id: BillId) -> DomainResult<BillDocument> {
        self.write()?
            .bills
            .remove(&id)
            .ok_or_else(|| DomainError::not_found(format!("bill {id}")))
    }

    pub fn push_audit_version(&self, version: BillAuditVersion) -> DomainResult<()> {
        self.write()?
            .audit_versions
            .entry(version.bill_id)
            .or_default()
            .push(version);
        Ok(())
    }

    pub fn audit_versions(&self, id: BillId) -> Vec<BillAuditVersion> {
        self.read()
            .map(|i| i.audit_versions.get(&id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Dedicated reconciliation write: `paid_amount` and `payment_status` are
    /// owned by the outstanding ledger and change through this path only.
    pub fn apply_reconciliation(
        &self,
        id: BillId,
        paid_amount: Paise,
        payment_status: PaymentStatus,
    ) -> DomainResult<()> {
        self.update_with(id, |bill| {
            bill.paid_amount = paid_amount;
            bill.payment_status = payment_status;
            Ok(())
        })
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, DomainError> {
        self.inner
            .read()
            .map_err(|_| DomainError::integrity("bill store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, DomainError> {
        self.inner
            .write()
            .map_err(|_| DomainError::integrity("bill store lock poisoned"))
    }
}
