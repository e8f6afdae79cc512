//! Bill lifecycle engine.
//!
//! Drafts are cheap and freely editable; finalization is the single point
//! where a bill touches stock, posting all of its movements through the ledger
//! as one unit. Finalized bills are locked: they change only through
//! cancellation, the admin override path, or a force delete, each of which
//! leaves an audit trail.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use tracing::{error, info, warn};

use rxledger_catalog::{CatalogService, QuantityUnit};
use rxledger_core::{ActorContext, BatchId, BillId, DomainError, DomainResult, Paise, Percent, ProductId};
use rxledger_events::{AuditRecord, AuditSink, NotificationSink, audit_best_effort};
use rxledger_inventory::{AllocationStrategy, MovementKind, MovementRef, Posting, StockLedger};
use rxledger_parties::CounterpartyService;

use crate::audit_version::{BillAuditVersion, FieldChange};
use crate::bill::{
    BillDocument, BillLine, BillStatus, BillType, PaymentStatus, PrintableBill,
};
use crate::store::BillStore;
use crate::tax::{TaxRegime, compute_line_tax, document_totals};

/// How many times a stale allocation plan is rebuilt before the shortfall is
/// surfaced to the caller.
const MAX_ALLOCATION_RETRIES: u32 = 3;

/// GST rates above 28% do not exist in the slab structure; reject them at the
/// door rather than producing a plausible-looking wrong bill.
const MAX_TAX_BASIS_POINTS: u32 = 2_800;

/// A bill counts as finalized for follow-up operations only once
/// `finalized_at` is stamped. A bare `Finalized` status is an in-flight
/// finalize claim whose stock postings may not have landed yet; acting on it
/// would race the finalizer.
fn ensure_settled(bill: &BillDocument, operation: &str) -> DomainResult<()> {
    bill.ensure_status(BillStatus::Finalized, operation)?;
    if bill.finalized_at.is_none() {
        return Err(DomainError::conflict(format!(
            "cannot {operation} bill {}: finalization is still in flight",
            bill.id
        )));
    }
    Ok(())
}

/// Billing-side identity of the operating company.
#[derive(Debug, Clone)]
pub struct CompanyProfile {
    /// GST state code, compared against each counterparty's to pick the
    /// CGST/SGST vs IGST split.
    pub state_code: String,
    /// Days ahead of expiry at which near-expiry alerts fire.
    pub expiry_horizon_days: u64,
}

/// Header fields supplied when opening a draft.
#[derive(Debug, Clone)]
pub struct DraftHeader {
    pub bill_type: BillType,
    pub counterparty_id: rxledger_core::PartyId,
    pub bill_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub template: Option<String>,
}

/// One line as entered by the operator.
#[derive(Debug, Clone)]
pub struct DraftLine {
    pub product_id: ProductId,
    /// Pin a specific batch; `None` on a sales line defers to FEFO allocation
    /// at finalization. Inbound bill types must always pin.
    pub batch_id: Option<BatchId>,
    pub quantity: i64,
    pub unit: QuantityUnit,
    pub rate: Paise,
    pub discount: Percent,
}

/// Admin override: the fields a locked bill may still change.
#[derive(Debug, Clone, Default)]
pub struct BillPatch {
    pub due_date: Option<NaiveDate>,
    pub template: Option<String>,
}

pub struct BillingEngine {
    catalog: Arc<dyn CatalogService>,
    parties: Arc<dyn CounterpartyService>,
    ledger: Arc<StockLedger>,
    bills: Arc<BillStore>,
    audit: Arc<dyn AuditSink>,
    notifications: Arc<dyn NotificationSink>,
    company: CompanyProfile,
}

impl BillingEngine {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        parties: Arc<dyn CounterpartyService>,
        ledger: Arc<StockLedger>,
        bills: Arc<BillStore>,
        audit: Arc<dyn AuditSink>,
        notifications: Arc<dyn NotificationSink>,
        company: CompanyProfile,
    ) -> Self {
        Self {
            catalog,
            parties,
            ledger,
            bills,
            audit,
            notifications,
            company,
        }
    }

    pub fn bill_store(&self) -> &Arc<BillStore> {
        &self.bills
    }

    pub fn bill(&self, id: BillId) -> DomainResult<BillDocument> {
        self.bills.require(id)
    }

    pub fn audit_versions(&self, id: BillId) -> Vec<BillAuditVersion> {
        self.bills.audit_versions(id)
    }

    /// Open a draft: validate the header and every line, compute the tax split
    /// and totals, and store the document. No stock is touched.
    pub fn create_draft(
        &self,
        actor: &ActorContext,
        header: DraftHeader,
        lines: Vec<DraftLine>,
    ) -> DomainResult<BillDocument> {
        if lines.is_empty() {
            return Err(DomainError::validation("a bill needs at least one line"));
        }
        let party = self.parties.require_counterparty(header.counterparty_id)?;
        let regime = TaxRegime::determine(&self.company.state_code, &party.state_code);

        let mut built = Vec::with_capacity(lines.len());
        for line in lines {
            built.push(self.build_line(header.bill_type, line, regime)?);
        }
        let totals = document_totals(&built)?;

        let bill = BillDocument {
            id: BillId::new(),
            bill_type: header.bill_type,
            status: BillStatus::Draft,
            counterparty_id: party.id,
            lines: built,
            totals,
            paid_amount: 0,
            payment_status: PaymentStatus::Unpaid,
            bill_date: header.bill_date,
            due_date: header.due_date,
            template: header.template,
            created_at: Utc::now(),
            created_by: actor.actor_id(),
            finalized_at: None,
            finalized_by: None,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
        };
        self.bills.insert(bill.clone())?;
        info!(bill_id = %bill.id, bill_type = ?bill.bill_type, "draft created");
        audit_best_effort(
            self.audit.as_ref(),
            AuditRecord::new(
                "bill",
                bill.id,
                "create_draft",
                actor.actor_id(),
                json!({ "bill_type": bill.bill_type, "grand_total": bill.totals.grand_total }),
            ),
        );
        Ok(bill)
    }

    /// Replace a draft's header and lines, recomputing totals. Only drafts.
    pub fn update_draft(
        &self,
        actor: &ActorContext,
        bill_id: BillId,
        header: DraftHeader,
        lines: Vec<DraftLine>,
    ) -> DomainResult<BillDocument> {
        if lines.is_empty() {
            return Err(DomainError::validation("a bill needs at least one line"));
        }
        let party = self.parties.require_counterparty(header.counterparty_id)?;
        let regime = TaxRegime::determine(&self.company.state_code, &party.state_code);
        let mut built = Vec::with_capacity(lines.len());
        for line in lines {
            built.push(self.build_line(header.bill_type, line, regime)?);
        }
        let totals = document_totals(&built)?;

        let updated = self.bills.update_with(bill_id, |bill| {
            bill.ensure_status(BillStatus::Draft, "edit")?;
            bill.bill_type = header.bill_type;
            bill.counterparty_id = party.id;
            bill.lines = built;
            bill.totals = totals;
            bill.bill_date = header.bill_date;
            bill.due_date = header.due_date;
            bill.template = header.template;
            Ok(bill.clone())
        })?;
        audit_best_effort(
            self.audit.as_ref(),
            AuditRecord::new(
                "bill",
                bill_id,
                "update_draft",
                actor.actor_id(),
                json!({ "grand_total": updated.totals.grand_total }),
            ),
        );
        Ok(updated)
    }

    /// Finalize a draft: post all of its stock effects through the ledger as
    /// one all-or-nothing unit, then lock the document.
    ///
    /// The draft is claimed (status flipped) under the bill-store lock before
    /// any stock moves, so exactly one of two racing finalizations posts; a
    /// failed posting hands the draft back.
    pub fn finalize(
        &self,
        actor: &ActorContext,
        bill_id: BillId,
        today: NaiveDate,
    ) -> DomainResult<BillDocument> {
        let claimed = self.bills.update_with(bill_id, |bill| {
            bill.ensure_status(BillStatus::Draft, "finalize")?;
            bill.status = BillStatus::Finalized;
            Ok(bill.clone())
        })?;

        if let Err(err) = self.post_bill_stock(&claimed, today) {
            let released = self.bills.update_with(bill_id, |bill| {
                bill.ensure_status(BillStatus::Finalized, "release finalize claim")?;
                bill.status = BillStatus::Draft;
                Ok(())
            });
            if let Err(release_err) = released {
                error!(bill_id = %bill_id, error = %release_err, "finalize claim release failed");
            }
            return Err(err);
        }

        let now = Utc::now();
        let completed = self.bills.update_with(bill_id, |bill| {
            bill.ensure_status(BillStatus::Finalized, "complete finalize")?;
            bill.finalized_at = Some(now);
            bill.finalized_by = Some(actor.actor_id());
            bill.payment_status = PaymentStatus::Unpaid;
            bill.paid_amount = 0;
            Ok(bill.clone())
        });
        let finalized = match completed {
            Ok(bill) => bill,
            Err(err) => {
                // The claim vanished under us; pull the postings back out so
                // the document and the ledger stay in step.
                let _ = self
                    .ledger
                    .reverse_movements_for_reference(&MovementRef::Bill(bill_id));
                return Err(err);
            }
        };

        info!(
            bill_id = %finalized.id,
            bill_type = ?finalized.bill_type,
            grand_total = finalized.totals.grand_total,
            "bill finalized"
        );
        audit_best_effort(
            self.audit.as_ref(),
            AuditRecord::new(
                "bill",
                finalized.id,
                "finalize",
                actor.actor_id(),
                json!({ "grand_total": finalized.totals.grand_total }),
            ),
        );

        if finalized.bill_type == BillType::Sales {
            let product_ids: Vec<ProductId> =
                finalized.lines.iter().map(|l| l.product_id).collect();
            self.ledger.check_alerts(
                self.catalog.as_ref(),
                self.notifications.as_ref(),
                &product_ids,
                today,
                self.company.expiry_horizon_days,
            );
        }
        Ok(finalized)
    }

    /// Cancel a finalized bill, reversing every stock movement it posted.
    ///
    /// The reversal is idempotent per reference, so a cancel that loses a race
    /// fails on the status check without double-reversing stock. A bill whose
    /// finalization is still posting (claimed, `finalized_at` unset) is a
    /// conflict, not cancellable: cancelling it would reverse nothing and then
    /// strand the postings that land moments later.
    pub fn cancel(
        &self,
        actor: &ActorContext,
        bill_id: BillId,
        reason: impl Into<String>,
    ) -> DomainResult<BillDocument> {
        let reason = reason.into();
        let current = self.bills.require(bill_id)?;
        ensure_settled(&current, "cancel")?;

        let reversed = self
            .ledger
            .reverse_movements_for_reference(&MovementRef::Bill(bill_id))?;

        let now = Utc::now();
        let cancelled = self.bills.update_with(bill_id, |bill| {
            ensure_settled(bill, "cancel")?;
            bill.status = BillStatus::Cancelled;
            bill.cancelled_at = Some(now);
            bill.cancelled_by = Some(actor.actor_id());
            bill.cancel_reason = Some(reason.clone());
            Ok(bill.clone())
        })?;

        info!(bill_id = %bill_id, reversed = reversed.len(), "bill cancelled");
        audit_best_effort(
            self.audit.as_ref(),
            AuditRecord::new(
                "bill",
                bill_id,
                "cancel",
                actor.actor_id(),
                json!({ "reason": cancelled.cancel_reason, "movements_reversed": reversed.len() }),
            ),
        );
        Ok(cancelled)
    }

    /// Delete a bill. Drafts go unconditionally; finalized or cancelled bills
    /// need `force`, an admin, and a stated reason, reverse any outstanding
    /// stock effects, and leave an audit version carrying the full document
    /// snapshot under that reason.
    pub fn delete(
        &self,
        actor: &ActorContext,
        bill_id: BillId,
        reason: impl Into<String>,
        force: bool,
    ) -> DomainResult<()> {
        let reason = reason.into();
        let bill = self.bills.require(bill_id)?;
        if bill.status == BillStatus::Finalized {
            ensure_settled(&bill, "delete")?;
        }

        if bill.status != BillStatus::Draft {
            if !force {
                return Err(DomainError::invalid_state(format!(
                    "bill {bill_id} is {:?}; deleting it requires force",
                    bill.status
                )));
            }
            actor.require_admin()?;
            if reason.trim().is_empty() {
                return Err(DomainError::validation("force delete requires a reason"));
            }

            let snapshot = serde_json::to_value(&bill)
                .map_err(|e| DomainError::integrity(format!("bill snapshot failed: {e}")))?;
            self.bills.push_audit_version(BillAuditVersion::new(
                bill_id,
                actor.actor_id(),
                reason.clone(),
                vec![FieldChange::new("bill", snapshot, serde_json::Value::Null)],
            ))?;

            // No-op when the bill was already cancelled (already reversed).
            self.ledger
                .reverse_movements_for_reference(&MovementRef::Bill(bill_id))?;
        }

        self.bills.remove(bill_id)?;
        warn!(bill_id = %bill_id, status = ?bill.status, force, "bill deleted");
        audit_best_effort(
            self.audit.as_ref(),
            AuditRecord::new(
                "bill",
                bill_id,
                "delete",
                actor.actor_id(),
                json!({ "status": bill.status, "force": force, "reason": reason }),
            ),
        );
        Ok(())
    }

    /// Admin override on a finalized bill: applies the patch and appends the
    /// field-level audit version in one atomic step.
    pub fn admin_override(
        &self,
        actor: &ActorContext,
        bill_id: BillId,
        patch: BillPatch,
        reason: impl Into<String>,
    ) -> DomainResult<BillDocument> {
        actor.require_admin()?;
        let reason = reason.into();

        let updated = self.bills.update_with_audit(bill_id, |bill| {
            ensure_settled(bill, "override")?;

            let mut changes = Vec::new();
            if let Some(due_date) = patch.due_date {
                if bill.due_date != Some(due_date) {
                    changes.push(FieldChange::new(
                        "due_date",
                        json!(bill.due_date),
                        json!(due_date),
                    ));
                    bill.due_date = Some(due_date);
                }
            }
            if let Some(template) = patch.template.clone() {
                if bill.template.as_deref() != Some(template.as_str()) {
                    changes.push(FieldChange::new(
                        "template",
                        json!(bill.template),
                        json!(template),
                    ));
                    bill.template = Some(template);
                }
            }
            if changes.is_empty() {
                return Err(DomainError::validation("override changes nothing"));
            }

            let version =
                BillAuditVersion::new(bill_id, actor.actor_id(), reason.clone(), changes);
            Ok((bill.clone(), version))
        })?;

        audit_best_effort(
            self.audit.as_ref(),
            AuditRecord::new(
                "bill",
                bill_id,
                "admin_override",
                actor.actor_id(),
                json!({ "reason": reason }),
            ),
        );
        Ok(updated)
    }

    /// Renderable snapshot of a finalized bill.
    pub fn printable(&self, bill_id: BillId) -> DomainResult<PrintableBill> {
        let bill = self.bills.require(bill_id)?;
        bill.ensure_status(BillStatus::Finalized, "print")?;
        let party = self.parties.require_counterparty(bill.counterparty_id)?;
        Ok(PrintableBill {
            bill_id: bill.id,
            bill_type: bill.bill_type,
            counterparty_name: party.name,
            bill_date: bill.bill_date,
            lines: bill.lines,
            totals: bill.totals,
            paid_amount: bill.paid_amount,
            payment_status: bill.payment_status,
            template: bill.template,
        })
    }

    fn build_line(
        &self,
        bill_type: BillType,
        line: DraftLine,
        regime: TaxRegime,
    ) -> DomainResult<BillLine> {
        let product = self.catalog.require_product(line.product_id)?;
        let base_quantity = product.to_base_units(line.quantity, line.unit)?;

        if line.rate < 0 {
            return Err(DomainError::validation("rate cannot be negative"));
        }
        if line.discount.basis_points() > 10_000 {
            return Err(DomainError::validation("discount above 100%"));
        }
        if product.gst_rate.basis_points() > MAX_TAX_BASIS_POINTS {
            return Err(DomainError::validation(format!(
                "GST rate {}bp on product {} is outside the permitted slabs",
                product.gst_rate.basis_points(),
                product.id
            )));
        }
        match (bill_type, line.batch_id) {
            (BillType::Purchase | BillType::CreditNote, None) => {
                return Err(DomainError::validation(
                    "inbound bill lines must name the batch being received",
                ));
            }
            (_, Some(batch_id)) => {
                let batch = self.ledger.batch_store().require(batch_id)?;
                if batch.product_id != line.product_id {
                    return Err(DomainError::validation(format!(
                        "batch {batch_id} does not belong to product {}",
                        line.product_id
                    )));
                }
            }
            (BillType::Sales, None) => {}
        }

        let tax = compute_line_tax(line.quantity, line.rate, line.discount, product.gst_rate, regime)?;
        Ok(BillLine {
            product_id: line.product_id,
            batch_id: line.batch_id,
            quantity: line.quantity,
            unit: line.unit,
            base_quantity,
            rate: line.rate,
            discount: line.discount,
            tax: product.gst_rate,
            taxable: tax.taxable,
            cgst: tax.cgst,
            sgst: tax.sgst,
            igst: tax.igst,
            line_total: tax.line_total,
        })
    }

    fn post_bill_stock(&self, bill: &BillDocument, today: NaiveDate) -> DomainResult<()> {
        let reference = MovementRef::Bill(bill.id);
        let mut attempt = 0;
        loop {
            let postings = self.build_postings(bill, today)?;
            match self.ledger.post_movements(postings, reference.clone()) {
                Ok(_) => return Ok(()),
                // A plan built from a snapshot can lose to a concurrent sale
                // between allocation and commit; rebuild it a bounded number
                // of times before surfacing the shortfall.
                Err(err @ DomainError::InsufficientStock { .. }) => {
                    attempt += 1;
                    if attempt >= MAX_ALLOCATION_RETRIES {
                        return Err(err);
                    }
                    warn!(bill_id = %bill.id, attempt, "allocation plan went stale, replanning");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn build_postings(&self, bill: &BillDocument, today: NaiveDate) -> DomainResult<Vec<Posting>> {
        let mut postings = Vec::new();
        for line in &bill.lines {
            match bill.bill_type {
                BillType::Sales => {
                    if let Some(batch_id) = line.batch_id {
                        postings.push(Posting {
                            product_id: line.product_id,
                            batch_id,
                            kind: MovementKind::SaleOut,
                            delta: -line.base_quantity,
                            godown: None,
                        });
                    } else {
                        let plan = self.ledger.allocate_for_sale(
                            line.product_id,
                            line.base_quantity,
                            AllocationStrategy::default(),
                            today,
                        )?;
                        for (batch_id, take) in plan {
                            postings.push(Posting {
                                product_id: line.product_id,
                                batch_id,
                                kind: MovementKind::SaleOut,
                                delta: -take,
                                godown: None,
                            });
                        }
                    }
                }
                BillType::Purchase | BillType::CreditNote => {
                    let batch_id = line.batch_id.ok_or_else(|| {
                        DomainError::validation(
                            "inbound bill lines must name the batch being received",
                        )
                    })?;
                    let kind = if bill.bill_type == BillType::Purchase {
                        MovementKind::PurchaseIn
                    } else {
                        MovementKind::ReturnIn
                    };
                    postings.push(Posting {
                        product_id: line.product_id,
                        batch_id,
                        kind,
                        delta: line.base_quantity,
                        godown: None,
                    });
                }
            }
        }
        Ok(postings)
    }
}
