//! Store/engine wiring shared by all handlers.
//!
//! All state is in-memory; every handler reaches its engine through one
//! [`AppServices`] extension. Audit records and stock alerts go to the
//! tracing sinks.

use std::sync::Arc;

use rxledger_billing::{BillStore, BillingEngine, CompanyProfile};
use rxledger_catalog::{CatalogService, InMemoryCatalog};
use rxledger_consistency::ConsistencyScanner;
use rxledger_events::{AuditSink, NotificationSink, TracingAuditSink, TracingNotificationSink};
use rxledger_inventory::{BatchStore, StockLedger};
use rxledger_parties::{CounterpartyService, InMemoryDirectory};
use rxledger_receivables::{
    OutstandingLedger, PaymentService, PaymentStore, ReconcilePolicy,
};

pub struct AppServices {
    pub catalog: Arc<InMemoryCatalog>,
    pub parties: Arc<InMemoryDirectory>,
    pub ledger: Arc<StockLedger>,
    pub bills: Arc<BillStore>,
    pub billing: BillingEngine,
    pub payments: Arc<PaymentStore>,
    pub outstanding: Arc<OutstandingLedger>,
    pub payment_service: PaymentService,
    pub scanner: ConsistencyScanner,
    pub company: CompanyProfile,
}

pub fn build_services(company: CompanyProfile) -> AppServices {
    let catalog = Arc::new(InMemoryCatalog::new());
    let parties = Arc::new(InMemoryDirectory::new());
    let ledger = Arc::new(StockLedger::new(Arc::new(BatchStore::new())));
    let bills = Arc::new(BillStore::new());
    let payments = Arc::new(PaymentStore::new());

    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let notifications: Arc<dyn NotificationSink> = Arc::new(TracingNotificationSink);

    let catalog_svc: Arc<dyn CatalogService> = catalog.clone();
    let parties_svc: Arc<dyn CounterpartyService> = parties.clone();

    let billing = BillingEngine::new(
        catalog_svc.clone(),
        parties_svc,
        Arc::clone(&ledger),
        Arc::clone(&bills),
        audit.clone(),
        notifications,
        company.clone(),
    );

    let outstanding = Arc::new(OutstandingLedger::new(
        Arc::clone(&bills),
        Arc::clone(&payments),
        ReconcilePolicy::default(),
    ));
    let payment_service = PaymentService::new(
        Arc::clone(&payments),
        Arc::clone(&bills),
        Arc::clone(&outstanding),
        audit.clone(),
    );
    let scanner = ConsistencyScanner::new(
        catalog_svc,
        Arc::clone(&ledger),
        Arc::clone(&bills),
        Arc::clone(&payments),
        Arc::clone(&outstanding),
        audit,
    );

    AppServices {
        catalog,
        parties,
        ledger,
        bills,
        billing,
        payments,
        outstanding,
        payment_service,
        scanner,
        company,
    }
}
