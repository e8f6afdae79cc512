//! Billing document routes.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use rxledger_core::{ActorContext, BillId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Finalize and cancel walk the stock ledger under its locks; run them off
/// the async workers and bound them like the sweeps.
const STOCK_OP_TIMEOUT: Duration = Duration::from_secs(30);

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_draft).get(list_bills))
        .route("/:id", get(get_bill).put(update_draft).delete(delete_bill))
        .route("/:id/finalize", post(finalize_bill))
        .route("/:id/cancel", post(cancel_bill))
        .route("/:id/override", post(override_bill))
        .route("/:id/print", get(print_bill))
        .route("/:id/versions", get(bill_versions))
}

pub async fn create_draft(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::BillRequest>,
) -> axum::response::Response {
    let (header, lines) = body.into_draft();
    match services.billing.create_draft(&actor, header, lines) {
        Ok(bill) => (StatusCode::CREATED, Json(bill)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn update_draft(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<BillId>,
    Json(body): Json<dto::BillRequest>,
) -> axum::response::Response {
    let (header, lines) = body.into_draft();
    match services.billing.update_draft(&actor, id, header, lines) {
        Ok(bill) => Json(bill).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn list_bills(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    Json(services.bills.list()).into_response()
}

pub async fn get_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<BillId>,
) -> axum::response::Response {
    match services.billing.bill(id) {
        Ok(bill) => Json(bill).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn finalize_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<BillId>,
) -> axum::response::Response {
    let today = Utc::now().date_naive();
    let task = tokio::task::spawn_blocking(move || services.billing.finalize(&actor, id, today));
    match tokio::time::timeout(STOCK_OP_TIMEOUT, task).await {
        Ok(Ok(Ok(bill))) => Json(bill).into_response(),
        Ok(Ok(Err(e))) => errors::domain_error_to_response(e),
        Ok(Err(e)) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            e.to_string(),
        ),
        Err(_) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "finalize timed out",
        ),
    }
}

pub async fn cancel_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<BillId>,
    Json(body): Json<dto::CancelRequest>,
) -> axum::response::Response {
    let task = tokio::task::spawn_blocking(move || services.billing.cancel(&actor, id, body.reason));
    match tokio::time::timeout(STOCK_OP_TIMEOUT, task).await {
        Ok(Ok(Ok(bill))) => Json(bill).into_response(),
        Ok(Ok(Err(e))) => errors::domain_error_to_response(e),
        Ok(Err(e)) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            e.to_string(),
        ),
        Err(_) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "cancel timed out",
        ),
    }
}

pub async fn delete_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<BillId>,
    Query(query): Query<dto::DeleteQuery>,
) -> axum::response::Response {
    let reason = query.reason.unwrap_or_default();
    match services.billing.delete(&actor, id, reason, query.force) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn override_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<BillId>,
    Json(body): Json<dto::OverrideRequest>,
) -> axum::response::Response {
    let (patch, reason) = body.into_patch();
    match services.billing.admin_override(&actor, id, patch, reason) {
        Ok(bill) => Json(bill).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn print_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<BillId>,
) -> axum::response::Response {
    match services.billing.printable(id) {
        Ok(printable) => Json(printable).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn bill_versions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<BillId>,
) -> axum::response::Response {
    Json(services.billing.audit_versions(id)).into_response()
}
