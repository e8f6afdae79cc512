//! Payment routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post},
};
use serde_json::json;

use rxledger_core::{ActorContext, PaymentId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_payment))
        .route("/:id", delete(delete_payment))
        .route("/:id/clear", post(clear_cheque))
        .route("/:id/bounce", post(bounce_cheque))
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::PaymentRequest>,
) -> axum::response::Response {
    match services
        .payment_service
        .record_payment(&actor, body.into_new_payment())
    {
        Ok((payment, recon)) => (
            StatusCode::CREATED,
            Json(json!({ "payment": payment, "reconciliation": recon })),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn delete_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<PaymentId>,
) -> axum::response::Response {
    match services.payment_service.delete_payment(&actor, id) {
        Ok(recon) => Json(recon).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn clear_cheque(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<PaymentId>,
) -> axum::response::Response {
    match services.payment_service.clear_cheque(&actor, id) {
        Ok(recon) => Json(recon).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn bounce_cheque(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<PaymentId>,
) -> axum::response::Response {
    match services.payment_service.bounce_cheque(&actor, id) {
        Ok(recon) => Json(recon).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
