//! Batch and stock-ledger routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use rxledger_core::{BatchId, ProductId};
use rxledger_inventory::{Batch, MovementKind, MovementRef, Posting};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/batches", post(create_batch))
        .route("/batches/:id", get(get_batch))
        .route("/batches/:id/movements", get(batch_movements))
        .route("/movements", post(post_movement).get(list_movements))
        .route("/on-hand/:product_id", get(on_hand))
}

/// Register a batch. Any opening quantity is posted as an opening-stock
/// movement so the batch is born consistent with the ledger.
pub async fn create_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::BatchRequest>,
) -> axum::response::Response {
    let batch = match Batch::new(
        BatchId::new(),
        body.product_id,
        body.batch_no.clone(),
        body.expiry,
        0,
        body.pricing(),
    ) {
        Ok(b) => b,
        Err(e) => return errors::domain_error_to_response(e),
    };
    if body.opening_quantity < 0 {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "opening quantity cannot be negative",
        );
    }
    if let Err(e) = services.ledger.batch_store().insert(batch.clone()) {
        return errors::domain_error_to_response(e);
    }

    if body.opening_quantity > 0 {
        let posting = Posting {
            product_id: body.product_id,
            batch_id: batch.id,
            kind: MovementKind::PurchaseIn,
            delta: body.opening_quantity,
            godown: None,
        };
        let reference = MovementRef::Manual(format!("opening:{}", body.batch_no));
        if let Err(e) = services.ledger.post_movement(posting, reference) {
            return errors::domain_error_to_response(e);
        }
    }

    match services.ledger.batch_store().require(batch.id) {
        Ok(b) => (StatusCode::CREATED, Json(b)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<BatchId>,
) -> axum::response::Response {
    match services.ledger.batch_store().require(id) {
        Ok(b) => Json(b).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn batch_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<BatchId>,
) -> axum::response::Response {
    Json(services.ledger.movements_for_batch(id)).into_response()
}

/// Manual posting: stocktake adjustment, expiry write-off, godown transfer.
pub async fn post_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::MovementRequest>,
) -> axum::response::Response {
    let posting = Posting {
        product_id: body.product_id,
        batch_id: body.batch_id,
        kind: body.kind,
        delta: body.delta,
        godown: body.godown,
    };
    match services
        .ledger
        .post_movement(posting, MovementRef::Manual(body.reason))
    {
        Ok(row) => (StatusCode::CREATED, Json(row)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::MovementQuery>,
) -> axum::response::Response {
    let rows = match (query.batch_id, query.product_id) {
        (Some(batch_id), _) => services.ledger.movements_for_batch(batch_id),
        (None, Some(product_id)) => services.ledger.movements_for_product(product_id),
        (None, None) => services.ledger.all_movements(),
    };
    Json(rows).into_response()
}

pub async fn on_hand(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<ProductId>,
) -> axum::response::Response {
    let on_hand = services.ledger.batch_store().on_hand(product_id);
    Json(json!({ "product_id": product_id, "on_hand": on_hand })).into_response()
}
