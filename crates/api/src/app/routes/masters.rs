//! Product catalog and counterparty directory routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use rxledger_catalog::CatalogService;
use rxledger_core::{PartyId, ProductId};
use rxledger_parties::CounterpartyService;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn products_router() -> Router {
    Router::new()
        .route("/", post(create_product))
        .route("/:id", get(get_product))
}

pub fn parties_router() -> Router {
    Router::new()
        .route("/", post(create_party))
        .route("/:id", get(get_party))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ProductRequest>,
) -> axum::response::Response {
    let product = match body.into_product() {
        Ok(p) => p,
        Err(e) => return errors::domain_error_to_response(e),
    };
    services.catalog.upsert(product.clone());
    (StatusCode::CREATED, Json(product)).into_response()
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<ProductId>,
) -> axum::response::Response {
    match services.catalog.require_product(id) {
        Ok(p) => Json(p).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn create_party(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::PartyRequest>,
) -> axum::response::Response {
    let party = match body.into_party() {
        Ok(p) => p,
        Err(e) => return errors::domain_error_to_response(e),
    };
    services.parties.upsert(party.clone());
    (StatusCode::CREATED, Json(party)).into_response()
}

pub async fn get_party(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<PartyId>,
) -> axum::response::Response {
    match services.parties.require_counterparty(id) {
        Ok(p) => Json(p).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
