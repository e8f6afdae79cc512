//! Outstanding/aging routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/aging", get(aging_report))
        .route("/reconcile", post(reconcile_all))
}

pub async fn aging_report(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::AgingQuery>,
) -> axum::response::Response {
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    Json(services.outstanding.aging_report(as_of)).into_response()
}

/// Sweep every finalized bill and re-derive its paid state. Walks all stores,
/// so it runs off the async workers.
pub async fn reconcile_all(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let task = tokio::task::spawn_blocking(move || services.outstanding.auto_reconcile_all_bills());
    match task.await {
        Ok(changed) => Json(changed).into_response(),
        Err(e) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            e.to_string(),
        ),
    }
}
