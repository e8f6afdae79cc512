//! Consistency scan/repair routes.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use rxledger_core::ActorContext;

use crate::app::errors;
use crate::app::services::AppServices;

const SWEEP_TIMEOUT: Duration = Duration::from_secs(30);

pub fn router() -> Router {
    Router::new()
        .route("/scan", get(scan))
        .route("/fix", post(fix_all))
}

pub async fn scan(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let task = tokio::task::spawn_blocking(move || services.scanner.scan());
    match tokio::time::timeout(SWEEP_TIMEOUT, task).await {
        Ok(Ok(issues)) => Json(issues).into_response(),
        Ok(Err(e)) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            e.to_string(),
        ),
        Err(_) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "consistency scan timed out",
        ),
    }
}

/// Repair every auto-fixable finding. Admin only: rewriting stored quantities
/// is not a routine operator action.
pub async fn fix_all(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
) -> axum::response::Response {
    if let Err(e) = actor.require_admin() {
        return errors::domain_error_to_response(e);
    }

    let task = tokio::task::spawn_blocking(move || services.scanner.auto_fix_all_issues(&actor));
    match tokio::time::timeout(SWEEP_TIMEOUT, task).await {
        Ok(Ok(report)) => Json(json!({
            "fixed": report.fixed,
            "skipped": report.skipped,
            "failed": report.failed,
        }))
        .into_response(),
        Ok(Err(e)) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            e.to_string(),
        ),
        Err(_) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "consistency sweep timed out",
        ),
    }
}
