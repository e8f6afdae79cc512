//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/engine wiring shared by all handlers
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request DTOs and their mapping into domain types
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use rxledger_billing::CompanyProfile;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(company: CompanyProfile) -> Router {
    let services = Arc::new(services::build_services(company));

    // Everything except the health probe requires actor headers.
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn(middleware::actor_middleware))
            .layer(Extension(services)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}
