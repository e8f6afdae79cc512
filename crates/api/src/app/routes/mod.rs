use axum::Router;

pub mod bills;
pub mod consistency;
pub mod masters;
pub mod payments;
pub mod receivables;
pub mod stock;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .nest("/products", masters::products_router())
        .nest("/parties", masters::parties_router())
        .nest("/stock", stock::router())
        .nest("/bills", bills::router())
        .nest("/payments", payments::router())
        .nest("/receivables", receivables::router())
        .nest("/consistency", consistency::router())
}
