use rxledger_billing::CompanyProfile;

#[tokio::main]
async fn main() {
    rxledger_observability::init();

    let state_code = std::env::var("RXLEDGER_STATE_CODE").unwrap_or_else(|_| {
        tracing::warn!("RXLEDGER_STATE_CODE not set; defaulting to 27 (Maharashtra)");
        "27".to_string()
    });
    let expiry_horizon_days = std::env::var("RXLEDGER_EXPIRY_HORIZON_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(90);
    let addr = std::env::var("RXLEDGER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let app = rxledger_api::app::build_app(CompanyProfile {
        state_code,
        expiry_horizon_days,
    });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {addr}: {e}"));

    tracing::info!("listening on {addr}");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server exited");
    }
}
