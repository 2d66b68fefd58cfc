//! Top-level axum application.

use std::time::Duration;

use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::billing::{billing_router, BillingAppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// The complete service: health check, billing API and webhook intake,
/// with request tracing and a per-request timeout.
pub fn app_router(state: BillingAppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(billing_router())
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
