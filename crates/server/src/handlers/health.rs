//! Liveness endpoint.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub metadata: &'static str,
    pub version: &'static str,
}

/// GET /v1/health - Health check.
///
/// Unauthenticated so probes and load balancers can call it. Reports the
/// metadata store separately instead of failing the whole request.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let metadata = match state.metadata.health_check().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "metadata health check failed");
            "error"
        }
    };

    Json(HealthResponse {
        status: "ok",
        metadata,
        version: env!("CARGO_PKG_VERSION"),
    })
}
