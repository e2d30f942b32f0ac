use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::error::Result;
use crate::state::AppState;

/// Health response structure
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub credentials: String,
    pub timestamp: String,
}

/// Health routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// GET /health - Store and signer readiness
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let store_status = match state.registry.health_check().await {
        Ok(true) => "connected",
        Ok(false) => "error",
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            "disconnected"
        }
    };

    // Missing signer config fails joins only
    let credentials_status = if state.coordinator.issuer_configured() {
        "ready"
    } else {
        "not_configured"
    };

    let overall_status = if store_status == "connected" && credentials_status == "ready" {
        "healthy"
    } else {
        "degraded"
    };

    Ok(Json(HealthResponse {
        status: overall_status.to_string(),
        store: store_status.to_string(),
        credentials: credentials_status.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}
