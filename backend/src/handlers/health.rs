//! Liveness endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;
use crate::store::StoreResult;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub environment: &'static str,
    pub version: &'static str,
}

pub async fn root() -> &'static str {
    "Barter Marketplace API Server"
}

/// GET /health - 503 when the store cannot be reached
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, database) = store_health(state.store.ping().await);

    (
        code,
        Json(HealthResponse {
            status,
            database,
            environment: state.environment.as_str(),
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Store errors stay in the logs; the endpoint is unauthenticated.
fn store_health(ping: StoreResult<()>) -> (StatusCode, &'static str, &'static str) {
    match ping {
        Ok(()) => (StatusCode::OK, "healthy", "connected"),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", "disconnected")
        }
    }
}
