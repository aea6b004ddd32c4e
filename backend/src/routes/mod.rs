//! Route definitions for the barter API

mod auth;
mod message;
mod trade;
mod user;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::health;
use crate::middleware;
use crate::state::AppState;
use crate::websocket;

pub use auth::auth_routes;
pub use message::message_routes;
pub use trade::trade_routes;
pub use user::user_routes;

/// Request bodies above this size are rejected with 413
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Builds the complete application: every route, the shared state and the
/// middleware stack.
pub fn create_router(state: AppState, cors_allowed_origins: Option<&str>) -> Router {
    let production = state.environment.is_production();

    let router = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/ws", get(websocket::ws_handler))
        .merge(auth_routes())
        .merge(user_routes())
        .merge(trade_routes())
        .merge(message_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(configure_cors(cors_allowed_origins))
                .layer(axum::middleware::from_fn(middleware::request_tracing))
                .layer(axum::middleware::from_fn(middleware::security_headers))
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        );

    if production {
        router.layer(axum::middleware::from_fn(middleware::hsts_header))
    } else {
        router
    }
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let allowed_origins = allowed_origins.unwrap_or_default().trim();

    if allowed_origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}
