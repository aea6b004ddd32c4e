//! User route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::user;
use crate::state::AppState;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users/me", get(user::get_current_user))
        .route("/api/users/profile", get(user::get_current_user))
        .route("/api/users/sync", post(user::sync_user))
        .route("/api/users/:id/verification", post(user::review_verification))
}
