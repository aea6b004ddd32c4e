//! Messaging route definitions

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers::message;
use crate::state::AppState;

pub fn message_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/messages/conversations",
            get(message::list_conversations).post(message::start_conversation),
        )
        .route(
            "/api/messages/thread/:conversation_id",
            get(message::get_thread),
        )
        .route("/api/messages", post(message::send_message))
        .route("/api/messages/:message_id", delete(message::delete_message))
}
