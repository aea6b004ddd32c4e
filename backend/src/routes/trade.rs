//! Trade route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::trade;
use crate::state::AppState;

/// Static segments are registered before `/:id` so they are not parsed as ids.
pub fn trade_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/trades",
            get(trade::list_trades).post(trade::create_trade),
        )
        .route("/api/trades/search", get(trade::search_trades))
        .route("/api/trades/recommendations", get(trade::recommendations))
        .route("/api/trades/wishlist", get(trade::wishlist))
        .route("/api/trades/mine", get(trade::my_trades))
        .route(
            "/api/trades/:id",
            get(trade::get_trade)
                .put(trade::update_trade)
                .delete(trade::delete_trade),
        )
        .route("/api/trades/:id/like", post(trade::toggle_like))
        .route("/api/trades/:id/wishlist", post(trade::toggle_wishlist))
}
