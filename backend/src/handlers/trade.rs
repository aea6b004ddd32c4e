//! Trade listing HTTP handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::{CurrentUser, VerifiedUser};
use crate::models::{ApiResponse, MessagePayload};
use crate::trade::{
    CreateTradeRequest, LikePayload, ListTradesQuery, OwnTradesQuery, SearchTradesQuery,
    TradeListPayload, TradePayload, TradeSearchPayload, TradeService, TradeWithMessage,
    TradeView, TradesPayload, UpdateTradeRequest, WishlistPayload,
};

/// GET /api/trades
pub async fn list_trades(
    State(trades): State<Arc<TradeService>>,
    WithRejection(Query(query), _): WithRejection<Query<ListTradesQuery>, ApiError>,
) -> ApiResult<Json<ApiResponse<TradeListPayload>>> {
    let payload = trades.list(query).await?;
    Ok(Json(ApiResponse::ok(payload)))
}

/// GET /api/trades/search - Text and radius search
pub async fn search_trades(
    State(trades): State<Arc<TradeService>>,
    WithRejection(Query(query), _): WithRejection<Query<SearchTradesQuery>, ApiError>,
) -> ApiResult<Json<ApiResponse<TradeSearchPayload>>> {
    let found = trades.search(query).await?;
    let count = found.len();
    Ok(Json(ApiResponse::ok(TradeSearchPayload {
        trades: trades.present(found).await?,
        count,
    })))
}

/// GET /api/trades/:id - Also counts a view
pub async fn get_trade(
    State(trades): State<Arc<TradeService>>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Json<ApiResponse<TradePayload>>> {
    let trade = trades.get(id).await?;
    Ok(Json(ApiResponse::ok(TradePayload {
        trade: trades.present_one(trade).await?,
    })))
}

/// POST /api/trades
pub async fn create_trade(
    State(trades): State<Arc<TradeService>>,
    VerifiedUser(user): VerifiedUser,
    WithRejection(Json(request), _): WithRejection<Json<CreateTradeRequest>, ApiError>,
) -> ApiResult<(StatusCode, Json<ApiResponse<TradeWithMessage>>)> {
    let trade = trades.create(&user, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(TradeWithMessage {
            message: "Trade created successfully".to_string(),
            trade: TradeView {
                trade,
                owner: Some(user.summary()),
            },
        })),
    ))
}

/// PUT /api/trades/:id
pub async fn update_trade(
    State(trades): State<Arc<TradeService>>,
    VerifiedUser(user): VerifiedUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateTradeRequest>, ApiError>,
) -> ApiResult<Json<ApiResponse<TradeWithMessage>>> {
    let trade = trades.update(&user, id, request).await?;

    Ok(Json(ApiResponse::ok(TradeWithMessage {
        message: "Trade updated successfully".to_string(),
        trade: TradeView {
            trade,
            owner: Some(user.summary()),
        },
    })))
}

/// DELETE /api/trades/:id
pub async fn delete_trade(
    State(trades): State<Arc<TradeService>>,
    VerifiedUser(user): VerifiedUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Json<ApiResponse<MessagePayload>>> {
    trades.delete(&user, id).await?;
    Ok(Json(ApiResponse::ok(MessagePayload::new(
        "Trade deleted successfully",
    ))))
}

/// POST /api/trades/:id/like
pub async fn toggle_like(
    State(trades): State<Arc<TradeService>>,
    CurrentUser(user): CurrentUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Json<ApiResponse<LikePayload>>> {
    let payload = trades.toggle_like(&user, id).await?;
    Ok(Json(ApiResponse::ok(payload)))
}

/// POST /api/trades/:id/wishlist
pub async fn toggle_wishlist(
    State(trades): State<Arc<TradeService>>,
    CurrentUser(user): CurrentUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Json<ApiResponse<WishlistPayload>>> {
    let payload = trades.toggle_wishlist(&user, id).await?;
    Ok(Json(ApiResponse::ok(payload)))
}

/// GET /api/trades/recommendations
pub async fn recommendations(
    State(trades): State<Arc<TradeService>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<ApiResponse<TradesPayload>>> {
    let found = trades.recommendations(&user).await?;
    Ok(Json(ApiResponse::ok(TradesPayload {
        trades: trades.present(found).await?,
    })))
}

/// GET /api/trades/wishlist
pub async fn wishlist(
    State(trades): State<Arc<TradeService>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<ApiResponse<TradesPayload>>> {
    let found = trades.wishlist(&user).await?;
    Ok(Json(ApiResponse::ok(TradesPayload {
        trades: trades.present(found).await?,
    })))
}

/// GET /api/trades/mine
pub async fn my_trades(
    State(trades): State<Arc<TradeService>>,
    CurrentUser(user): CurrentUser,
    WithRejection(Query(query), _): WithRejection<Query<OwnTradesQuery>, ApiError>,
) -> ApiResult<Json<ApiResponse<TradesPayload>>> {
    let found = trades.mine(&user, query.status).await?;
    Ok(Json(ApiResponse::ok(TradesPayload {
        trades: trades.present(found).await?,
    })))
}
