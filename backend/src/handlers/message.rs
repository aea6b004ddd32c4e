//! Messaging HTTP handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::messaging::{
    ConversationPayload, ConversationsPayload, MessagingService, SendMessageRequest, SentMessage,
    StartConversationRequest, Thread,
};
use crate::middleware::{CurrentUser, VerifiedUser};
use crate::models::{ApiResponse, MessagePayload};

/// GET /api/messages/conversations
pub async fn list_conversations(
    State(messaging): State<Arc<MessagingService>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<ApiResponse<ConversationsPayload>>> {
    let conversations = messaging.list_conversations(&user).await?;
    Ok(Json(ApiResponse::ok(ConversationsPayload { conversations })))
}

/// POST /api/messages/conversations - Start or reuse a trade conversation
pub async fn start_conversation(
    State(messaging): State<Arc<MessagingService>>,
    VerifiedUser(user): VerifiedUser,
    WithRejection(Json(request), _): WithRejection<Json<StartConversationRequest>, ApiError>,
) -> ApiResult<Json<ApiResponse<ConversationPayload>>> {
    let conversation = messaging.start(&user, request).await?;
    Ok(Json(ApiResponse::ok(ConversationPayload { conversation })))
}

/// GET /api/messages/thread/:conversationId - Marks the thread read
pub async fn get_thread(
    State(messaging): State<Arc<MessagingService>>,
    CurrentUser(user): CurrentUser,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Json<ApiResponse<Thread>>> {
    let thread = messaging.fetch_thread(&user, conversation_id).await?;
    Ok(Json(ApiResponse::ok(thread)))
}

/// POST /api/messages
pub async fn send_message(
    State(messaging): State<Arc<MessagingService>>,
    VerifiedUser(user): VerifiedUser,
    WithRejection(Json(request), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> ApiResult<(StatusCode, Json<ApiResponse<SentMessage>>)> {
    let sent = messaging.send(&user, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(sent))))
}

/// DELETE /api/messages/:messageId
pub async fn delete_message(
    State(messaging): State<Arc<MessagingService>>,
    CurrentUser(user): CurrentUser,
    WithRejection(Path(message_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Json<ApiResponse<MessagePayload>>> {
    messaging.delete_message(&user, message_id).await?;
    Ok(Json(ApiResponse::ok(MessagePayload::new(
        "Message deleted successfully",
    ))))
}
