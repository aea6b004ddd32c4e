//! User profile handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use crate::auth::UserService;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AdminUser, AuthenticatedIdentity, CurrentUser};
use crate::models::{
    ApiResponse, ReviewVerificationRequest, SyncUserRequest, UserPayload, UserWithMessage,
};

/// GET /api/users/me and /api/users/profile
pub async fn get_current_user(CurrentUser(user): CurrentUser) -> Json<ApiResponse<UserPayload>> {
    Json(ApiResponse::ok(UserPayload { user }))
}

/// POST /api/users/sync - Mirror the token subject into a local user.
/// Answers 201 the first time and 200 afterwards. The body is optional.
pub async fn sync_user(
    State(users): State<Arc<UserService>>,
    AuthenticatedIdentity(identity): AuthenticatedIdentity,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ApiResponse<UserWithMessage>>)> {
    let request = parse_sync_body(&body)?;
    let (user, created) = users.sync(&identity, request).await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(ApiResponse::ok(UserWithMessage {
            message: "User synced successfully".to_string(),
            user,
        })),
    ))
}

/// Empty body means "no profile hints"; anything else must be valid JSON.
fn parse_sync_body(body: &[u8]) -> ApiResult<SyncUserRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SyncUserRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))
}

/// POST /api/users/:id/verification - Admin decision on a user's documents
pub async fn review_verification(
    State(users): State<Arc<UserService>>,
    AdminUser(admin): AdminUser,
    WithRejection(Path(user_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(request), _): WithRejection<Json<ReviewVerificationRequest>, ApiError>,
) -> ApiResult<Json<ApiResponse<UserPayload>>> {
    let user = users.review_verification(&admin, user_id, request).await?;
    Ok(Json(ApiResponse::ok(UserPayload { user })))
}
