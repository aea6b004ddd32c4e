//! Authentication HTTP handlers
//!
//! Sign-in itself happens at the identity provider. These endpoints only
//! bootstrap the local user behind a verified token.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::WithRejection;

use crate::auth::UserService;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AuthenticatedIdentity, CurrentUser};
use crate::models::{
    ApiResponse, MessagePayload, RegisterRequest, UserPayload, UserWithMessage,
};

/// POST /api/auth/register - Create the local user with profile fields
pub async fn register(
    State(users): State<Arc<UserService>>,
    AuthenticatedIdentity(identity): AuthenticatedIdentity,
    WithRejection(Json(request), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> ApiResult<(StatusCode, Json<ApiResponse<UserWithMessage>>)> {
    let user = users.register(&identity, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(UserWithMessage {
            message: "User registered successfully".to_string(),
            user,
        })),
    ))
}

/// POST /api/auth/login - Record a login for a registered user
pub async fn login(
    State(users): State<Arc<UserService>>,
    AuthenticatedIdentity(identity): AuthenticatedIdentity,
) -> ApiResult<Json<ApiResponse<UserWithMessage>>> {
    let user = users.login(&identity).await?;

    Ok(Json(ApiResponse::ok(UserWithMessage {
        message: "Login successful".to_string(),
        user,
    })))
}

/// POST /api/auth/logout - Sessions live at the provider, nothing to revoke
pub async fn logout() -> Json<ApiResponse<MessagePayload>> {
    Json(ApiResponse::ok(MessagePayload::new("Logout successful")))
}

/// GET /api/auth/verify-token
pub async fn verify_token(
    CurrentUser(user): CurrentUser,
) -> Json<ApiResponse<UserPayload>> {
    Json(ApiResponse::ok(UserPayload { user }))
}
