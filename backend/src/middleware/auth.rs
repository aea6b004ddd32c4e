//! Authentication middleware
//!
//! Extractors that turn a bearer token into a verified identity and then
//! into a local user. Handlers receive the resolved user explicitly.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::auth::{IdentityVerifier, UserService, VerifiedIdentity};
use crate::error::{ApiError, ApiResult};
use crate::models::User;

/// Identity proven by a valid bearer token. The subject may not have a
/// local user yet.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity(pub VerifiedIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedIdentity
where
    Arc<dyn IdentityVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    ApiError::Unauthenticated(
                        "Authorization header with Bearer token required".to_string(),
                    )
                })?;

        let verifier = Arc::<dyn IdentityVerifier>::from_ref(state);
        let identity = verifier.verify(bearer.token()).await?;

        Ok(AuthenticatedIdentity(identity))
    }
}

/// Synced local user behind the bearer token
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    Arc<dyn IdentityVerifier>: FromRef<S>,
    Arc<UserService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedIdentity(identity) =
            AuthenticatedIdentity::from_request_parts(parts, state).await?;

        let users = Arc::<UserService>::from_ref(state);
        let user = users
            .find_by_subject(&identity.subject)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(
                    "User not found. Please call /api/users/sync first".to_string(),
                )
            })?;

        if !user.is_active {
            return Err(ApiError::Forbidden("Account is deactivated".to_string()));
        }

        Ok(CurrentUser(user))
    }
}

/// User allowed to perform gated trade and message actions
#[derive(Debug, Clone)]
pub struct VerifiedUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for VerifiedUser
where
    Arc<dyn IdentityVerifier>: FromRef<S>,
    Arc<UserService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        require_verified(&user)?;
        Ok(VerifiedUser(user))
    }
}

/// User with the admin or superadmin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    Arc<dyn IdentityVerifier>: FromRef<S>,
    Arc<UserService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        require_admin(&user)?;
        Ok(AdminUser(user))
    }
}

/// Fails with the user's current verification status unless they may trade.
pub fn require_verified(user: &User) -> ApiResult<()> {
    if user.can_trade() {
        Ok(())
    } else {
        Err(ApiError::VerificationRequired(user.verification.status))
    }
}

pub fn require_admin(user: &User) -> ApiResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Admin access required".to_string()))
    }
}
