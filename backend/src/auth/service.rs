//! User service - mirrors identity-provider subjects into local users

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use super::identity::VerifiedIdentity;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    RegisterRequest, ReviewVerificationRequest, SyncUserRequest, User, VerificationStatus,
};
use crate::store::{Repository, StoreError};

/// Display name given to users synced without one
const DEFAULT_USER_NAME: &str = "Trader";

pub struct UserService {
    store: Arc<dyn Repository>,
    starting_trade_points: i64,
}

impl UserService {
    pub fn new(store: Arc<dyn Repository>, starting_trade_points: i64) -> Self {
        Self {
            store,
            starting_trade_points,
        }
    }

    pub async fn find_by_subject(&self, subject: &str) -> ApiResult<Option<User>> {
        Ok(self.store.find_user_by_subject(subject).await?)
    }

    /// Creates the local user on first sight of a subject. Returns the
    /// user and whether it was created by this call; existing users are
    /// returned unchanged.
    pub async fn sync(
        &self,
        identity: &VerifiedIdentity,
        request: SyncUserRequest,
    ) -> ApiResult<(User, bool)> {
        request.validate()?;

        if let Some(existing) = self.store.find_user_by_subject(&identity.subject).await? {
            return Ok((existing, false));
        }

        let mut user = User::new(identity.subject.clone(), self.starting_trade_points);
        user.name = Some(
            request
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER_NAME.to_string()),
        );
        user.email = request.email;
        user.phone = request.phone;

        match self.store.insert_user(user).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, subject = %user.subject, "User synced");
                Ok((user, true))
            }
            // A concurrent sync won; hand back its record.
            Err(StoreError::Conflict(_)) => {
                let existing = self
                    .store
                    .find_user_by_subject(&identity.subject)
                    .await?
                    .ok_or_else(|| ApiError::Internal("User vanished after conflict".into()))?;
                Ok((existing, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Explicit registration with profile fields. Fails with a conflict if
    /// the subject already has a local user.
    pub async fn register(
        &self,
        identity: &VerifiedIdentity,
        request: RegisterRequest,
    ) -> ApiResult<User> {
        request.validate()?;

        if self
            .store
            .find_user_by_subject(&identity.subject)
            .await?
            .is_some()
        {
            return Err(ApiError::Conflict("User already registered".to_string()));
        }

        let mut user = User::new(identity.subject.clone(), self.starting_trade_points);
        user.name = request.name;
        user.email = request.email;
        user.phone = request.phone;
        user.address = request.address.unwrap_or_default();
        user.interests = request.interests;
        user.offerings = request.offerings;

        let user = self.store.insert_user(user).await.map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::Conflict("User already registered".to_string()),
            other => other.into(),
        })?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Records a login for an already registered subject.
    pub async fn login(&self, identity: &VerifiedIdentity) -> ApiResult<User> {
        let mut user = self
            .store
            .find_user_by_subject(&identity.subject)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound("User not found. Please register first".to_string())
            })?;

        let now = Utc::now();
        user.last_login = Some(now);
        user.updated_at = now;
        self.store.save_user(&user).await?;

        tracing::info!(user_id = %user.id, session_id = ?identity.session_id, "User logged in");
        Ok(user)
    }

    /// Admin decision on a user's verification. Only an approval makes the
    /// account eligible for gated actions.
    pub async fn review_verification(
        &self,
        reviewer: &User,
        user_id: Uuid,
        request: ReviewVerificationRequest,
    ) -> ApiResult<User> {
        let mut user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        let now = Utc::now();
        let approved = request.status == VerificationStatus::Approved;
        user.verification.status = request.status;
        user.verification.reviewed_at = Some(now);
        user.verification.reviewed_by = Some(reviewer.id);
        user.verification.rejection_reason = if approved {
            None
        } else {
            request.rejection_reason
        };
        user.is_verified = approved;
        user.updated_at = now;
        self.store.save_user(&user).await?;

        tracing::info!(
            user_id = %user.id,
            reviewer_id = %reviewer.id,
            status = ?user.verification.status,
            "Verification reviewed"
        );
        Ok(user)
    }
}
