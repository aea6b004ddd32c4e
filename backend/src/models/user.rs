//! User records mirrored from the identity provider

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Local user record keyed by the identity provider's subject id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    /// Stable subject identifier issued by the identity provider
    pub subject: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub address: Address,
    pub interests: Vec<String>,
    pub offerings: Vec<String>,
    pub is_verified: bool,
    pub verification: Verification,
    pub trade_points: i64,
    pub rating: Rating,
    pub role: UserRole,
    pub profile_image: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Fresh record for a subject that has never been seen before.
    pub fn new(subject: impl Into<String>, starting_points: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subject: subject.into(),
            email: None,
            phone: None,
            name: None,
            address: Address::default(),
            interests: Vec::new(),
            offerings: Vec::new(),
            is_verified: false,
            verification: Verification::default(),
            trade_points: starting_points,
            rating: Rating::default(),
            role: UserRole::User,
            profile_image: None,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the account may create or change trades and send messages.
    pub fn can_trade(&self) -> bool {
        self.is_verified && self.verification.status == VerificationStatus::Approved
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Superadmin)
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            profile_image: self.profile_image.clone(),
            rating: self.rating,
        }
    }
}

/// Public projection of a user embedded in other resources
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub profile_image: Option<String>,
    pub rating: Rating,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub status: VerificationStatus,
    pub phone_verified: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
}

/// Stored average rating; no reputation is computed here.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub average: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "verification_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Merchant,
    Admin,
    Superadmin,
}

/// Body of `POST /api/users/sync`
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncUserRequest {
    #[validate(length(max = 100))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Body of `POST /api/auth/register`
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub interests: Vec<String>,
    pub offerings: Vec<String>,
}

/// Body of `POST /api/users/:id/verification`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewVerificationRequest {
    pub status: VerificationStatus,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserPayload {
    pub user: User,
}

/// User plus a human readable outcome, as returned by register, login and sync
#[derive(Debug, Serialize)]
pub struct UserWithMessage {
    pub message: String,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_cannot_trade() {
        let user = User::new("user_2abc", 100);
        assert_eq!(user.trade_points, 100);
        assert_eq!(user.verification.status, VerificationStatus::Pending);
        assert!(!user.can_trade());
    }

    #[test]
    fn test_can_trade_requires_flag_and_approval() {
        let mut user = User::new("user_2abc", 0);
        user.is_verified = true;
        assert!(!user.can_trade());

        user.verification.status = VerificationStatus::Approved;
        assert!(user.can_trade());

        user.is_verified = false;
        assert!(!user.can_trade());
    }

    #[test]
    fn test_admin_roles() {
        let mut user = User::new("user_2abc", 0);
        assert!(!user.is_admin());
        user.role = UserRole::Superadmin;
        assert!(user.is_admin());
        user.role = UserRole::Merchant;
        assert!(!user.is_admin());
    }

    #[test]
    fn test_verification_status_wire_format() {
        assert_eq!(
            serde_json::to_value(VerificationStatus::UnderReview).unwrap(),
            "under_review"
        );
    }
}
