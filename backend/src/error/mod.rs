//! Centralized API error handling
//!
//! Every failure raised below the HTTP surface is converted into an
//! `ApiError`, which renders the `{success: false, message, ...}` envelope
//! with the matching status code.

use std::collections::BTreeMap;

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::auth::IdentityError;
use crate::models::VerificationStatus;
use crate::store::StoreError;

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Account verification required to perform this action")]
    VerificationRequired(VerificationStatus),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Validation failed")]
    Validation(BTreeMap<String, Vec<String>>),

    #[error("{0}")]
    Conflict(String),

    #[error("Identity provider unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// JSON error response body
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_status: Option<VerificationStatus>,
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::VerificationRequired(_) => "VERIFICATION_REQUIRED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::VerificationRequired(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to clients. Server-side failures never leak
    /// their cause here.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            ApiError::ServiceUnavailable(_) => "Service temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }

    /// Single-field validation failure
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), vec![message.into()]);
        ApiError::Validation(fields)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let detail = self.to_string();

        match &self {
            ApiError::Internal(_) | ApiError::ServiceUnavailable(_) => {
                tracing::error!(error = %detail, code = %code, "Server error occurred");
            }
            _ => {
                tracing::debug!(error = %detail, code = %code, "Client error occurred");
            }
        }

        let error = match &self {
            ApiError::Internal(_) | ApiError::ServiceUnavailable(_) if cfg!(debug_assertions) => {
                Some(detail)
            }
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            code,
            message: self.public_message(),
            error,
            errors: match &self {
                ApiError::Validation(fields) => Some(fields.clone()),
                _ => None,
            },
            verification_status: match &self {
                ApiError::VerificationRequired(status) => Some(*status),
                _ => None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => ApiError::Conflict(err.to_string()),
            StoreError::Database(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::KeyUnavailable(msg) => ApiError::ServiceUnavailable(msg),
            other => ApiError::Unauthenticated(other.to_string()),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self {
        let mut fields = BTreeMap::new();
        collect_field_errors(None, &err, &mut fields);
        ApiError::Validation(fields)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(format!("Invalid query parameters: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(format!("Invalid path parameter: {}", rejection.body_text()))
    }
}

/// Flattens nested validator output into `parent.child` keyed messages.
fn collect_field_errors(
    prefix: Option<&str>,
    errors: &ValidationErrors,
    out: &mut BTreeMap<String, Vec<String>>,
) {
    for (field, kind) in errors.errors() {
        let key = match prefix {
            Some(p) => format!("{}.{}", p, field),
            None => field.to_string(),
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                let messages = list
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect::<Vec<_>>();
                out.entry(key).or_default().extend(messages);
            }
            ValidationErrorsKind::Struct(inner) => collect_field_errors(Some(&key), inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_field_errors(Some(&format!("{}[{}]", key, index)), inner, out);
                }
            }
        }
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;
