//! Middleware for the barter API
//!
//! Request tracing, security headers and the access-control extractors.

pub mod auth;
mod security;
mod tracing;

pub use auth::{
    require_admin, require_verified, AdminUser, AuthenticatedIdentity, CurrentUser, VerifiedUser,
};
pub use security::{hsts_header, security_headers};
pub use tracing::request_tracing;
