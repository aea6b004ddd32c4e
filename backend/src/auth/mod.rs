//! Authentication module
//!
//! Bearer tokens are issued by an external identity provider. This module
//! verifies them and maps the provider's subject onto a local user.
//! - Token verification (shared secret, PEM public key or JWKS)
//! - User sync, registration and login
//! - Verification review by administrators

mod identity;
mod service;

pub use identity::{
    IdentityClaims, IdentityError, IdentityVerifier, JwtIdentityVerifier, VerifiedIdentity,
};
pub use service::UserService;
