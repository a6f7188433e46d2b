//! Authentication
//!
//! Bearer-token identity resolution and password hashing.
//!
//! - **jwt**: HS256 token issuance and validation ([`JwtAuthority`])
//! - **password**: Argon2 password hashing
//! - **credential**: Pulling the bearer credential out of a request
//!
//! The hub never sees tokens; it only receives the [`Identity`] produced by
//! an [`IdentityResolver`] when a connection is accepted.

pub mod credential;
pub mod jwt;
pub mod password;

use thiserror::Error;

pub use crate::store::Identity;
pub use credential::{bearer_from_headers, credential_from_request};
pub use jwt::{load_or_generate_secret, Claims, JwtAuthority};
pub use password::{hash_password, verify_password};

/// Resolves a bearer credential to a stable user identity
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// Authentication failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing credential")]
    MissingCredential,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token: missing user information")]
    MissingClaims,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Signing key error: {0}")]
    Key(#[from] std::io::Error),
}
