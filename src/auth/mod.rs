//! Connection Authentication
//!
//! Runs once per connection, before the WebSocket upgrade is accepted:
//!
//! 1. Extract the bearer credential (`accessToken` query, `token` query,
//!    or `Authorization: Bearer` header, in that order)
//! 2. Verify its HS256 signature and expiry
//! 3. Resolve the caller's company scope through the identity service
//! 4. Normalize the scope (strip the trailing domain suffix)
//!
//! Any failure rejects the upgrade; no session exists for a failed handshake.

mod authenticator;
mod identity;
mod token;

pub use authenticator::{normalize_company, AuthenticatorConfig, ConnectionAuthenticator};
pub use identity::{HttpIdentityService, IdentityConfig, IdentityService};
pub use token::{extract_credential, Claims, TokenVerifier};

use thiserror::Error;

/// Per-connection attributes established by the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    /// Normalized company scope
    pub company: String,
    /// Caller identity (JWT subject)
    pub identity: String,
    pub role: String,
    /// Raw bearer credential
    pub token: String,
}

/// Handshake errors. Fatal to the connection attempt.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer credential")]
    MissingCredential,

    #[error("Invalid Authorization header")]
    InvalidAuthHeader,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("No company scope for identity {0}")]
    CompanyNotFound(String),

    #[error("Identity service timed out")]
    IdentityTimeout,

    #[error("Identity service error: {0}")]
    IdentityService(String),

    #[error("Insufficient role: {0}")]
    Forbidden(String),

    #[error("Internal auth error: {0}")]
    Internal(String),
}
