//! Error types for the User Management application

use thiserror::Error;

/// Authentication error taxonomy
///
/// Expected failures (`InvalidCredentials`, token problems) are ordinary
/// values. Storage variants carry a diagnostic for logs only; it must never
/// be echoed to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown user or wrong password; both render the same message.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    /// User directory could not be reached
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Auth log append or query failed
    #[error("Auth log unavailable: {0}")]
    AuthLogUnavailable(String),

    #[error("Password hashing timed out")]
    HashingTimeout,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Token validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid signature")]
    InvalidSignature,

    /// Undecodable token or a required claim is absent
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Token could not be issued
    #[error("Failed to issue token: {0}")]
    Issue(String),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::InvalidSignature => AuthError::TokenInvalid("invalid signature".to_string()),
            TokenError::Malformed(msg) => AuthError::TokenInvalid(msg),
            TokenError::Issue(msg) => AuthError::Internal(msg),
        }
    }
}
