//! Authentication error types.

use formhub_core::DomainError;
use thiserror::Error;

use crate::claims::TokenValidationError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing bearer token")]
    TokenMissing,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("crypto error: {0}")]
    Crypto(String),
}

impl From<TokenValidationError> for AuthError {
    fn from(err: TokenValidationError) -> Self {
        match err {
            TokenValidationError::Expired => AuthError::TokenExpired,
            other => AuthError::TokenInvalid(other.to_string()),
        }
    }
}

impl From<AuthError> for DomainError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Crypto(msg) => DomainError::internal(msg),
            other => DomainError::auth(other.to_string()),
        }
    }
}
