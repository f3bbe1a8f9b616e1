//! Authentication and authorization boundary.
//!
//! Decoupled from HTTP and storage: credentials, tokens, accounts and the
//! pure access guard live here; persistence and transport live elsewhere.

pub mod account;
pub mod authorize;
pub mod claims;
pub mod config;
pub mod error;
pub mod password;
pub mod principal;
pub mod reset;
pub mod roles;
pub mod token;

pub use account::{Account, PasswordReset};
pub use authorize::{AccessRequest, AuthzError, authorize, authorize_public};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use config::AuthConfig;
pub use error::AuthError;
pub use principal::Principal;
pub use roles::Role;
pub use token::{Hs256JwtIssuer, Hs256JwtValidator, IssuedToken, JwtValidator};
