//! Authentication configuration.

/// Configuration for credential and session handling.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for HS256 session tokens.
    pub jwt_secret: String,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Session lifetime in seconds (default: 604_800 = 7 days).
    pub session_lifetime_secs: u64,
    /// Optional pepper prepended to passwords before Argon2id hashing.
    pub pepper: Option<String>,
    /// Minimum password length for policy enforcement.
    pub min_password_length: usize,
    /// Password reset token lifetime in seconds (default: 1_800 = 30 minutes).
    pub reset_token_lifetime_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_issuer: "formhub".into(),
            session_lifetime_secs: 604_800,
            pepper: None,
            min_password_length: 6,
            reset_token_lifetime_secs: 1_800,
        }
    }
}
