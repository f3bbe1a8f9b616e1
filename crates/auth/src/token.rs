//! HS256 session tokens.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::account::Account;
use crate::claims::{JwtClaims, validate_claims};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::roles::Role;

/// A freshly signed session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Verifies a bearer token and yields its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, AuthError>;
}

/// Signs session tokens for authenticated accounts.
#[derive(Clone)]
pub struct Hs256JwtIssuer {
    key: EncodingKey,
    issuer: String,
    lifetime: Duration,
}

impl Hs256JwtIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
            lifetime: Duration::seconds(config.session_lifetime_secs as i64),
        }
    }

    pub fn issue(&self, account: &Account, now: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let managed = account.role == Role::ManagedUser;
        let claims = JwtClaims {
            sub: account.id,
            role: account.role,
            tenant_id: if managed { account.tenant_id } else { None },
            assigned_forms: if managed {
                account.assigned_forms.clone()
            } else {
                Vec::new()
            },
            iss: self.issuer.clone(),
            issued_at: now,
            expires_at: now + self.lifetime,
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))?;
        Ok(IssuedToken {
            token,
            expires_at: claims.expires_at,
        })
    }
}

/// Verifies HS256 tokens signed with the shared secret.
#[derive(Clone)]
pub struct Hs256JwtValidator {
    key: DecodingKey,
    issuer: String,
}

impl Hs256JwtValidator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);
        // Time window is checked against the caller's clock below.
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid(e.to_string()),
            })?;

        validate_claims(&claims, now)?;
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formhub_core::{FormId, TenantId};

    fn config(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: secret.into(),
            ..AuthConfig::default()
        }
    }

    fn owner() -> Account {
        Account::tenant_owner("acme", "owner@acme.test", "hash".into(), Utc::now())
    }

    #[test]
    fn issued_token_validates() {
        let cfg = config("s3cret");
        let now = Utc::now();
        let account = owner();
        let issued = Hs256JwtIssuer::new(&cfg).issue(&account, now).unwrap();
        let claims = Hs256JwtValidator::new(&cfg).validate(&issued.token, now).unwrap();
        assert_eq!(claims.sub, account.id);
        assert_eq!(claims.role, Role::TenantOwner);
        assert_eq!(claims.expires_at.timestamp(), (now + Duration::days(7)).timestamp());
    }

    #[test]
    fn managed_user_token_carries_tenant_and_snapshot() {
        let cfg = config("s3cret");
        let tenant = TenantId::new();
        let mut user = Account::managed_user(tenant, "bob", "bob@acme.test", None, Utc::now());
        let form = FormId::new();
        user.assign_form(form);
        let now = Utc::now();
        let issued = Hs256JwtIssuer::new(&cfg).issue(&user, now).unwrap();
        let claims = Hs256JwtValidator::new(&cfg).validate(&issued.token, now).unwrap();
        assert_eq!(claims.tenant_id, Some(tenant));
        assert_eq!(claims.assigned_forms, vec![form]);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let issued = Hs256JwtIssuer::new(&config("one")).issue(&owner(), now).unwrap();
        let err = Hs256JwtValidator::new(&config("two"))
            .validate(&issued.token, now)
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let cfg = config("s3cret");
        let now = Utc::now();
        let issued = Hs256JwtIssuer::new(&cfg).issue(&owner(), now).unwrap();
        let err = Hs256JwtValidator::new(&cfg)
            .validate(&issued.token, now + Duration::days(8))
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = Hs256JwtValidator::new(&config("s3cret"))
            .validate("not.a.jwt", Utc::now())
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(_)));
    }
}
