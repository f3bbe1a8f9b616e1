use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use formhub_core::{FormId, PrincipalId, TenantId};

use crate::Role;

/// JWT claims model.
///
/// `assigned_forms` is a snapshot taken at issue time. It is advisory only:
/// access decisions re-read the live account record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / principal identifier.
    pub sub: PrincipalId,

    /// Principal variant.
    pub role: Role,

    /// Owning tenant (managed users only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assigned_forms: Vec<FormId>,

    pub iss: String,

    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("managed user token without tenant")]
    MissingTenant,
}

/// Deterministically validate JWT claims.
///
/// Signature verification happens in [`crate::token`]; this checks the claim
/// values only.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    if claims.role == Role::ManagedUser && claims.tenant_id.is_none() {
        return Err(TokenValidationError::MissingTenant);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(role: Role, tenant_id: Option<TenantId>) -> JwtClaims {
        let now = Utc::now();
        JwtClaims {
            sub: PrincipalId::new(),
            role,
            tenant_id,
            assigned_forms: vec![],
            iss: "formhub".into(),
            issued_at: now - Duration::minutes(1),
            expires_at: now + Duration::days(7),
        }
    }

    #[test]
    fn fresh_claims_validate() {
        let c = claims(Role::TenantOwner, None);
        assert_eq!(validate_claims(&c, Utc::now()), Ok(()));
    }

    #[test]
    fn expired_claims_are_rejected() {
        let c = claims(Role::StandaloneUser, None);
        let later = c.expires_at + Duration::seconds(1);
        assert_eq!(validate_claims(&c, later), Err(TokenValidationError::Expired));
    }

    #[test]
    fn future_claims_are_rejected() {
        let c = claims(Role::TenantOwner, None);
        let earlier = c.issued_at - Duration::seconds(5);
        assert_eq!(validate_claims(&c, earlier), Err(TokenValidationError::NotYetValid));
    }

    #[test]
    fn managed_user_needs_tenant() {
        let c = claims(Role::ManagedUser, None);
        assert_eq!(
            validate_claims(&c, Utc::now()),
            Err(TokenValidationError::MissingTenant)
        );
        let ok = claims(Role::ManagedUser, Some(TenantId::new()));
        assert_eq!(validate_claims(&ok, Utc::now()), Ok(()));
    }

    #[test]
    fn timestamps_serialize_as_unix_seconds() {
        let c = claims(Role::TenantOwner, None);
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["exp"].as_i64(), Some(c.expires_at.timestamp()));
        assert_eq!(v["role"], "tenant_owner");
        assert!(v.get("tenant_id").is_none());
    }
}
