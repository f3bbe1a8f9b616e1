use serde::{Deserialize, Serialize};

use formhub_core::{PrincipalId, TenantId};

use crate::{Account, JwtClaims, Role};

/// The authenticated caller, as seen by the access guard.
///
/// Derived from verified claims or from a freshly loaded account. Carries no
/// assignment data: assignment checks always use the live account record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub role: Role,
    /// Owning tenant for managed users.
    pub tenant_id: Option<TenantId>,
}

impl Principal {
    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self {
            principal_id: claims.sub,
            role: claims.role,
            tenant_id: claims.tenant_id,
        }
    }

    pub fn from_account(account: &Account) -> Self {
        Self {
            principal_id: account.id,
            role: account.role,
            tenant_id: account.tenant_id,
        }
    }

    /// The tenant whose records this principal owns, if it owns any.
    pub fn owned_tenant(&self) -> Option<TenantId> {
        self.role
            .owns_records()
            .then(|| self.principal_id.as_tenant())
    }

    /// The tenant this principal belongs to as a managed user.
    pub fn member_tenant(&self) -> Option<TenantId> {
        match self.role {
            Role::ManagedUser => self.tenant_id,
            _ => None,
        }
    }
}
