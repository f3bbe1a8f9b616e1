use formhub_auth::{JwtClaims, Principal, Role};
use formhub_core::{PrincipalId, TenantId};

/// Principal context for a request (authenticated identity + role).
///
/// Inserted by the auth middleware on every protected route.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self::new(Principal::from_claims(claims))
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal.principal_id
    }

    pub fn role(&self) -> Role {
        self.principal.role
    }

    /// Owning tenant for managed users.
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.principal.member_tenant()
    }
}
