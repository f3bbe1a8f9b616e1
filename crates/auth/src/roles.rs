use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// The three principal variants.
///
/// A principal holds exactly one role for its whole lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Owns a tenant: its forms, managed users and submissions.
    TenantOwner,
    /// Belongs to exactly one tenant and fills the forms assigned to it.
    ManagedUser,
    /// Self-registered, tenant-less user of the simplified surface.
    StandaloneUser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::TenantOwner => "tenant_owner",
            Role::ManagedUser => "managed_user",
            Role::StandaloneUser => "standalone_user",
        }
    }

    /// Roles that own records directly (the tenant is the principal itself).
    pub fn owns_records(&self) -> bool {
        matches!(self, Role::TenantOwner | Role::StandaloneUser)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tenant_owner" => Ok(Role::TenantOwner),
            "managed_user" => Ok(Role::ManagedUser),
            "standalone_user" => Ok(Role::StandaloneUser),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}
