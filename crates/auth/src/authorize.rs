//! The access guard: a pure decision over a principal and the facts of the
//! requested resource.
//!
//! - No IO
//! - No panics
//! - Callers load the facts (owning tenant, live assignments) beforehand

use thiserror::Error;

use formhub_core::{DomainError, FormId, PrincipalId, TenantId};

use crate::{Principal, Role};

/// Why access was denied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("requires role '{required}', caller is '{actual}'")]
    WrongRole { required: Role, actual: Role },

    #[error("resource belongs to another tenant")]
    ForeignTenant,

    #[error("form is not assigned to this user")]
    NotAssigned,

    #[error("record belongs to another principal")]
    NotSelf,

    #[error("form is not published")]
    NotPublished,
}

impl From<AuthzError> for DomainError {
    fn from(err: AuthzError) -> Self {
        match err {
            // Unpublished forms are invisible to anonymous callers.
            AuthzError::NotPublished => DomainError::not_found("form"),
            other => DomainError::forbidden(other.to_string()),
        }
    }
}

/// What the caller is trying to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRequest<'a> {
    /// An endpoint restricted to one principal variant.
    Role(Role),
    /// A record (form, submission, managed user) owned by `owner`.
    Owned { owner: TenantId },
    /// A managed user reading or submitting a form of its tenant.
    AssignedForm {
        form_id: FormId,
        owner: TenantId,
        live_assignments: &'a [FormId],
    },
    /// A record that only its author may see or change.
    OwnRecord { author: Option<PrincipalId> },
}

/// Decide whether `principal` may perform `request`.
pub fn authorize(principal: &Principal, request: &AccessRequest<'_>) -> Result<(), AuthzError> {
    match *request {
        AccessRequest::Role(required) => {
            if principal.role == required {
                Ok(())
            } else {
                Err(AuthzError::WrongRole {
                    required,
                    actual: principal.role,
                })
            }
        }
        AccessRequest::Owned { owner } => match principal.owned_tenant() {
            Some(tenant) if tenant == owner => Ok(()),
            Some(_) => Err(AuthzError::ForeignTenant),
            None => Err(AuthzError::WrongRole {
                required: Role::TenantOwner,
                actual: principal.role,
            }),
        },
        AccessRequest::AssignedForm {
            form_id,
            owner,
            live_assignments,
        } => {
            let Some(tenant) = principal.member_tenant() else {
                return Err(AuthzError::WrongRole {
                    required: Role::ManagedUser,
                    actual: principal.role,
                });
            };
            if tenant != owner {
                return Err(AuthzError::ForeignTenant);
            }
            if live_assignments.contains(&form_id) {
                Ok(())
            } else {
                Err(AuthzError::NotAssigned)
            }
        }
        AccessRequest::OwnRecord { author } => {
            if author == Some(principal.principal_id) {
                Ok(())
            } else {
                Err(AuthzError::NotSelf)
            }
        }
    }
}

/// Anonymous access to a form through its public token.
pub fn authorize_public(is_published: bool) -> Result<(), AuthzError> {
    if is_published {
        Ok(())
    } else {
        Err(AuthzError::NotPublished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Principal {
        Principal {
            principal_id: PrincipalId::new(),
            role: Role::TenantOwner,
            tenant_id: None,
        }
    }

    fn managed(tenant: TenantId) -> Principal {
        Principal {
            principal_id: PrincipalId::new(),
            role: Role::ManagedUser,
            tenant_id: Some(tenant),
        }
    }

    #[test]
    fn owner_may_touch_own_records() {
        let p = owner();
        let req = AccessRequest::Owned {
            owner: p.principal_id.as_tenant(),
        };
        assert_eq!(authorize(&p, &req), Ok(()));
    }

    #[test]
    fn owner_is_denied_foreign_records() {
        let p = owner();
        let req = AccessRequest::Owned {
            owner: TenantId::new(),
        };
        assert_eq!(authorize(&p, &req), Err(AuthzError::ForeignTenant));
    }

    #[test]
    fn managed_user_cannot_act_as_owner() {
        let tenant = TenantId::new();
        let p = managed(tenant);
        let err = authorize(&p, &AccessRequest::Owned { owner: tenant }).unwrap_err();
        assert!(matches!(err, AuthzError::WrongRole { .. }));
    }

    #[test]
    fn assignment_is_checked_against_live_list() {
        let tenant = TenantId::new();
        let p = managed(tenant);
        let form = FormId::new();

        let assigned = [form];
        let allowed = AccessRequest::AssignedForm {
            form_id: form,
            owner: tenant,
            live_assignments: &assigned,
        };
        assert_eq!(authorize(&p, &allowed), Ok(()));

        let revoked = AccessRequest::AssignedForm {
            form_id: form,
            owner: tenant,
            live_assignments: &[],
        };
        assert_eq!(authorize(&p, &revoked), Err(AuthzError::NotAssigned));
    }

    #[test]
    fn assignment_in_another_tenant_is_foreign() {
        let p = managed(TenantId::new());
        let form = FormId::new();
        let assigned = [form];
        let req = AccessRequest::AssignedForm {
            form_id: form,
            owner: TenantId::new(),
            live_assignments: &assigned,
        };
        assert_eq!(authorize(&p, &req), Err(AuthzError::ForeignTenant));
    }

    #[test]
    fn own_record_requires_same_author() {
        let p = owner();
        let mine = AccessRequest::OwnRecord {
            author: Some(p.principal_id),
        };
        assert_eq!(authorize(&p, &mine), Ok(()));
        let anonymous = AccessRequest::OwnRecord { author: None };
        assert_eq!(authorize(&p, &anonymous), Err(AuthzError::NotSelf));
    }

    #[test]
    fn role_gate() {
        let p = owner();
        assert_eq!(authorize(&p, &AccessRequest::Role(Role::TenantOwner)), Ok(()));
        assert!(authorize(&p, &AccessRequest::Role(Role::StandaloneUser)).is_err());
    }

    #[test]
    fn unpublished_maps_to_not_found() {
        let err: DomainError = authorize_public(false).unwrap_err().into();
        assert!(matches!(err, DomainError::NotFound(_)));
        assert_eq!(authorize_public(true), Ok(()));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: an owner is never granted a record of a different tenant.
            #[test]
            fn foreign_tenant_is_never_allowed(a in any::<u128>(), b in any::<u128>()) {
                prop_assume!(a != b);
                let p = Principal {
                    principal_id: PrincipalId::from_uuid(uuid::Uuid::from_u128(a)),
                    role: Role::TenantOwner,
                    tenant_id: None,
                };
                let owner = TenantId::from_uuid(uuid::Uuid::from_u128(b));
                prop_assert_eq!(
                    authorize(&p, &AccessRequest::Owned { owner }),
                    Err(AuthzError::ForeignTenant)
                );
            }
        }
    }
}
