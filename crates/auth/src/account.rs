//! Account records for every principal variant.
//!
//! One record type covers tenant owners, managed users and standalone users;
//! the `role` decides which fields are meaningful:
//!
//! - `tenant_id` is set only for managed users (their owning tenant).
//! - `assigned_forms` is only ever non-empty for managed users.
//! - `password_hash` may be absent for managed users created through a
//!   public submission and for externally-authenticated standalone users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use formhub_core::{DomainError, Entity, FormId, PrincipalId, TenantId};

use crate::Role;

/// Pending password reset. Only the token digest is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordReset {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: PrincipalId,
    pub role: Role,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub assigned_forms: Vec<FormId>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub password_reset: Option<PasswordReset>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Account {
    type Id = PrincipalId;

    fn id(&self) -> PrincipalId {
        self.id
    }
}

impl Account {
    fn blank(role: Role, username: &str, email: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: PrincipalId::new(),
            role,
            tenant_id: None,
            username: username.to_string(),
            email: normalize_email(email),
            password_hash: None,
            assigned_forms: Vec::new(),
            external_id: None,
            picture: None,
            password_reset: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tenant_owner(username: &str, email: &str, password_hash: String, now: DateTime<Utc>) -> Self {
        let mut account = Self::blank(Role::TenantOwner, &normalize_username(username), email, now);
        account.password_hash = Some(password_hash);
        account
    }

    pub fn managed_user(
        tenant_id: TenantId,
        username: &str,
        email: &str,
        password_hash: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut account = Self::blank(Role::ManagedUser, &normalize_username(username), email, now);
        account.tenant_id = Some(tenant_id);
        account.password_hash = password_hash;
        account
    }

    pub fn standalone(name: &str, email: &str, password_hash: Option<String>, now: DateTime<Utc>) -> Self {
        let mut account = Self::blank(Role::StandaloneUser, name.trim(), email, now);
        account.password_hash = password_hash;
        account
    }

    /// The tenant whose records this account owns or belongs to.
    pub fn tenant(&self) -> TenantId {
        match self.role {
            Role::ManagedUser => self.tenant_id.unwrap_or_else(|| self.id.as_tenant()),
            _ => self.id.as_tenant(),
        }
    }

    pub fn is_assigned(&self, form_id: FormId) -> bool {
        self.assigned_forms.contains(&form_id)
    }

    /// Set-union insert. Returns whether the list changed.
    pub fn assign_form(&mut self, form_id: FormId) -> bool {
        if self.role != Role::ManagedUser || self.is_assigned(form_id) {
            return false;
        }
        self.assigned_forms.push(form_id);
        true
    }

    /// Returns whether the list changed.
    pub fn unassign_form(&mut self, form_id: FormId) -> bool {
        let before = self.assigned_forms.len();
        self.assigned_forms.retain(|f| *f != form_id);
        before != self.assigned_forms.len()
    }

    pub fn set_password_hash(&mut self, hash: String, now: DateTime<Utc>) {
        self.password_hash = Some(hash);
        self.updated_at = now;
    }

    pub fn begin_password_reset(&mut self, token_hash: String, expires_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.password_reset = Some(PasswordReset {
            token_hash,
            expires_at,
        });
        self.updated_at = now;
    }

    /// Consume a pending reset if `token_hash` matches and has not expired.
    ///
    /// A matching but expired reset is cleared as well.
    pub fn redeem_password_reset(&mut self, token_hash: &str, now: DateTime<Utc>) -> bool {
        let Some(reset) = self.password_reset.as_ref() else {
            return false;
        };
        if reset.token_hash != token_hash {
            return false;
        }
        let valid = now < reset.expires_at;
        self.password_reset = None;
        self.updated_at = now;
        valid
    }
}

/// Emails are compared trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Usernames are compared trimmed and lowercased.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), DomainError> {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(DomainError::validation("email is not valid"));
    };
    let plausible = !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace);
    if plausible {
        Ok(())
    } else {
        Err(DomainError::validation("email is not valid"))
    }
}

pub fn validate_username(username: &str) -> Result<(), DomainError> {
    let username = username.trim();
    if username.chars().count() < 3 {
        return Err(DomainError::validation("username must be at least 3 characters"));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("username must not contain spaces"));
    }
    Ok(())
}

/// Length policy plus optional confirmation match.
pub fn validate_new_password(
    password: &str,
    confirmation: Option<&str>,
    min_length: usize,
) -> Result<(), DomainError> {
    if password.chars().count() < min_length {
        return Err(DomainError::validation(format!(
            "password must be at least {min_length} characters"
        )));
    }
    if let Some(confirm) = confirmation {
        if confirm != password {
            return Err(DomainError::validation("passwords do not match"));
        }
    }
    Ok(())
}
