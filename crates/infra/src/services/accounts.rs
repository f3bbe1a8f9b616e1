use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::instrument;

use formhub_auth::account::{
    normalize_email, normalize_username, validate_email, validate_new_password, validate_username,
};
use formhub_auth::{
    AccessRequest, Account, AuthConfig, Hs256JwtIssuer, Principal, Role, authorize, password, reset,
};
use formhub_core::{DomainError, DomainResult, PrincipalId};
use formhub_forms::FormScope;

use crate::identity::ExternalIdentityVerifier;
use crate::mail::Mailer;
use crate::services::{blocking, derived_username};
use crate::store::{AccountLookup, Store};

/// A signed-in principal.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub expires_at: chrono::DateTime<Utc>,
    pub account: Account,
}

#[derive(Debug, Clone, Default)]
pub struct OwnerSignup {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StandaloneSignup {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewManagedUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: Option<String>,
}

const RESET_REQUESTED: &str = "if the account exists, a reset link has been sent";

/// Registration, sign-in, password reset and managed-user administration.
pub struct AccountService<S> {
    store: S,
    config: AuthConfig,
    issuer: Hs256JwtIssuer,
    mailer: Arc<dyn Mailer>,
    identity: Option<Arc<dyn ExternalIdentityVerifier>>,
    frontend_url: String,
}

impl<S: Store> AccountService<S> {
    pub fn new(
        store: S,
        config: AuthConfig,
        mailer: Arc<dyn Mailer>,
        identity: Option<Arc<dyn ExternalIdentityVerifier>>,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            issuer: Hs256JwtIssuer::new(&config),
            store,
            config,
            mailer,
            identity,
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Message returned by [`Self::request_password_reset`] in every case.
    pub fn reset_requested_message(&self) -> &'static str {
        RESET_REQUESTED
    }

    fn open_session(&self, account: Account) -> DomainResult<Session> {
        let issued = self.issuer.issue(&account, Utc::now())?;
        Ok(Session {
            token: issued.token,
            expires_at: issued.expires_at,
            account,
        })
    }

    async fn hash(&self, password: &str) -> DomainResult<String> {
        let password = password.to_string();
        let pepper = self.config.pepper.clone();
        blocking(move || password::hash_password(&password, pepper.as_deref()).map_err(Into::into))
            .await
    }

    /// `false` for accounts without a local credential.
    async fn verify(&self, account: &Account, password: &str) -> DomainResult<bool> {
        let Some(hash) = account.password_hash.clone() else {
            return Ok(false);
        };
        let password = password.to_string();
        let pepper = self.config.pepper.clone();
        blocking(move || {
            password::verify_password(&password, &hash, pepper.as_deref()).map_err(Into::into)
        })
        .await
    }

    fn invalid_credentials() -> DomainError {
        DomainError::auth("invalid email or password")
    }

    async fn check_credentials(&self, account: Option<Account>, password: &str) -> DomainResult<Account> {
        let Some(account) = account else {
            return Err(Self::invalid_credentials());
        };
        if self.verify(&account, password).await? {
            Ok(account)
        } else {
            Err(Self::invalid_credentials())
        }
    }

    // ── Tenant owners ──

    #[instrument(skip_all, fields(username = %input.username), err)]
    pub async fn register_tenant_owner(&self, input: OwnerSignup) -> DomainResult<Session> {
        validate_username(&input.username)?;
        validate_email(&input.email)?;
        validate_new_password(
            &input.password,
            input.password_confirm.as_deref(),
            self.config.min_password_length,
        )?;

        let email = normalize_email(&input.email);
        let username = normalize_username(&input.username);
        if self.store.find_account(AccountLookup::OwnerEmail(&email)).await?.is_some() {
            return Err(DomainError::conflict("email already registered"));
        }
        if self
            .store
            .find_account(AccountLookup::OwnerUsername(&username))
            .await?
            .is_some()
        {
            return Err(DomainError::conflict("username already taken"));
        }

        let hash = self.hash(&input.password).await?;
        let account = Account::tenant_owner(&username, &email, hash, Utc::now());
        self.store.insert_account(&account).await?;
        tracing::info!(principal_id = %account.id, "tenant owner registered");
        self.open_session(account)
    }

    #[instrument(skip_all, err)]
    pub async fn login_tenant_owner(&self, email: &str, password: &str) -> DomainResult<Session> {
        let email = normalize_email(email);
        let account = self.store.find_account(AccountLookup::OwnerEmail(&email)).await?;
        let account = self.check_credentials(account, password).await?;
        self.open_session(account)
    }

    // ── Managed users ──

    /// Emails are unique per tenant only, so every managed user with this
    /// email is tried; the oldest account whose password matches wins.
    #[instrument(skip_all, err)]
    pub async fn login_managed_user(&self, email: &str, password: &str) -> DomainResult<Session> {
        let email = normalize_email(email);
        for candidate in self.store.find_managed_by_email(&email).await? {
            if self.verify(&candidate, password).await? {
                return self.open_session(candidate);
            }
        }
        Err(Self::invalid_credentials())
    }

    /// Sign in (or sign up) a managed user through a form's public link.
    ///
    /// The account is looked up in the form's tenant; if none exists one is
    /// created with the given password. Either way the form ends up
    /// assigned to it.
    #[instrument(skip_all, err)]
    pub async fn login_via_public_link(
        &self,
        public_token: &str,
        email: &str,
        password: &str,
    ) -> DomainResult<Session> {
        let form = self
            .store
            .find_form_by_token(public_token.trim())
            .await?
            .filter(|f| f.scope == FormScope::Tenant)
            .ok_or_else(|| DomainError::not_found("form"))?;

        validate_email(email)?;
        let email = normalize_email(email);
        let existing = self
            .store
            .find_account(AccountLookup::ManagedEmail {
                tenant: form.owner,
                email: &email,
            })
            .await?;

        if let Some(account) = existing {
            let mut account = self.check_credentials(Some(account), password).await?;
            if !account.is_assigned(form.id) {
                self.store.assign_user(form.id, account.id, Utc::now()).await?;
                account.assign_form(form.id);
                tracing::info!(principal_id = %account.id, form_id = %form.id, "form assigned through public link");
            }
            return self.open_session(account);
        }

        validate_new_password(password, None, self.config.min_password_length)?;
        let hash = self.hash(password).await?;
        let now = Utc::now();
        let mut account = Account::managed_user(
            form.owner,
            &derived_username(&email),
            &email,
            Some(hash),
            now,
        );
        self.store.insert_account(&account).await?;
        self.store.assign_user(form.id, account.id, now).await?;
        account.assign_form(form.id);
        tracing::info!(principal_id = %account.id, tenant_id = %form.owner, "managed user created from public link");
        self.open_session(account)
    }

    #[instrument(skip_all, fields(owner = %owner.principal_id), err)]
    pub async fn create_managed_user(
        &self,
        owner: &Principal,
        input: NewManagedUser,
    ) -> DomainResult<Account> {
        authorize(owner, &AccessRequest::Role(Role::TenantOwner))?;
        let tenant = owner.principal_id.as_tenant();

        validate_username(&input.username)?;
        validate_email(&input.email)?;
        validate_new_password(
            &input.password,
            input.password_confirm.as_deref(),
            self.config.min_password_length,
        )?;

        let email = normalize_email(&input.email);
        let username = normalize_username(&input.username);
        if self
            .store
            .find_account(AccountLookup::ManagedEmail { tenant, email: &email })
            .await?
            .is_some()
        {
            return Err(DomainError::conflict("email already in use in this tenant"));
        }
        if self
            .store
            .find_account(AccountLookup::ManagedUsername {
                tenant,
                username: &username,
            })
            .await?
            .is_some()
        {
            return Err(DomainError::conflict("username already in use in this tenant"));
        }

        let hash = self.hash(&input.password).await?;
        let account = Account::managed_user(tenant, &username, &email, Some(hash), Utc::now());
        self.store.insert_account(&account).await?;
        tracing::info!(principal_id = %account.id, tenant_id = %tenant, "managed user created");
        Ok(account)
    }

    pub async fn list_managed_users(&self, owner: &Principal) -> DomainResult<Vec<Account>> {
        authorize(owner, &AccessRequest::Role(Role::TenantOwner))?;
        Ok(self
            .store
            .list_managed_users(owner.principal_id.as_tenant())
            .await?)
    }

    /// A managed user of the caller's tenant.
    pub async fn get_managed_user(&self, owner: &Principal, id: PrincipalId) -> DomainResult<Account> {
        authorize(owner, &AccessRequest::Role(Role::TenantOwner))?;
        let account = self
            .store
            .get_account(id)
            .await?
            .filter(|a| a.role == Role::ManagedUser)
            .ok_or_else(|| DomainError::not_found("user"))?;
        authorize(owner, &AccessRequest::Owned { owner: account.tenant() })?;
        Ok(account)
    }

    #[instrument(skip(self, owner), fields(owner = %owner.principal_id), err)]
    pub async fn delete_managed_user(&self, owner: &Principal, id: PrincipalId) -> DomainResult<()> {
        let account = self.get_managed_user(owner, id).await?;
        if !self
            .store
            .delete_managed_user(account.tenant(), account.id)
            .await?
        {
            return Err(DomainError::not_found("user"));
        }
        tracing::info!(principal_id = %id, "managed user deleted");
        Ok(())
    }

    // ── Standalone users ──

    #[instrument(skip_all, err)]
    pub async fn register_standalone(&self, input: StandaloneSignup) -> DomainResult<Session> {
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("name is required"));
        }
        validate_email(&input.email)?;
        validate_new_password(
            &input.password,
            input.password_confirm.as_deref(),
            self.config.min_password_length,
        )?;

        let email = normalize_email(&input.email);
        if self
            .store
            .find_account(AccountLookup::StandaloneEmail(&email))
            .await?
            .is_some()
        {
            return Err(DomainError::conflict("email already registered"));
        }

        let hash = self.hash(&input.password).await?;
        let account = Account::standalone(&input.name, &email, Some(hash), Utc::now());
        self.store.insert_account(&account).await?;
        tracing::info!(principal_id = %account.id, "standalone user registered");
        self.open_session(account)
    }

    #[instrument(skip_all, err)]
    pub async fn login_standalone(&self, email: &str, password: &str) -> DomainResult<Session> {
        let email = normalize_email(email);
        let account = self
            .store
            .find_account(AccountLookup::StandaloneEmail(&email))
            .await?;
        let account = self.check_credentials(account, password).await?;
        self.open_session(account)
    }

    /// Sign in with a provider-issued token, linking or creating the account.
    #[instrument(skip_all, err)]
    pub async fn login_external(&self, external_token: &str) -> DomainResult<Session> {
        let verifier = self
            .identity
            .as_ref()
            .ok_or_else(|| DomainError::validation("external sign-in is not configured"))?;
        if external_token.trim().is_empty() {
            return Err(DomainError::validation("credential is required"));
        }
        let identity = verifier.verify(external_token.trim()).await?;

        if let Some(account) = self
            .store
            .find_account(AccountLookup::ExternalId(&identity.subject))
            .await?
        {
            return self.open_session(account);
        }

        let email = normalize_email(&identity.email);
        let now = Utc::now();
        let account = match self
            .store
            .find_account(AccountLookup::StandaloneEmail(&email))
            .await?
        {
            Some(mut account) => {
                account.external_id = Some(identity.subject.clone());
                if account.picture.is_none() {
                    account.picture = identity.picture.clone();
                }
                account.updated_at = now;
                self.store.update_account(&account).await?;
                tracing::info!(principal_id = %account.id, "external identity linked");
                account
            }
            None => {
                let name = identity.name.clone().unwrap_or_else(|| email.clone());
                let mut account = Account::standalone(&name, &email, None, now);
                account.external_id = Some(identity.subject.clone());
                account.picture = identity.picture.clone();
                self.store.insert_account(&account).await?;
                tracing::info!(principal_id = %account.id, "standalone user created from external identity");
                account
            }
        };
        self.open_session(account)
    }

    /// Start a password reset. The outcome is the same whether or not the
    /// email belongs to an account.
    #[instrument(skip_all, err)]
    pub async fn request_password_reset(&self, email: &str) -> DomainResult<()> {
        let email = normalize_email(email);
        let Some(mut account) = self
            .store
            .find_account(AccountLookup::StandaloneEmail(&email))
            .await?
        else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(());
        };

        let raw = reset::generate_reset_token();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.reset_token_lifetime_secs as i64);
        account.begin_password_reset(reset::hash_reset_token(&raw), expires_at, now);
        self.store.update_account(&account).await?;

        let link = format!("{}/reset-password?token={}", self.frontend_url, raw);
        if let Err(e) = self.mailer.send_password_reset(&account.email, &link).await {
            tracing::error!(error = %e, principal_id = %account.id, "password reset mail failed");
        }
        Ok(())
    }

    #[instrument(skip_all, err)]
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
        confirmation: Option<&str>,
    ) -> DomainResult<()> {
        validate_new_password(new_password, confirmation, self.config.min_password_length)?;
        let invalid = || DomainError::validation("reset token is invalid or has expired");

        let digest = reset::hash_reset_token(token.trim());
        let mut account = self
            .store
            .find_account(AccountLookup::ResetTokenHash(&digest))
            .await?
            .ok_or_else(invalid)?;

        let now = Utc::now();
        if !account.redeem_password_reset(&digest, now) {
            // Persist the cleared (expired) reset.
            self.store.update_account(&account).await?;
            return Err(invalid());
        }
        let hash = self.hash(new_password).await?;
        account.set_password_hash(hash, now);
        self.store.update_account(&account).await?;
        tracing::info!(principal_id = %account.id, "password reset completed");
        Ok(())
    }

    /// The live record of the caller.
    pub async fn current_account(&self, principal: &Principal) -> DomainResult<Account> {
        self.store
            .get_account(principal.principal_id)
            .await?
            .ok_or_else(|| DomainError::auth("account no longer exists"))
    }

    pub async fn shutdown(&self) {
        self.mailer.shutdown().await;
    }
}
