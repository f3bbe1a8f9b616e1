//! Persistence contracts for accounts, forms and submissions.
//!
//! Services are generic over [`Store`]; the API holds an `Arc<dyn Store>`.
//! Two adapters exist: [`InMemoryStore`] for dev/tests and
//! [`PostgresStore`] for persistent deployments.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use formhub_auth::Account;
use formhub_core::{DomainError, FormId, PrincipalId, SubmissionId, TenantId};
use formhub_forms::{Form, Submission};

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(msg) => DomainError::conflict(msg),
            StoreError::NotFound(what) => DomainError::not_found(what),
            other => DomainError::internal(other.to_string()),
        }
    }
}

/// Unique lookups over accounts. Emails and usernames must already be
/// normalized by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountLookup<'a> {
    OwnerEmail(&'a str),
    OwnerUsername(&'a str),
    StandaloneEmail(&'a str),
    ManagedEmail { tenant: TenantId, email: &'a str },
    ManagedUsername { tenant: TenantId, username: &'a str },
    ExternalId(&'a str),
    ResetTokenHash(&'a str),
}

/// Submission listings. Results are always newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionQuery {
    Form(FormId),
    Tenant(TenantId),
    Submitter(PrincipalId),
    TenantSubmitter(TenantId, PrincipalId),
    FormSubmitter(FormId, PrincipalId),
}

/// Outcome of [`FormStore::reserve_submission_slot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotReservation {
    /// The counter was incremented to `count`.
    Reserved { count: u64 },
    LimitReached,
    FormMissing,
}

#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] on any uniqueness violation.
    async fn insert_account(&self, account: &Account) -> StoreResult<()>;

    async fn get_account(&self, id: PrincipalId) -> StoreResult<Option<Account>>;

    /// Replace the stored record. `assigned_forms` is owned by
    /// [`FormStore::assign_users`] and is left as stored.
    async fn update_account(&self, account: &Account) -> StoreResult<()>;

    async fn find_account(&self, lookup: AccountLookup<'_>) -> StoreResult<Option<Account>>;

    /// Managed users across all tenants sharing `email`, oldest first.
    async fn find_managed_by_email(&self, email: &str) -> StoreResult<Vec<Account>>;

    /// Managed users of a tenant, newest first.
    async fn list_managed_users(&self, tenant: TenantId) -> StoreResult<Vec<Account>>;

    /// Delete a managed user of `tenant` and drop it from every form's
    /// assigned users. Returns `false` if no such user exists.
    async fn delete_managed_user(&self, tenant: TenantId, id: PrincipalId) -> StoreResult<bool>;
}

#[async_trait]
pub trait FormStore: Send + Sync {
    async fn insert_form(&self, form: &Form) -> StoreResult<()>;

    async fn get_form(&self, id: FormId) -> StoreResult<Option<Form>>;

    async fn find_form_by_token(&self, token: &str) -> StoreResult<Option<Form>>;

    /// Replace the stored definition. `submission_count` and
    /// `assigned_users` are store-owned and left as stored.
    async fn update_form(&self, form: &Form) -> StoreResult<()>;

    /// Forms of a tenant, newest first.
    async fn list_forms(&self, owner: TenantId) -> StoreResult<Vec<Form>>;

    async fn list_forms_by_ids(&self, ids: &[FormId]) -> StoreResult<Vec<Form>>;

    /// Every published form, newest first.
    async fn list_published_forms(&self) -> StoreResult<Vec<Form>>;

    /// Replace the form's assigned users with `users` and mirror the change
    /// on each affected account, in one atomic step.
    async fn assign_users(
        &self,
        form_id: FormId,
        users: &[PrincipalId],
        now: DateTime<Utc>,
    ) -> StoreResult<Form>;

    /// Add one managed user to the form's assignees, mirrored on the
    /// account. Existing assignees are kept; a repeat call is a no-op.
    async fn assign_user(
        &self,
        form_id: FormId,
        user: PrincipalId,
        now: DateTime<Utc>,
    ) -> StoreResult<Form>;

    /// Atomically increment the submission counter unless `limit` is reached.
    async fn reserve_submission_slot(
        &self,
        form_id: FormId,
        limit: Option<u64>,
    ) -> StoreResult<SlotReservation>;

    /// Undo a reservation whose submission could not be stored.
    async fn release_submission_slot(&self, form_id: FormId) -> StoreResult<()>;

    /// Delete the form, all of its submissions and every assignment of it.
    /// Returns the number of submissions removed.
    async fn delete_form(&self, form_id: FormId) -> StoreResult<u64>;
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn insert_submission(&self, submission: &Submission) -> StoreResult<()>;

    async fn get_submission(&self, id: SubmissionId) -> StoreResult<Option<Submission>>;

    async fn update_submission(&self, submission: &Submission) -> StoreResult<()>;

    async fn list_submissions(&self, query: SubmissionQuery) -> StoreResult<Vec<Submission>>;
}

/// Everything the services need from persistence.
#[async_trait]
pub trait Store: PrincipalStore + FormStore + SubmissionStore {
    async fn ping(&self) -> StoreResult<()>;

    /// Release connections. Called once on shutdown.
    async fn close(&self);
}

#[async_trait]
impl<S> PrincipalStore for Arc<S>
where
    S: PrincipalStore + ?Sized,
{
    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        (**self).insert_account(account).await
    }

    async fn get_account(&self, id: PrincipalId) -> StoreResult<Option<Account>> {
        (**self).get_account(id).await
    }

    async fn update_account(&self, account: &Account) -> StoreResult<()> {
        (**self).update_account(account).await
    }

    async fn find_account(&self, lookup: AccountLookup<'_>) -> StoreResult<Option<Account>> {
        (**self).find_account(lookup).await
    }

    async fn find_managed_by_email(&self, email: &str) -> StoreResult<Vec<Account>> {
        (**self).find_managed_by_email(email).await
    }

    async fn list_managed_users(&self, tenant: TenantId) -> StoreResult<Vec<Account>> {
        (**self).list_managed_users(tenant).await
    }

    async fn delete_managed_user(&self, tenant: TenantId, id: PrincipalId) -> StoreResult<bool> {
        (**self).delete_managed_user(tenant, id).await
    }
}

#[async_trait]
impl<S> FormStore for Arc<S>
where
    S: FormStore + ?Sized,
{
    async fn insert_form(&self, form: &Form) -> StoreResult<()> {
        (**self).insert_form(form).await
    }

    async fn get_form(&self, id: FormId) -> StoreResult<Option<Form>> {
        (**self).get_form(id).await
    }

    async fn find_form_by_token(&self, token: &str) -> StoreResult<Option<Form>> {
        (**self).find_form_by_token(token).await
    }

    async fn update_form(&self, form: &Form) -> StoreResult<()> {
        (**self).update_form(form).await
    }

    async fn list_forms(&self, owner: TenantId) -> StoreResult<Vec<Form>> {
        (**self).list_forms(owner).await
    }

    async fn list_forms_by_ids(&self, ids: &[FormId]) -> StoreResult<Vec<Form>> {
        (**self).list_forms_by_ids(ids).await
    }

    async fn list_published_forms(&self) -> StoreResult<Vec<Form>> {
        (**self).list_published_forms().await
    }

    async fn assign_users(
        &self,
        form_id: FormId,
        users: &[PrincipalId],
        now: DateTime<Utc>,
    ) -> StoreResult<Form> {
        (**self).assign_users(form_id, users, now).await
    }

    async fn assign_user(
        &self,
        form_id: FormId,
        user: PrincipalId,
        now: DateTime<Utc>,
    ) -> StoreResult<Form> {
        (**self).assign_user(form_id, user, now).await
    }

    async fn reserve_submission_slot(
        &self,
        form_id: FormId,
        limit: Option<u64>,
    ) -> StoreResult<SlotReservation> {
        (**self).reserve_submission_slot(form_id, limit).await
    }

    async fn release_submission_slot(&self, form_id: FormId) -> StoreResult<()> {
        (**self).release_submission_slot(form_id).await
    }

    async fn delete_form(&self, form_id: FormId) -> StoreResult<u64> {
        (**self).delete_form(form_id).await
    }
}

#[async_trait]
impl<S> SubmissionStore for Arc<S>
where
    S: SubmissionStore + ?Sized,
{
    async fn insert_submission(&self, submission: &Submission) -> StoreResult<()> {
        (**self).insert_submission(submission).await
    }

    async fn get_submission(&self, id: SubmissionId) -> StoreResult<Option<Submission>> {
        (**self).get_submission(id).await
    }

    async fn update_submission(&self, submission: &Submission) -> StoreResult<()> {
        (**self).update_submission(submission).await
    }

    async fn list_submissions(&self, query: SubmissionQuery) -> StoreResult<Vec<Submission>> {
        (**self).list_submissions(query).await
    }
}

#[async_trait]
impl<S> Store for Arc<S>
where
    S: Store + ?Sized,
{
    async fn ping(&self) -> StoreResult<()> {
        (**self).ping().await
    }

    async fn close(&self) {
        (**self).close().await
    }
}
