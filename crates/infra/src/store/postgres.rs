//! Postgres-backed store.
//!
//! Each record is kept as a JSONB document next to the columns that are
//! queried or constrained. Uniqueness rules live in partial unique indexes.
//! The store-owned fields (`forms.submission_count`, `forms.assigned_users`,
//! `accounts.assigned_forms`) are plain columns overlaid on the document at
//! read time, so whole-document writes can never clobber them.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use formhub_auth::{Account, Role};
use formhub_core::{FormId, PrincipalId, SubmissionId, TenantId};
use formhub_forms::{Form, Submission};

use super::{
    AccountLookup, FormStore, PrincipalStore, SlotReservation, Store, StoreError, StoreResult,
    SubmissionQuery, SubmissionStore,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id               UUID PRIMARY KEY,
    role             TEXT NOT NULL,
    tenant_id        UUID NULL,
    email            TEXT NOT NULL,
    username         TEXT NOT NULL,
    external_id      TEXT NULL,
    reset_token_hash TEXT NULL,
    assigned_forms   UUID[] NOT NULL DEFAULT '{}',
    created_at       TIMESTAMPTZ NOT NULL,
    doc              JSONB NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS accounts_role_email_uq
    ON accounts (role, email) WHERE role <> 'managed_user';
CREATE UNIQUE INDEX IF NOT EXISTS accounts_owner_username_uq
    ON accounts (username) WHERE role = 'tenant_owner';
CREATE UNIQUE INDEX IF NOT EXISTS accounts_tenant_email_uq
    ON accounts (tenant_id, email) WHERE role = 'managed_user';
CREATE UNIQUE INDEX IF NOT EXISTS accounts_tenant_username_uq
    ON accounts (tenant_id, username) WHERE role = 'managed_user';
CREATE UNIQUE INDEX IF NOT EXISTS accounts_external_id_uq
    ON accounts (external_id) WHERE external_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS accounts_reset_token_idx
    ON accounts (reset_token_hash) WHERE reset_token_hash IS NOT NULL;

CREATE TABLE IF NOT EXISTS forms (
    id               UUID PRIMARY KEY,
    owner_id         UUID NOT NULL,
    is_published     BOOLEAN NOT NULL DEFAULT FALSE,
    public_token     TEXT NULL UNIQUE,
    submission_count BIGINT NOT NULL DEFAULT 0,
    assigned_users   UUID[] NOT NULL DEFAULT '{}',
    created_at       TIMESTAMPTZ NOT NULL,
    doc              JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS forms_owner_idx ON forms (owner_id, created_at DESC);

CREATE TABLE IF NOT EXISTS submissions (
    id           UUID PRIMARY KEY,
    form_id      UUID NOT NULL REFERENCES forms (id) ON DELETE CASCADE,
    owner_id     UUID NOT NULL,
    submitted_by UUID NULL,
    created_at   TIMESTAMPTZ NOT NULL,
    doc          JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS submissions_form_idx ON submissions (form_id, created_at DESC);
CREATE INDEX IF NOT EXISTS submissions_owner_idx ON submissions (owner_id, created_at DESC);
CREATE INDEX IF NOT EXISTS submissions_submitter_idx ON submissions (submitted_by, created_at DESC);
"#;

const ACCOUNT_COLUMNS: &str = "SELECT doc, assigned_forms FROM accounts";
const FORM_COLUMNS: &str = "SELECT doc, submission_count, assigned_users FROM forms";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

fn to_doc<T: Serialize>(value: &T) -> StoreResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Corrupt(format!("encode: {e}")))
}

fn from_doc<T: DeserializeOwned>(row: &PgRow) -> StoreResult<T> {
    let doc: serde_json::Value = row
        .try_get("doc")
        .map_err(|e| map_sqlx_error("decode_doc", e))?;
    serde_json::from_value(doc).map_err(|e| StoreError::Corrupt(format!("decode: {e}")))
}

fn account_from_row(row: &PgRow) -> StoreResult<Account> {
    let mut account: Account = from_doc(row)?;
    let assigned: Vec<Uuid> = row
        .try_get("assigned_forms")
        .map_err(|e| map_sqlx_error("decode_account", e))?;
    account.assigned_forms = assigned.into_iter().map(FormId::from_uuid).collect();
    Ok(account)
}

fn form_from_row(row: &PgRow) -> StoreResult<Form> {
    let mut form: Form = from_doc(row)?;
    let count: i64 = row
        .try_get("submission_count")
        .map_err(|e| map_sqlx_error("decode_form", e))?;
    let assigned: Vec<Uuid> = row
        .try_get("assigned_users")
        .map_err(|e| map_sqlx_error("decode_form", e))?;
    form.submission_count = count.max(0) as u64;
    form.assigned_users = assigned.into_iter().map(PrincipalId::from_uuid).collect();
    Ok(form)
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

#[async_trait]
impl PrincipalStore for PostgresStore {
    #[instrument(skip_all, fields(account_id = %account.id, role = %account.role), err)]
    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts
                (id, role, tenant_id, email, username, external_id, reset_token_hash,
                 assigned_forms, created_at, doc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.role.as_str())
        .bind(account.tenant_id.map(Uuid::from))
        .bind(&account.email)
        .bind(&account.username)
        .bind(&account.external_id)
        .bind(account.password_reset.as_ref().map(|r| r.token_hash.clone()))
        .bind(uuids(&account.assigned_forms))
        .bind(account.created_at)
        .bind(to_doc(account)?)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_account", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_account(&self, id: PrincipalId) -> StoreResult<Option<Account>> {
        let row = sqlx::query(&format!("{ACCOUNT_COLUMNS} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_account", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip_all, fields(account_id = %account.id), err)]
    async fn update_account(&self, account: &Account) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET email = $2, username = $3, external_id = $4, reset_token_hash = $5, doc = $6
            WHERE id = $1
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.email)
        .bind(&account.username)
        .bind(&account.external_id)
        .bind(account.password_reset.as_ref().map(|r| r.token_hash.clone()))
        .bind(to_doc(account)?)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_account", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("account".into()));
        }
        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn find_account(&self, lookup: AccountLookup<'_>) -> StoreResult<Option<Account>> {
        let owner = Role::TenantOwner.as_str();
        let managed = Role::ManagedUser.as_str();
        let standalone = Role::StandaloneUser.as_str();

        let by_role_email = format!("{ACCOUNT_COLUMNS} WHERE role = $1 AND email = $2");
        let by_role_username = format!("{ACCOUNT_COLUMNS} WHERE role = $1 AND username = $2");
        let by_tenant_email =
            format!("{ACCOUNT_COLUMNS} WHERE role = $1 AND tenant_id = $2 AND email = $3");
        let by_tenant_username =
            format!("{ACCOUNT_COLUMNS} WHERE role = $1 AND tenant_id = $2 AND username = $3");
        let by_external = format!("{ACCOUNT_COLUMNS} WHERE external_id = $1");
        let by_reset = format!("{ACCOUNT_COLUMNS} WHERE reset_token_hash = $1");

        let query = match lookup {
            AccountLookup::OwnerEmail(email) => sqlx::query(&by_role_email).bind(owner).bind(email),
            AccountLookup::OwnerUsername(username) => {
                sqlx::query(&by_role_username).bind(owner).bind(username)
            }
            AccountLookup::StandaloneEmail(email) => {
                sqlx::query(&by_role_email).bind(standalone).bind(email)
            }
            AccountLookup::ManagedEmail { tenant, email } => sqlx::query(&by_tenant_email)
                .bind(managed)
                .bind(*tenant.as_uuid())
                .bind(email),
            AccountLookup::ManagedUsername { tenant, username } => sqlx::query(&by_tenant_username)
                .bind(managed)
                .bind(*tenant.as_uuid())
                .bind(username),
            AccountLookup::ExternalId(external) => sqlx::query(&by_external).bind(external),
            AccountLookup::ResetTokenHash(hash) => sqlx::query(&by_reset).bind(hash),
        };

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_account", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip_all, err)]
    async fn find_managed_by_email(&self, email: &str) -> StoreResult<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "{ACCOUNT_COLUMNS} WHERE role = $1 AND email = $2 ORDER BY created_at ASC, id ASC"
        ))
        .bind(Role::ManagedUser.as_str())
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_managed_by_email", e))?;
        rows.iter().map(account_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_managed_users(&self, tenant: TenantId) -> StoreResult<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "{ACCOUNT_COLUMNS} WHERE role = $1 AND tenant_id = $2 ORDER BY created_at DESC, id DESC"
        ))
        .bind(Role::ManagedUser.as_str())
        .bind(tenant.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_managed_users", e))?;
        rows.iter().map(account_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn delete_managed_user(&self, tenant: TenantId, id: PrincipalId) -> StoreResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let deleted = sqlx::query("DELETE FROM accounts WHERE id = $1 AND tenant_id = $2 AND role = $3")
            .bind(id.as_uuid())
            .bind(tenant.as_uuid())
            .bind(Role::ManagedUser.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_account", e))?
            .rows_affected();
        if deleted == 0 {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE forms SET assigned_users = array_remove(assigned_users, $1) WHERE $1 = ANY(assigned_users)",
        )
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("detach_user_from_forms", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(true)
    }
}

#[async_trait]
impl FormStore for PostgresStore {
    #[instrument(skip_all, fields(form_id = %form.id, owner = %form.owner), err)]
    async fn insert_form(&self, form: &Form) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO forms
                (id, owner_id, is_published, public_token, submission_count, assigned_users,
                 created_at, doc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(form.id.as_uuid())
        .bind(form.owner.as_uuid())
        .bind(form.is_published)
        .bind(&form.public_token)
        .bind(form.submission_count as i64)
        .bind(uuids(&form.assigned_users))
        .bind(form.created_at)
        .bind(to_doc(form)?)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_form", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_form(&self, id: FormId) -> StoreResult<Option<Form>> {
        let row = sqlx::query(&format!("{FORM_COLUMNS} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_form", e))?;
        row.as_ref().map(form_from_row).transpose()
    }

    #[instrument(skip_all, err)]
    async fn find_form_by_token(&self, token: &str) -> StoreResult<Option<Form>> {
        let row = sqlx::query(&format!("{FORM_COLUMNS} WHERE public_token = $1"))
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_form_by_token", e))?;
        row.as_ref().map(form_from_row).transpose()
    }

    #[instrument(skip_all, fields(form_id = %form.id), err)]
    async fn update_form(&self, form: &Form) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE forms SET is_published = $2, public_token = $3, doc = $4 WHERE id = $1",
        )
        .bind(form.id.as_uuid())
        .bind(form.is_published)
        .bind(&form.public_token)
        .bind(to_doc(form)?)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_form", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("form".into()));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_forms(&self, owner: TenantId) -> StoreResult<Vec<Form>> {
        let rows = sqlx::query(&format!(
            "{FORM_COLUMNS} WHERE owner_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_forms", e))?;
        rows.iter().map(form_from_row).collect()
    }

    #[instrument(skip_all, fields(count = ids.len()), err)]
    async fn list_forms_by_ids(&self, ids: &[FormId]) -> StoreResult<Vec<Form>> {
        let rows = sqlx::query(&format!(
            "{FORM_COLUMNS} WHERE id = ANY($1) ORDER BY created_at DESC, id DESC"
        ))
        .bind(uuids(ids))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_forms_by_ids", e))?;
        rows.iter().map(form_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_published_forms(&self) -> StoreResult<Vec<Form>> {
        let rows = sqlx::query(&format!(
            "{FORM_COLUMNS} WHERE is_published ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_published_forms", e))?;
        rows.iter().map(form_from_row).collect()
    }

    #[instrument(skip(self, users), fields(user_count = users.len()), err)]
    async fn assign_users(
        &self,
        form_id: FormId,
        users: &[PrincipalId],
        now: DateTime<Utc>,
    ) -> StoreResult<Form> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(&format!("{FORM_COLUMNS} WHERE id = $1 FOR UPDATE"))
            .bind(form_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_form", e))?
            .ok_or_else(|| StoreError::NotFound("form".into()))?;
        let mut form = form_from_row(&row)?;

        let wanted = uuids(users);
        let found: i64 = sqlx::query("SELECT COUNT(*) FROM accounts WHERE id = ANY($1)")
            .bind(&wanted)
            .fetch_one(&mut *tx)
            .await
            .and_then(|r| r.try_get(0))
            .map_err(|e| map_sqlx_error("count_accounts", e))?;
        if found as usize != wanted.len() {
            return Err(StoreError::NotFound("account".into()));
        }

        let dropped: Vec<Uuid> = form
            .assigned_users
            .iter()
            .filter(|u| !users.contains(u))
            .map(|u| *u.as_uuid())
            .collect();

        sqlx::query(
            "UPDATE accounts SET assigned_forms = array_remove(assigned_forms, $1) WHERE id = ANY($2)",
        )
        .bind(form_id.as_uuid())
        .bind(&dropped)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("unassign_accounts", e))?;

        sqlx::query(
            r#"
            UPDATE accounts SET assigned_forms = array_append(assigned_forms, $1)
            WHERE id = ANY($2) AND role = $3 AND NOT ($1 = ANY(assigned_forms))
            "#,
        )
        .bind(form_id.as_uuid())
        .bind(&wanted)
        .bind(Role::ManagedUser.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("assign_accounts", e))?;

        form.set_assigned_users(users.to_vec(), now);
        sqlx::query("UPDATE forms SET assigned_users = $2, doc = $3 WHERE id = $1")
            .bind(form_id.as_uuid())
            .bind(&wanted)
            .bind(to_doc(&form)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_form_assignments", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(form)
    }

    #[instrument(skip(self), err)]
    async fn assign_user(
        &self,
        form_id: FormId,
        user: PrincipalId,
        now: DateTime<Utc>,
    ) -> StoreResult<Form> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(&format!("{FORM_COLUMNS} WHERE id = $1 FOR UPDATE"))
            .bind(*form_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_form", e))?
            .ok_or_else(|| StoreError::NotFound("form".into()))?;
        let mut form = form_from_row(&row)?;

        let found: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET assigned_forms = CASE
                WHEN $1 = ANY(assigned_forms) THEN assigned_forms
                ELSE array_append(assigned_forms, $1)
            END
            WHERE id = $2 AND role = $3
            RETURNING 1
            "#,
        )
        .bind(*form_id.as_uuid())
        .bind(*user.as_uuid())
        .bind(Role::ManagedUser.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("assign_account", e))?;
        if found.is_none() {
            return Err(StoreError::NotFound(format!("managed user {user}")));
        }

        if !form.assigned_users.contains(&user) {
            let mut users = form.assigned_users.clone();
            users.push(user);
            form.set_assigned_users(users, now);
            sqlx::query(
                "UPDATE forms SET assigned_users = array_append(assigned_users, $2), doc = $3 WHERE id = $1",
            )
            .bind(*form_id.as_uuid())
            .bind(*user.as_uuid())
            .bind(to_doc(&form)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_form_assignments", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(form)
    }

    #[instrument(skip(self), err)]
    async fn reserve_submission_slot(
        &self,
        form_id: FormId,
        limit: Option<u64>,
    ) -> StoreResult<SlotReservation> {
        let reserved: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE forms SET submission_count = submission_count + 1
            WHERE id = $1 AND ($2::BIGINT IS NULL OR submission_count < $2)
            RETURNING submission_count
            "#,
        )
        .bind(form_id.as_uuid())
        .bind(limit.map(|l| l as i64))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("reserve_submission_slot", e))?;

        if let Some(count) = reserved {
            return Ok(SlotReservation::Reserved {
                count: count.max(0) as u64,
            });
        }

        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM forms WHERE id = $1")
            .bind(form_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("reserve_submission_slot", e))?;
        Ok(match exists {
            Some(_) => SlotReservation::LimitReached,
            None => SlotReservation::FormMissing,
        })
    }

    #[instrument(skip(self), err)]
    async fn release_submission_slot(&self, form_id: FormId) -> StoreResult<()> {
        sqlx::query(
            "UPDATE forms SET submission_count = GREATEST(submission_count - 1, 0) WHERE id = $1",
        )
        .bind(form_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("release_submission_slot", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_form(&self, form_id: FormId) -> StoreResult<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let removed = sqlx::query("DELETE FROM submissions WHERE form_id = $1")
            .bind(form_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_submissions", e))?
            .rows_affected();

        sqlx::query(
            "UPDATE accounts SET assigned_forms = array_remove(assigned_forms, $1) WHERE $1 = ANY(assigned_forms)",
        )
        .bind(form_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("detach_form_from_accounts", e))?;

        let deleted = sqlx::query("DELETE FROM forms WHERE id = $1")
            .bind(form_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_form", e))?
            .rows_affected();
        if deleted == 0 {
            return Err(StoreError::NotFound("form".into()));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(removed)
    }
}

#[async_trait]
impl SubmissionStore for PostgresStore {
    #[instrument(skip_all, fields(submission_id = %submission.id, form_id = %submission.form_id), err)]
    async fn insert_submission(&self, submission: &Submission) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO submissions (id, form_id, owner_id, submitted_by, created_at, doc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(submission.id.as_uuid())
        .bind(submission.form_id.as_uuid())
        .bind(submission.owner.as_uuid())
        .bind(submission.submitted_by.map(Uuid::from))
        .bind(submission.created_at)
        .bind(to_doc(submission)?)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_submission", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_submission(&self, id: SubmissionId) -> StoreResult<Option<Submission>> {
        let row = sqlx::query("SELECT doc FROM submissions WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_submission", e))?;
        row.as_ref().map(from_doc).transpose()
    }

    #[instrument(skip_all, fields(submission_id = %submission.id), err)]
    async fn update_submission(&self, submission: &Submission) -> StoreResult<()> {
        let result = sqlx::query("UPDATE submissions SET doc = $2 WHERE id = $1")
            .bind(submission.id.as_uuid())
            .bind(to_doc(submission)?)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_submission", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("submission".into()));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_submissions(&self, query: SubmissionQuery) -> StoreResult<Vec<Submission>> {
        const ORDER: &str = "ORDER BY created_at DESC, id DESC";
        let (clause, first, second): (&str, Uuid, Option<Uuid>) = match query {
            SubmissionQuery::Form(form) => ("form_id = $1", form.into(), None),
            SubmissionQuery::Tenant(tenant) => ("owner_id = $1", tenant.into(), None),
            SubmissionQuery::Submitter(who) => ("submitted_by = $1", who.into(), None),
            SubmissionQuery::TenantSubmitter(tenant, who) => {
                ("owner_id = $1 AND submitted_by = $2", tenant.into(), Some(who.into()))
            }
            SubmissionQuery::FormSubmitter(form, who) => {
                ("form_id = $1 AND submitted_by = $2", form.into(), Some(who.into()))
            }
        };

        let sql = format!("SELECT doc FROM submissions WHERE {clause} {ORDER}");
        let mut q = sqlx::query(&sql).bind(first);
        if let Some(second) = second {
            q = q.bind(second);
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_submissions", e))?;
        rows.iter().map(from_doc).collect()
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation
                Some("23505") => StoreError::Duplicate(
                    db_err
                        .constraint()
                        .map(duplicate_reason)
                        .unwrap_or("record already exists")
                        .to_string(),
                ),
                // Foreign key violation
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("decode error in {}: {}", operation, err))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn duplicate_reason(constraint: &str) -> &'static str {
    match constraint {
        "accounts_role_email_uq" => "email already registered",
        "accounts_owner_username_uq" => "username already taken",
        "accounts_tenant_email_uq" => "email already in use in this tenant",
        "accounts_tenant_username_uq" => "username already in use in this tenant",
        "accounts_external_id_uq" => "external identity already linked",
        "forms_public_token_key" => "public token already in use",
        _ => "record already exists",
    }
}
