use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use formhub_auth::{Account, Role};
use formhub_core::{Entity, FormId, PrincipalId, SubmissionId, TenantId};
use formhub_forms::{Form, Submission};

use super::{
    AccountLookup, FormStore, PrincipalStore, SlotReservation, Store, StoreError, StoreResult,
    SubmissionQuery, SubmissionStore,
};

/// Documents of one kind keyed by their identifier.
#[derive(Debug)]
struct Collection<E: Entity> {
    rows: HashMap<E::Id, E>,
}

impl<E: Entity + Clone> Collection<E> {
    fn new() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }

    fn get(&self, id: E::Id) -> Option<E> {
        self.rows.get(&id).cloned()
    }

    fn put(&mut self, row: E) {
        self.rows.insert(row.id(), row);
    }

    fn filtered(&self, pred: impl Fn(&E) -> bool) -> Vec<E> {
        self.rows.values().filter(|r| pred(r)).cloned().collect()
    }
}

#[derive(Debug)]
struct Documents {
    accounts: Collection<Account>,
    forms: Collection<Form>,
    submissions: Collection<Submission>,
}

/// In-memory store for tests/dev.
///
/// One lock guards all collections so the multi-record operations
/// (assignment mirroring, cascades, counters) are atomic.
#[derive(Debug)]
pub struct InMemoryStore {
    inner: RwLock<Documents>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Documents {
                accounts: Collection::new(),
                forms: Collection::new(),
                submissions: Collection::new(),
            }),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Documents>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Documents>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first<T>(rows: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, uuid::Uuid)) {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
}

/// The uniqueness rules shared with the Postgres unique indexes.
fn clashes(existing: &Account, new: &Account) -> Option<&'static str> {
    if let (Some(a), Some(b)) = (&existing.external_id, &new.external_id) {
        if a == b {
            return Some("external identity already linked");
        }
    }
    match (existing.role, new.role) {
        (Role::ManagedUser, Role::ManagedUser) if existing.tenant_id == new.tenant_id => {
            if existing.email == new.email {
                Some("email already in use in this tenant")
            } else if existing.username == new.username {
                Some("username already in use in this tenant")
            } else {
                None
            }
        }
        (Role::TenantOwner, Role::TenantOwner) => {
            if existing.email == new.email {
                Some("email already registered")
            } else if existing.username == new.username {
                Some("username already taken")
            } else {
                None
            }
        }
        (Role::StandaloneUser, Role::StandaloneUser) if existing.email == new.email => {
            Some("email already registered")
        }
        _ => None,
    }
}

fn matches_lookup(account: &Account, lookup: &AccountLookup<'_>) -> bool {
    match *lookup {
        AccountLookup::OwnerEmail(email) => {
            account.role == Role::TenantOwner && account.email == email
        }
        AccountLookup::OwnerUsername(username) => {
            account.role == Role::TenantOwner && account.username == username
        }
        AccountLookup::StandaloneEmail(email) => {
            account.role == Role::StandaloneUser && account.email == email
        }
        AccountLookup::ManagedEmail { tenant, email } => {
            account.role == Role::ManagedUser
                && account.tenant_id == Some(tenant)
                && account.email == email
        }
        AccountLookup::ManagedUsername { tenant, username } => {
            account.role == Role::ManagedUser
                && account.tenant_id == Some(tenant)
                && account.username == username
        }
        AccountLookup::ExternalId(external) => account.external_id.as_deref() == Some(external),
        AccountLookup::ResetTokenHash(hash) => account
            .password_reset
            .as_ref()
            .is_some_and(|r| r.token_hash == hash),
    }
}

#[async_trait]
impl PrincipalStore for InMemoryStore {
    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        let mut docs = self.write()?;
        if let Some(reason) = docs
            .accounts
            .rows
            .values()
            .find_map(|existing| clashes(existing, account))
        {
            return Err(StoreError::Duplicate(reason.into()));
        }
        docs.accounts.put(account.clone());
        Ok(())
    }

    async fn get_account(&self, id: PrincipalId) -> StoreResult<Option<Account>> {
        Ok(self.read()?.accounts.get(id))
    }

    async fn update_account(&self, account: &Account) -> StoreResult<()> {
        let mut docs = self.write()?;
        let Some(stored) = docs.accounts.rows.get(&account.id) else {
            return Err(StoreError::NotFound("account".into()));
        };
        let mut next = account.clone();
        next.assigned_forms = stored.assigned_forms.clone();
        docs.accounts.put(next);
        Ok(())
    }

    async fn find_account(&self, lookup: AccountLookup<'_>) -> StoreResult<Option<Account>> {
        let docs = self.read()?;
        Ok(docs
            .accounts
            .rows
            .values()
            .find(|a| matches_lookup(a, &lookup))
            .cloned())
    }

    async fn find_managed_by_email(&self, email: &str) -> StoreResult<Vec<Account>> {
        let mut rows = self
            .read()?
            .accounts
            .filtered(|a| a.role == Role::ManagedUser && a.email == email);
        rows.sort_by_key(|a| (a.created_at, a.id));
        Ok(rows)
    }

    async fn list_managed_users(&self, tenant: TenantId) -> StoreResult<Vec<Account>> {
        let mut rows = self
            .read()?
            .accounts
            .filtered(|a| a.role == Role::ManagedUser && a.tenant_id == Some(tenant));
        newest_first(&mut rows, |a| (a.created_at, *a.id.as_uuid()));
        Ok(rows)
    }

    async fn delete_managed_user(&self, tenant: TenantId, id: PrincipalId) -> StoreResult<bool> {
        let mut docs = self.write()?;
        let owned = docs
            .accounts
            .rows
            .get(&id)
            .is_some_and(|a| a.role == Role::ManagedUser && a.tenant_id == Some(tenant));
        if !owned {
            return Ok(false);
        }
        docs.accounts.rows.remove(&id);
        for form in docs.forms.rows.values_mut() {
            form.assigned_users.retain(|u| *u != id);
        }
        Ok(true)
    }
}

#[async_trait]
impl FormStore for InMemoryStore {
    async fn insert_form(&self, form: &Form) -> StoreResult<()> {
        let mut docs = self.write()?;
        if let Some(token) = &form.public_token {
            if docs
                .forms
                .rows
                .values()
                .any(|f| f.public_token.as_ref() == Some(token))
            {
                return Err(StoreError::Duplicate("public token already in use".into()));
            }
        }
        docs.forms.put(form.clone());
        Ok(())
    }

    async fn get_form(&self, id: FormId) -> StoreResult<Option<Form>> {
        Ok(self.read()?.forms.get(id))
    }

    async fn find_form_by_token(&self, token: &str) -> StoreResult<Option<Form>> {
        let docs = self.read()?;
        Ok(docs
            .forms
            .rows
            .values()
            .find(|f| f.public_token.as_deref() == Some(token))
            .cloned())
    }

    async fn update_form(&self, form: &Form) -> StoreResult<()> {
        let mut docs = self.write()?;
        let Some(stored) = docs.forms.rows.get(&form.id) else {
            return Err(StoreError::NotFound("form".into()));
        };
        let mut next = form.clone();
        next.submission_count = stored.submission_count;
        next.assigned_users = stored.assigned_users.clone();
        docs.forms.put(next);
        Ok(())
    }

    async fn list_forms(&self, owner: TenantId) -> StoreResult<Vec<Form>> {
        let mut rows = self.read()?.forms.filtered(|f| f.owner == owner);
        newest_first(&mut rows, |f| (f.created_at, *f.id.as_uuid()));
        Ok(rows)
    }

    async fn list_forms_by_ids(&self, ids: &[FormId]) -> StoreResult<Vec<Form>> {
        let mut rows = self.read()?.forms.filtered(|f| ids.contains(&f.id));
        newest_first(&mut rows, |f| (f.created_at, *f.id.as_uuid()));
        Ok(rows)
    }

    async fn list_published_forms(&self) -> StoreResult<Vec<Form>> {
        let mut rows = self.read()?.forms.filtered(|f| f.is_published);
        newest_first(&mut rows, |f| (f.created_at, *f.id.as_uuid()));
        Ok(rows)
    }

    async fn assign_users(
        &self,
        form_id: FormId,
        users: &[PrincipalId],
        now: DateTime<Utc>,
    ) -> StoreResult<Form> {
        let mut docs = self.write()?;
        let Some(mut form) = docs.forms.get(form_id) else {
            return Err(StoreError::NotFound("form".into()));
        };
        if let Some(missing) = users.iter().find(|u| !docs.accounts.rows.contains_key(*u)) {
            return Err(StoreError::NotFound(format!("account {missing}")));
        }

        for dropped in form.assigned_users.iter().filter(|u| !users.contains(u)) {
            if let Some(account) = docs.accounts.rows.get_mut(dropped) {
                account.unassign_form(form_id);
            }
        }
        for user in users {
            if let Some(account) = docs.accounts.rows.get_mut(user) {
                account.assign_form(form_id);
            }
        }

        form.set_assigned_users(users.to_vec(), now);
        docs.forms.put(form.clone());
        Ok(form)
    }

    async fn assign_user(
        &self,
        form_id: FormId,
        user: PrincipalId,
        now: DateTime<Utc>,
    ) -> StoreResult<Form> {
        let mut docs = self.write()?;
        let Some(mut form) = docs.forms.get(form_id) else {
            return Err(StoreError::NotFound("form".into()));
        };
        let Some(account) = docs
            .accounts
            .rows
            .get_mut(&user)
            .filter(|a| a.role == Role::ManagedUser)
        else {
            return Err(StoreError::NotFound(format!("managed user {user}")));
        };
        account.assign_form(form_id);

        if !form.assigned_users.contains(&user) {
            let mut users = form.assigned_users.clone();
            users.push(user);
            form.set_assigned_users(users, now);
            docs.forms.put(form.clone());
        }
        Ok(form)
    }

    async fn reserve_submission_slot(
        &self,
        form_id: FormId,
        limit: Option<u64>,
    ) -> StoreResult<SlotReservation> {
        let mut docs = self.write()?;
        let Some(form) = docs.forms.rows.get_mut(&form_id) else {
            return Ok(SlotReservation::FormMissing);
        };
        if limit.is_some_and(|limit| form.submission_count >= limit) {
            return Ok(SlotReservation::LimitReached);
        }
        form.submission_count += 1;
        Ok(SlotReservation::Reserved {
            count: form.submission_count,
        })
    }

    async fn release_submission_slot(&self, form_id: FormId) -> StoreResult<()> {
        let mut docs = self.write()?;
        if let Some(form) = docs.forms.rows.get_mut(&form_id) {
            form.submission_count = form.submission_count.saturating_sub(1);
        }
        Ok(())
    }

    async fn delete_form(&self, form_id: FormId) -> StoreResult<u64> {
        let mut docs = self.write()?;
        if docs.forms.rows.remove(&form_id).is_none() {
            return Err(StoreError::NotFound("form".into()));
        }
        let before = docs.submissions.rows.len();
        docs.submissions.rows.retain(|_, s| s.form_id != form_id);
        let removed = (before - docs.submissions.rows.len()) as u64;
        for account in docs.accounts.rows.values_mut() {
            account.unassign_form(form_id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl SubmissionStore for InMemoryStore {
    async fn insert_submission(&self, submission: &Submission) -> StoreResult<()> {
        let mut docs = self.write()?;
        if !docs.forms.rows.contains_key(&submission.form_id) {
            return Err(StoreError::NotFound("form".into()));
        }
        docs.submissions.put(submission.clone());
        Ok(())
    }

    async fn get_submission(&self, id: SubmissionId) -> StoreResult<Option<Submission>> {
        Ok(self.read()?.submissions.get(id))
    }

    async fn update_submission(&self, submission: &Submission) -> StoreResult<()> {
        let mut docs = self.write()?;
        if !docs.submissions.rows.contains_key(&submission.id) {
            return Err(StoreError::NotFound("submission".into()));
        }
        docs.submissions.put(submission.clone());
        Ok(())
    }

    async fn list_submissions(&self, query: SubmissionQuery) -> StoreResult<Vec<Submission>> {
        let docs = self.read()?;
        let mut rows = docs.submissions.filtered(|s| match query {
            SubmissionQuery::Form(form) => s.form_id == form,
            SubmissionQuery::Tenant(tenant) => s.owner == tenant,
            SubmissionQuery::Submitter(who) => s.submitted_by == Some(who),
            SubmissionQuery::TenantSubmitter(tenant, who) => {
                s.owner == tenant && s.submitted_by == Some(who)
            }
            SubmissionQuery::FormSubmitter(form, who) => {
                s.form_id == form && s.submitted_by == Some(who)
            }
        });
        newest_first(&mut rows, |s| (s.created_at, *s.id.as_uuid()));
        Ok(rows)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.read().map(|_| ())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use formhub_forms::{FormDraft, FormScope, SubmissionMeta};
    use serde_json::Map;

    fn form(owner: TenantId) -> Form {
        Form::new(owner, FormScope::Tenant, FormDraft::default(), Utc::now())
    }

    #[tokio::test]
    async fn duplicate_owner_email_is_rejected() {
        let store = InMemoryStore::new();
        let a = Account::tenant_owner("acme", "o@acme.io", "h".into(), Utc::now());
        let b = Account::tenant_owner("other", "o@acme.io", "h".into(), Utc::now());
        store.insert_account(&a).await.unwrap();
        let err = store.insert_account(&b).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn managed_emails_are_unique_per_tenant_only() {
        let store = InMemoryStore::new();
        let t1 = TenantId::new();
        let t2 = TenantId::new();
        let now = Utc::now();
        store
            .insert_account(&Account::managed_user(t1, "bob", "b@x.io", None, now))
            .await
            .unwrap();
        store
            .insert_account(&Account::managed_user(t2, "bob", "b@x.io", None, now))
            .await
            .unwrap();
        let clash = Account::managed_user(t1, "bobby", "b@x.io", None, now);
        assert!(store.insert_account(&clash).await.is_err());
        assert_eq!(store.find_managed_by_email("b@x.io").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reservation_enforces_limit() {
        let store = InMemoryStore::new();
        let f = form(TenantId::new());
        store.insert_form(&f).await.unwrap();
        assert_eq!(
            store.reserve_submission_slot(f.id, Some(1)).await.unwrap(),
            SlotReservation::Reserved { count: 1 }
        );
        assert_eq!(
            store.reserve_submission_slot(f.id, Some(1)).await.unwrap(),
            SlotReservation::LimitReached
        );
        store.release_submission_slot(f.id).await.unwrap();
        assert_eq!(store.get_form(f.id).await.unwrap().unwrap().submission_count, 0);
        assert_eq!(
            store.reserve_submission_slot(FormId::new(), None).await.unwrap(),
            SlotReservation::FormMissing
        );
    }

    #[tokio::test]
    async fn update_form_keeps_store_owned_fields() {
        let store = InMemoryStore::new();
        let mut f = form(TenantId::new());
        store.insert_form(&f).await.unwrap();
        store.reserve_submission_slot(f.id, None).await.unwrap();
        f.title = "Renamed".into();
        f.submission_count = 99;
        store.update_form(&f).await.unwrap();
        let stored = store.get_form(f.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.submission_count, 1);
    }

    #[tokio::test]
    async fn delete_form_cascades() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let f = form(tenant);
        store.insert_form(&f).await.unwrap();
        let user = Account::managed_user(tenant, "bob", "b@x.io", None, Utc::now());
        store.insert_account(&user).await.unwrap();
        store.assign_users(f.id, &[user.id], Utc::now()).await.unwrap();
        let other = form(tenant);
        store.insert_form(&other).await.unwrap();
        store.assign_user(other.id, user.id, Utc::now()).await.unwrap();
        for _ in 0..3 {
            let s = Submission::new(&f, Some(user.id), None, Map::new(), SubmissionMeta::default(), Utc::now());
            store.insert_submission(&s).await.unwrap();
        }
        let kept = Submission::new(&other, Some(user.id), None, Map::new(), SubmissionMeta::default(), Utc::now());
        store.insert_submission(&kept).await.unwrap();

        assert_eq!(store.delete_form(f.id).await.unwrap(), 3);
        assert!(store.get_form(f.id).await.unwrap().is_none());
        assert!(
            store
                .list_submissions(SubmissionQuery::Form(f.id))
                .await
                .unwrap()
                .is_empty()
        );
        let remaining = store.list_submissions(SubmissionQuery::Form(other.id)).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, kept.id);
        let user = store.get_account(user.id).await.unwrap().unwrap();
        assert_eq!(user.assigned_forms, vec![other.id]);
    }

    #[tokio::test]
    async fn assign_user_adds_without_dropping_others() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let f = form(tenant);
        store.insert_form(&f).await.unwrap();
        let ann = Account::managed_user(tenant, "ann", "a@x.io", None, Utc::now());
        let bob = Account::managed_user(tenant, "bob", "b@x.io", None, Utc::now());
        store.insert_account(&ann).await.unwrap();
        store.insert_account(&bob).await.unwrap();
        store.assign_users(f.id, &[ann.id], Utc::now()).await.unwrap();

        store.assign_user(f.id, bob.id, Utc::now()).await.unwrap();
        let again = store.assign_user(f.id, bob.id, Utc::now()).await.unwrap();
        assert_eq!(again.assigned_users, vec![ann.id, bob.id]);
        for id in [ann.id, bob.id] {
            let account = store.get_account(id).await.unwrap().unwrap();
            assert_eq!(account.assigned_forms, vec![f.id]);
        }

        let owner = Account::tenant_owner("acme", "o@acme.io", "h".into(), Utc::now());
        store.insert_account(&owner).await.unwrap();
        let err = store.assign_user(f.id, owner.id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_managed_user_detaches_from_forms() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let f = form(tenant);
        store.insert_form(&f).await.unwrap();
        let user = Account::managed_user(tenant, "bob", "b@x.io", None, Utc::now());
        store.insert_account(&user).await.unwrap();
        store.assign_users(f.id, &[user.id], Utc::now()).await.unwrap();

        assert!(!store.delete_managed_user(TenantId::new(), user.id).await.unwrap());
        assert!(store.delete_managed_user(tenant, user.id).await.unwrap());
        let f = store.get_form(f.id).await.unwrap().unwrap();
        assert!(f.assigned_users.is_empty());
    }
}
