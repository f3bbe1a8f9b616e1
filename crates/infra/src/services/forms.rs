use std::collections::HashSet;

use chrono::Utc;
use serde_json::Value;
use tracing::instrument;

use formhub_auth::{AccessRequest, Principal, Role, authorize, authorize_public};
use formhub_core::{DomainError, DomainResult, FormId, PrincipalId, TenantId};
use formhub_forms::{
    Field, Form, FormDraft, FormPatch, FormScope, PublicFormSettings, PublicFormSummary, PublicFormView,
    normalize_fields,
};

use crate::store::Store;

#[derive(Debug, Clone, Default)]
pub struct NewForm {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Raw field list; normalized before storing.
    pub fields: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct FormChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: Option<Value>,
    pub public_settings: Option<PublicFormSettings>,
}

#[derive(Debug, Clone)]
pub struct PublishedForm {
    pub form: Form,
    pub public_url: String,
}

/// Absent, `null` and empty lists mean "no fields"; anything else must
/// normalize to at least one valid field.
fn optional_fields(raw: Option<Value>) -> DomainResult<Option<Vec<Field>>> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) if items.is_empty() => Ok(Some(Vec::new())),
        Some(raw) => normalize_fields(&raw).map(Some),
    }
}

/// Form lifecycle for owners plus read access for assignees, standalone
/// users and anonymous callers.
pub struct FormService<S> {
    store: S,
    frontend_url: String,
}

impl<S: Store> FormService<S> {
    pub fn new(store: S, frontend_url: impl Into<String>) -> Self {
        Self {
            store,
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn public_url(&self, token: &str) -> String {
        format!("{}/form/{}", self.frontend_url, token)
    }

    /// The tenant the caller authors `scope` forms in. Tenant forms belong
    /// to tenant owners, standalone forms to standalone users.
    fn owner_tenant(principal: &Principal, scope: FormScope) -> DomainResult<TenantId> {
        let role = match scope {
            FormScope::Tenant => Role::TenantOwner,
            FormScope::Standalone => Role::StandaloneUser,
        };
        authorize(principal, &AccessRequest::Role(role))?;
        Ok(principal.principal_id.as_tenant())
    }

    async fn load(&self, form_id: FormId) -> DomainResult<Form> {
        self.store
            .get_form(form_id)
            .await?
            .ok_or_else(|| DomainError::not_found("form"))
    }

    /// Load a form and check the caller is the tenant owner owning it.
    pub async fn owned_form(&self, principal: &Principal, form_id: FormId) -> DomainResult<Form> {
        self.owned_in(principal, form_id, FormScope::Tenant).await
    }

    async fn owned_in(&self, principal: &Principal, form_id: FormId, scope: FormScope) -> DomainResult<Form> {
        Self::owner_tenant(principal, scope)?;
        let form = self.load(form_id).await?;
        authorize(principal, &AccessRequest::Owned { owner: form.owner })?;
        Ok(form)
    }

    #[instrument(skip_all, fields(owner = %principal.principal_id), err)]
    pub async fn create(&self, principal: &Principal, input: NewForm) -> DomainResult<Form> {
        let fields = optional_fields(input.fields)?.unwrap_or_default();
        self.insert_new(
            principal,
            FormScope::Tenant,
            FormDraft {
                title: input.title,
                description: input.description,
                fields,
            },
        )
        .await
    }

    async fn insert_new(&self, principal: &Principal, scope: FormScope, draft: FormDraft) -> DomainResult<Form> {
        let tenant = Self::owner_tenant(principal, scope)?;
        let form = Form::new(tenant, scope, draft, Utc::now());
        self.store.insert_form(&form).await?;
        tracing::info!(form_id = %form.id, ?scope, "form created");
        Ok(form)
    }

    #[instrument(skip(self, principal, changes), fields(owner = %principal.principal_id), err)]
    pub async fn update(
        &self,
        principal: &Principal,
        form_id: FormId,
        changes: FormChanges,
    ) -> DomainResult<Form> {
        let fields = optional_fields(changes.fields)?;
        self.apply_patch(
            principal,
            form_id,
            FormScope::Tenant,
            FormPatch {
                title: changes.title,
                description: changes.description,
                fields,
                public_settings: changes.public_settings,
            },
        )
        .await
    }

    async fn apply_patch(
        &self,
        principal: &Principal,
        form_id: FormId,
        scope: FormScope,
        patch: FormPatch,
    ) -> DomainResult<Form> {
        let mut form = self.owned_in(principal, form_id, scope).await?;
        form.apply_patch(patch, Utc::now());
        self.store.update_form(&form).await?;
        self.load(form_id).await
    }

    /// Create or update, requiring a non-empty field list.
    pub async fn save_standalone(
        &self,
        principal: &Principal,
        form_id: Option<FormId>,
        input: NewForm,
    ) -> DomainResult<Form> {
        authorize(principal, &AccessRequest::Role(Role::StandaloneUser))?;
        let raw = input
            .fields
            .filter(|v| !v.is_null())
            .ok_or_else(|| DomainError::validation("fields are required"))?;
        let fields = normalize_fields(&raw)?;

        match form_id {
            Some(id) => {
                self.apply_patch(
                    principal,
                    id,
                    FormScope::Standalone,
                    FormPatch {
                        title: input.title,
                        description: input.description,
                        fields: Some(fields),
                        public_settings: None,
                    },
                )
                .await
            }
            None => {
                self.insert_new(
                    principal,
                    FormScope::Standalone,
                    FormDraft {
                        title: input.title,
                        description: input.description,
                        fields,
                    },
                )
                .await
            }
        }
    }

    /// Delete a form with its submissions. Returns how many were removed.
    #[instrument(skip(self, principal), fields(owner = %principal.principal_id), err)]
    pub async fn delete(&self, principal: &Principal, form_id: FormId) -> DomainResult<u64> {
        self.remove(principal, form_id, FormScope::Tenant).await
    }

    /// Delete one of the caller's standalone forms with its submissions.
    #[instrument(skip(self, principal), fields(owner = %principal.principal_id), err)]
    pub async fn delete_standalone(&self, principal: &Principal, form_id: FormId) -> DomainResult<u64> {
        self.remove(principal, form_id, FormScope::Standalone).await
    }

    async fn remove(&self, principal: &Principal, form_id: FormId, scope: FormScope) -> DomainResult<u64> {
        self.owned_in(principal, form_id, scope).await?;
        let removed = self.store.delete_form(form_id).await?;
        tracing::info!(%form_id, removed_submissions = removed, "form deleted");
        Ok(removed)
    }

    #[instrument(skip(self, principal), fields(owner = %principal.principal_id), err)]
    pub async fn publish(&self, principal: &Principal, form_id: FormId) -> DomainResult<PublishedForm> {
        let mut form = self.owned_form(principal, form_id).await?;
        let token = form.publish(Utc::now()).to_string();
        self.store.update_form(&form).await?;
        Ok(PublishedForm {
            public_url: self.public_url(&token),
            form,
        })
    }

    /// Replace the form's assignees. Every id must be a managed user of the
    /// form's tenant.
    #[instrument(skip(self, principal, user_ids), fields(owner = %principal.principal_id), err)]
    pub async fn assign_users(
        &self,
        principal: &Principal,
        form_id: FormId,
        user_ids: Vec<PrincipalId>,
    ) -> DomainResult<Form> {
        let form = self.owned_form(principal, form_id).await?;

        let mut seen = HashSet::new();
        let users: Vec<PrincipalId> = user_ids.into_iter().filter(|id| seen.insert(*id)).collect();

        let mut foreign = Vec::new();
        for id in &users {
            let ok = self
                .store
                .get_account(*id)
                .await?
                .is_some_and(|a| a.role == Role::ManagedUser && a.tenant_id == Some(form.owner));
            if !ok {
                foreign.push(id.to_string());
            }
        }
        if !foreign.is_empty() {
            return Err(DomainError::validation(format!(
                "not managed users of this tenant: {}",
                foreign.join(", ")
            )));
        }

        let form = self.store.assign_users(form_id, &users, Utc::now()).await?;
        tracing::info!(%form_id, assigned = users.len(), "form assignees replaced");
        Ok(form)
    }

    /// Forms of the caller's tenant, newest first.
    pub async fn list_owned(&self, principal: &Principal) -> DomainResult<Vec<Form>> {
        let tenant = Self::owner_tenant(principal, FormScope::Tenant)?;
        Ok(self.store.list_forms(tenant).await?)
    }

    /// Standalone forms authored by the caller, newest first.
    pub async fn list_standalone_owned(&self, principal: &Principal) -> DomainResult<Vec<Form>> {
        let tenant = Self::owner_tenant(principal, FormScope::Standalone)?;
        Ok(self.store.list_forms(tenant).await?)
    }

    /// Forms currently assigned to a managed user, per its live record.
    pub async fn list_assigned(&self, principal: &Principal) -> DomainResult<Vec<Form>> {
        authorize(principal, &AccessRequest::Role(Role::ManagedUser))?;
        let account = self
            .store
            .get_account(principal.principal_id)
            .await?
            .ok_or_else(|| DomainError::auth("account no longer exists"))?;
        let tenant = account.tenant();
        let forms = self.store.list_forms_by_ids(&account.assigned_forms).await?;
        Ok(forms.into_iter().filter(|f| f.owner == tenant).collect())
    }

    /// One assigned form; assignment is re-checked against the live record.
    pub async fn get_assigned(&self, principal: &Principal, form_id: FormId) -> DomainResult<Form> {
        authorize(principal, &AccessRequest::Role(Role::ManagedUser))?;
        let form = self.load(form_id).await?;
        let account = self
            .store
            .get_account(principal.principal_id)
            .await?
            .ok_or_else(|| DomainError::auth("account no longer exists"))?;
        authorize(
            principal,
            &AccessRequest::AssignedForm {
                form_id,
                owner: form.owner,
                live_assignments: &account.assigned_forms,
            },
        )?;
        Ok(form)
    }

    /// Any standalone-scope form, for standalone users.
    pub async fn get_standalone(&self, principal: &Principal, form_id: FormId) -> DomainResult<Form> {
        authorize(principal, &AccessRequest::Role(Role::StandaloneUser))?;
        self.load(form_id)
            .await
            .and_then(|f| match f.scope {
                FormScope::Standalone => Ok(f),
                FormScope::Tenant => Err(DomainError::not_found("form")),
            })
    }

    /// Title, description, field schema and token of every published form.
    pub async fn list_public(&self) -> DomainResult<Vec<PublicFormSummary>> {
        let forms = self.store.list_published_forms().await?;
        Ok(forms.iter().filter_map(Form::public_summary).collect())
    }

    pub async fn get_public(&self, token: &str) -> DomainResult<PublicFormView> {
        let form = self
            .store
            .find_form_by_token(token.trim())
            .await?
            .ok_or_else(|| DomainError::not_found("form"))?;
        authorize_public(form.is_published)?;
        form.public_view()
            .ok_or_else(|| DomainError::not_found("form"))
    }
}
