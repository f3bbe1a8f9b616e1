use chrono::Utc;
use serde_json::{Map, Value};
use tracing::instrument;

use formhub_auth::account::{normalize_email, validate_email};
use formhub_auth::{AccessRequest, Account, Principal, Role, authorize, authorize_public};
use formhub_core::{DomainError, DomainResult, FormId, PrincipalId, SubmissionId};
use formhub_forms::{Form, FormScope, Submission, SubmissionMeta, parse_answers};

use crate::services::derived_username;
use crate::store::{AccountLookup, SlotReservation, Store, SubmissionQuery};

/// Accepting, listing and amending submissions.
pub struct SubmissionService<S> {
    store: S,
}

impl<S: Store> SubmissionService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn load_form(&self, form_id: FormId) -> DomainResult<Form> {
        self.store
            .get_form(form_id)
            .await?
            .ok_or_else(|| DomainError::not_found("form"))
    }

    /// Reserve a counter slot, then store. The slot is released if the
    /// insert fails so the counter matches the stored submissions.
    async fn record(
        &self,
        form: &Form,
        submitter: Option<&Account>,
        answers: Map<String, Value>,
        meta: SubmissionMeta,
        limit: Option<u64>,
    ) -> DomainResult<Submission> {
        match self.store.reserve_submission_slot(form.id, limit).await? {
            SlotReservation::Reserved { count } => {
                tracing::debug!(form_id = %form.id, count, "submission slot reserved");
            }
            SlotReservation::LimitReached => {
                return Err(DomainError::limit_exceeded("this form is no longer accepting submissions"));
            }
            SlotReservation::FormMissing => return Err(DomainError::not_found("form")),
        }

        let submission = Submission::new(
            form,
            submitter.map(|a| a.id),
            submitter.map(|a| a.email.clone()),
            answers,
            meta,
            Utc::now(),
        );
        if let Err(e) = self.store.insert_submission(&submission).await {
            if let Err(release) = self.store.release_submission_slot(form.id).await {
                tracing::error!(form_id = %form.id, error = %release, "failed to release submission slot");
            }
            return Err(e.into());
        }
        tracing::info!(submission_id = %submission.id, form_id = %form.id, "submission accepted");
        Ok(submission)
    }

    /// A managed user submitting one of its assigned forms.
    #[instrument(skip(self, principal, answers, meta), fields(principal_id = %principal.principal_id), err)]
    pub async fn submit_assigned(
        &self,
        principal: &Principal,
        form_id: FormId,
        answers: Option<Value>,
        meta: SubmissionMeta,
    ) -> DomainResult<Submission> {
        authorize(principal, &AccessRequest::Role(Role::ManagedUser))?;
        let answers = parse_answers(answers)?;
        let form = self.load_form(form_id).await?;
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
        self.record(&form, Some(&account), answers, meta, None).await
    }

    /// Anonymous submission through a public token.
    ///
    /// With an email, the submission is attributed to the managed user of
    /// the form's tenant holding that email, created without a password if
    /// missing. Without one it stays anonymous.
    #[instrument(skip(self, answers, email, meta), err)]
    pub async fn submit_public(
        &self,
        public_token: &str,
        answers: Option<Value>,
        email: Option<String>,
        meta: SubmissionMeta,
    ) -> DomainResult<Submission> {
        let answers = parse_answers(answers)?;
        let form = self
            .store
            .find_form_by_token(public_token.trim())
            .await?
            .ok_or_else(|| DomainError::not_found("form"))?;
        authorize_public(form.is_published)?;
        if form.limit_reached() {
            return Err(DomainError::limit_exceeded("this form is no longer accepting submissions"));
        }

        let email = email.filter(|e| !e.trim().is_empty());
        let submitter = match email {
            Some(email) => Some(self.public_submitter(&form, &email).await?),
            None => None,
        };

        if let Some(account) = &submitter {
            if !form.public_settings.allow_multiple_submissions {
                let previous = self
                    .store
                    .list_submissions(SubmissionQuery::FormSubmitter(form.id, account.id))
                    .await?;
                if !previous.is_empty() {
                    return Err(DomainError::limit_exceeded("you have already submitted this form"));
                }
            }
        }

        self.record(
            &form,
            submitter.as_ref(),
            answers,
            meta,
            form.public_settings.submission_limit,
        )
        .await
    }

    async fn public_submitter(&self, form: &Form, email: &str) -> DomainResult<Account> {
        validate_email(email)?;
        let email = normalize_email(email);
        if let Some(account) = self
            .store
            .find_account(AccountLookup::ManagedEmail {
                tenant: form.owner,
                email: &email,
            })
            .await?
        {
            return Ok(account);
        }
        let now = Utc::now();
        let mut account = Account::managed_user(form.owner, &derived_username(&email), &email, None, now);
        self.store.insert_account(&account).await?;
        tracing::info!(principal_id = %account.id, tenant_id = %form.owner, "managed user created from public submission");

        // New submitters are pre-assigned the form they came through.
        self.store.assign_user(form.id, account.id, now).await?;
        account.assign_form(form.id);
        Ok(account)
    }

    /// A standalone user submitting any standalone form.
    #[instrument(skip(self, principal, answers, meta), fields(principal_id = %principal.principal_id), err)]
    pub async fn submit_standalone(
        &self,
        principal: &Principal,
        form_id: FormId,
        answers: Option<Value>,
        meta: SubmissionMeta,
    ) -> DomainResult<Submission> {
        authorize(principal, &AccessRequest::Role(Role::StandaloneUser))?;
        let answers = parse_answers(answers)?;
        let form = self.load_form(form_id).await?;
        if form.scope != FormScope::Standalone {
            return Err(DomainError::not_found("form"));
        }
        let account = self
            .store
            .get_account(principal.principal_id)
            .await?
            .ok_or_else(|| DomainError::auth("account no longer exists"))?;
        self.record(&form, Some(&account), answers, meta, None).await
    }

    /// The caller's own submissions, newest first.
    pub async fn list_mine(&self, principal: &Principal) -> DomainResult<Vec<Submission>> {
        Ok(self
            .store
            .list_submissions(SubmissionQuery::Submitter(principal.principal_id))
            .await?)
    }

    pub async fn get_mine(&self, principal: &Principal, id: SubmissionId) -> DomainResult<Submission> {
        let submission = self
            .store
            .get_submission(id)
            .await?
            .ok_or_else(|| DomainError::not_found("submission"))?;
        authorize(
            principal,
            &AccessRequest::OwnRecord {
                author: submission.submitted_by,
            },
        )?;
        Ok(submission)
    }

    /// Replace the answers of one of the caller's submissions.
    ///
    /// Submissions of other principals are reported as missing.
    #[instrument(skip(self, principal, answers), fields(principal_id = %principal.principal_id), err)]
    pub async fn amend_mine(
        &self,
        principal: &Principal,
        id: SubmissionId,
        answers: Option<Value>,
    ) -> DomainResult<Submission> {
        let answers = parse_answers(answers)?;
        let mut submission = self
            .store
            .get_submission(id)
            .await?
            .filter(|s| s.submitted_by == Some(principal.principal_id))
            .ok_or_else(|| DomainError::not_found("submission"))?;
        submission.amend(answers, Utc::now());
        self.store.update_submission(&submission).await?;
        Ok(submission)
    }

    /// Submissions of one form, for its owner.
    pub async fn list_for_form(&self, principal: &Principal, form_id: FormId) -> DomainResult<Vec<Submission>> {
        let form = self.load_form(form_id).await?;
        authorize(principal, &AccessRequest::Owned { owner: form.owner })?;
        Ok(self
            .store
            .list_submissions(SubmissionQuery::Form(form_id))
            .await?)
    }

    /// Every submission in the caller's tenant.
    pub async fn list_for_tenant(&self, principal: &Principal) -> DomainResult<Vec<Submission>> {
        authorize(principal, &AccessRequest::Role(Role::TenantOwner))?;
        Ok(self
            .store
            .list_submissions(SubmissionQuery::Tenant(principal.principal_id.as_tenant()))
            .await?)
    }

    /// Submissions by one managed user of the caller's tenant.
    pub async fn list_for_user(&self, principal: &Principal, user_id: PrincipalId) -> DomainResult<Vec<Submission>> {
        authorize(principal, &AccessRequest::Role(Role::TenantOwner))?;
        let user = self
            .store
            .get_account(user_id)
            .await?
            .filter(|a| a.role == Role::ManagedUser)
            .ok_or_else(|| DomainError::not_found("user"))?;
        let tenant = user.tenant();
        authorize(principal, &AccessRequest::Owned { owner: tenant })?;
        Ok(self
            .store
            .list_submissions(SubmissionQuery::TenantSubmitter(tenant, user_id))
            .await?)
    }
}
