use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use formhub_core::{Entity, FormId, PrincipalId, TenantId};

use crate::field::Field;

pub const DEFAULT_TITLE: &str = "Untitled Form";

/// Which surface a form belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormScope {
    /// Owned by a tenant owner; filled by assigned managed users or, once
    /// published, by anyone holding the public token.
    Tenant,
    /// Owned by a standalone user; readable and submittable by any
    /// standalone user.
    Standalone,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicFormSettings {
    #[serde(default)]
    pub allow_multiple_submissions: bool,
    /// Upper bound on accepted submissions, `None` for unlimited.
    #[serde(default)]
    pub submission_limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub id: FormId,
    pub owner: TenantId,
    pub scope: FormScope,
    pub title: String,
    pub description: String,
    pub fields: Vec<Field>,
    pub assigned_users: Vec<PrincipalId>,
    pub is_published: bool,
    pub public_token: Option<String>,
    pub public_settings: PublicFormSettings,
    /// Accepted submissions. Maintained by the store, never by callers.
    pub submission_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Form {
    type Id = FormId;

    fn id(&self) -> FormId {
        self.id
    }
}

/// Input for a new form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<Field>,
}

/// Partial update; `None` leaves the attribute untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: Option<Vec<Field>>,
    pub public_settings: Option<PublicFormSettings>,
}

/// The only view of a form exposed to anonymous callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicFormView {
    pub id: FormId,
    pub title: String,
    pub description: String,
    pub fields: Vec<Field>,
    pub public_token: String,
}

/// Listing entry for the public catalogue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicFormSummary {
    pub title: String,
    pub description: String,
    pub fields: Vec<Field>,
    pub public_token: String,
}

fn clean_title(title: Option<String>) -> Option<String> {
    title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

impl Form {
    pub fn new(owner: TenantId, scope: FormScope, draft: FormDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: FormId::new(),
            owner,
            scope,
            title: clean_title(draft.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            description: draft.description.map(|d| d.trim().to_string()).unwrap_or_default(),
            fields: draft.fields,
            assigned_users: Vec::new(),
            is_published: false,
            public_token: None,
            public_settings: PublicFormSettings::default(),
            submission_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update. A blank title is ignored.
    pub fn apply_patch(&mut self, patch: FormPatch, now: DateTime<Utc>) {
        if let Some(title) = clean_title(patch.title) {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description.trim().to_string();
        }
        if let Some(fields) = patch.fields {
            self.fields = fields;
        }
        if let Some(settings) = patch.public_settings {
            self.public_settings = settings;
        }
        self.updated_at = now;
    }

    /// Mark published and return the public token.
    ///
    /// The token is generated on first publication and reused afterwards.
    pub fn publish(&mut self, now: DateTime<Utc>) -> &str {
        if !self.is_published {
            self.updated_at = now;
        }
        self.is_published = true;
        self.public_token
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .as_str()
    }

    pub fn set_assigned_users(&mut self, users: Vec<PrincipalId>, now: DateTime<Utc>) {
        self.assigned_users = users;
        self.updated_at = now;
    }

    /// Whether the public submission cap has been reached.
    pub fn limit_reached(&self) -> bool {
        self.public_settings
            .submission_limit
            .is_some_and(|limit| self.submission_count >= limit)
    }

    pub fn public_view(&self) -> Option<PublicFormView> {
        Some(PublicFormView {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            fields: self.fields.clone(),
            public_token: self.public_token.clone()?,
        })
    }

    pub fn public_summary(&self) -> Option<PublicFormSummary> {
        Some(PublicFormSummary {
            title: self.title.clone(),
            description: self.description.clone(),
            fields: self.fields.clone(),
            public_token: self.public_token.clone()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> Form {
        Form::new(TenantId::new(), FormScope::Tenant, FormDraft::default(), Utc::now())
    }

    #[test]
    fn blank_title_defaults() {
        let f = Form::new(
            TenantId::new(),
            FormScope::Tenant,
            FormDraft {
                title: Some("   ".into()),
                ..FormDraft::default()
            },
            Utc::now(),
        );
        assert_eq!(f.title, DEFAULT_TITLE);
        assert!(!f.is_published);
        assert_eq!(f.submission_count, 0);
    }

    #[test]
    fn publish_is_idempotent() {
        let mut f = form();
        let first = f.publish(Utc::now()).to_string();
        let second = f.publish(Utc::now()).to_string();
        assert_eq!(first, second);
        assert!(f.is_published);
        assert!(f.public_view().is_some());
    }

    #[test]
    fn unpublished_form_has_no_public_view() {
        assert!(form().public_view().is_none());
    }

    #[test]
    fn public_summary_carries_schema_but_not_ownership() {
        let mut f = form();
        f.fields = vec![Field {
            id: "q1".into(),
            kind: "text".to_string().into(),
            label: "Question".into(),
            placeholder: String::new(),
            required: true,
            default_value: String::new(),
            options: Vec::new(),
            constraints: Default::default(),
        }];
        f.set_assigned_users(vec![PrincipalId::new()], Utc::now());
        assert!(f.public_summary().is_none());
        f.publish(Utc::now());

        let summary = serde_json::to_value(f.public_summary().unwrap()).unwrap();
        assert_eq!(summary["fields"][0]["id"], "q1");
        assert_eq!(summary["publicToken"], f.public_token.as_deref().unwrap());
        for hidden in ["owner", "assignedUsers", "submissionCount", "id"] {
            assert!(summary.get(hidden).is_none(), "{hidden} leaked");
        }
    }

    #[test]
    fn update_ignores_blank_title_and_keeps_unset_attributes() {
        let mut f = form();
        f.apply_patch(
            FormPatch {
                title: Some("Survey".into()),
                description: Some(" about you ".into()),
                ..FormPatch::default()
            },
            Utc::now(),
        );
        f.apply_patch(
            FormPatch {
                title: Some(" ".into()),
                ..FormPatch::default()
            },
            Utc::now(),
        );
        assert_eq!(f.title, "Survey");
        assert_eq!(f.description, "about you");
    }

    #[test]
    fn limit_reached_respects_cap() {
        let mut f = form();
        assert!(!f.limit_reached());
        f.public_settings.submission_limit = Some(2);
        f.submission_count = 1;
        assert!(!f.limit_reached());
        f.submission_count = 2;
        assert!(f.limit_reached());
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: every publish after the first returns the same token.
            #[test]
            fn republish_keeps_the_token(times in 1usize..8, title in "[a-zA-Z ]{0,12}") {
                let mut f = form();
                f.apply_patch(FormPatch { title: Some(title), ..FormPatch::default() }, Utc::now());
                let token = f.publish(Utc::now()).to_string();
                prop_assert!(!token.is_empty());
                for _ in 0..times {
                    prop_assert_eq!(f.publish(Utc::now()), token.as_str());
                    prop_assert!(f.is_published);
                }
            }
        }
    }
}
