use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use formhub_core::{DomainError, Entity, FormId, PrincipalId, SubmissionId, TenantId};

use crate::form::Form;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Draft,
    #[default]
    Submitted,
}

/// Request metadata captured with a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    pub form_id: FormId,
    /// Always the owner of `form_id` at creation time.
    pub owner: TenantId,
    pub submitted_by: Option<PrincipalId>,
    pub submitter_email: Option<String>,
    pub answers: Map<String, Value>,
    pub status: SubmissionStatus,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Submission {
    type Id = SubmissionId;

    fn id(&self) -> SubmissionId {
        self.id
    }
}

impl Submission {
    pub fn new(
        form: &Form,
        submitted_by: Option<PrincipalId>,
        submitter_email: Option<String>,
        answers: Map<String, Value>,
        meta: SubmissionMeta,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SubmissionId::new(),
            form_id: form.id,
            owner: form.owner,
            submitted_by,
            submitter_email,
            answers,
            status: SubmissionStatus::Submitted,
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the answers wholesale.
    pub fn amend(&mut self, answers: Map<String, Value>, now: DateTime<Utc>) {
        self.answers = answers;
        self.updated_at = now;
    }
}

/// Answers must be a JSON object keyed by field id.
pub fn parse_answers(raw: Option<Value>) -> Result<Map<String, Value>, DomainError> {
    match raw {
        Some(Value::Object(map)) => Ok(map),
        Some(Value::Null) | None => Err(DomainError::validation("answers are required")),
        Some(_) => Err(DomainError::validation("answers must be an object")),
    }
}
