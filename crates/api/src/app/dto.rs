use std::net::SocketAddr;
use std::str::FromStr;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequest, Request},
    http::{HeaderMap, StatusCode, header},
    response::Response,
    Json,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use formhub_auth::Account;
use formhub_core::{DomainError, DomainResult};
use formhub_forms::{PublicFormSettings, SubmissionMeta};
use formhub_infra::services::{FormChanges, NewForm, NewManagedUser, Session};

use crate::app::errors;

// -------------------------
// Body extraction
// -------------------------

/// `Json<T>` whose rejections use the failure envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                rejection.body_text(),
            )),
        }
    }
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantSignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublicLinkLoginRequest {
    pub email: String,
    pub password: String,
    pub public_form_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalLoginRequest {
    #[serde(alias = "credential")]
    pub external_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
    pub password_confirm: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: Option<String>,
}

impl From<CreateUserRequest> for NewManagedUser {
    fn from(body: CreateUserRequest) -> Self {
        NewManagedUser {
            username: body.username,
            email: body.email,
            password: body.password,
            password_confirm: body.password_confirm,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormRequest {
    pub form_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: Option<Value>,
    pub public_settings: Option<PublicFormSettings>,
}

impl FormRequest {
    pub fn into_new_form(self) -> NewForm {
        NewForm {
            title: self.title,
            description: self.description,
            fields: self.fields,
        }
    }

    pub fn into_changes(self) -> FormChanges {
        FormChanges {
            title: self.title,
            description: self.description,
            fields: self.fields,
            public_settings: self.public_settings,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssignUsersRequest {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitRequest {
    #[serde(alias = "responses")]
    pub answers: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublicSubmitRequest {
    #[serde(alias = "token")]
    pub public_token: String,
    #[serde(alias = "responses")]
    pub answers: Option<Value>,
    pub email: Option<String>,
}

// -------------------------
// Request helpers
// -------------------------

pub fn parse_id<T>(raw: &str) -> DomainResult<T>
where
    T: FromStr<Err = DomainError>,
{
    raw.trim().parse()
}

pub fn parse_ids<T>(raw: &[String]) -> DomainResult<Vec<T>>
where
    T: FromStr<Err = DomainError>,
{
    raw.iter().map(|id| parse_id(id)).collect()
}

/// Client address (first `X-Forwarded-For` hop, else the peer) and user agent.
pub fn submission_meta(headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> SubmissionMeta {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let forwarded = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    SubmissionMeta {
        ip_address: forwarded.or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string())),
        user_agent: header_str(header::USER_AGENT.as_str()).map(str::to_string),
    }
}

// -------------------------
// Response mapping
// -------------------------

/// Public view of an account. Credentials and reset state are never included.
pub fn account_to_json(account: &Account) -> Value {
    json!({
        "id": account.id.to_string(),
        "role": account.role.as_str(),
        "tenantId": account.tenant_id.map(|t| t.to_string()),
        "username": account.username,
        "email": account.email,
        "assignedForms": account.assigned_forms.iter().map(|f| f.to_string()).collect::<Vec<_>>(),
        "picture": account.picture,
        "hasPassword": account.password_hash.is_some(),
        "createdAt": account.created_at,
        "updatedAt": account.updated_at,
    })
}

pub fn session_to_json(session: &Session) -> Value {
    json!({
        "token": session.token,
        "expiresAt": session.expires_at,
        "user": account_to_json(&session.account),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;
    use formhub_core::FormId;

    #[test]
    fn account_json_hides_credentials() {
        let account = Account::tenant_owner("owner", "o@x.com", "$argon2id$hash".into(), Utc::now());
        let body = account_to_json(&account);
        let text = body.to_string();
        assert!(!text.contains("argon2"));
        assert!(body.get("passwordHash").is_none());
        assert_eq!(body["role"], "tenant_owner");
        assert_eq!(body["hasPassword"], true);
    }

    #[test]
    fn form_request_accepts_partial_bodies() {
        let req: FormRequest = serde_json::from_value(json!({"title": "T"})).unwrap();
        assert_eq!(req.title.as_deref(), Some("T"));
        assert!(req.fields.is_none());
        let req: FormRequest =
            serde_json::from_value(json!({"publicSettings": {"submissionLimit": 3}})).unwrap();
        assert_eq!(req.public_settings.unwrap().submission_limit, Some(3));
    }

    #[test]
    fn ids_are_validated() {
        let id = FormId::new();
        assert_eq!(parse_id::<FormId>(&format!(" {id} ")).unwrap(), id);
        assert!(matches!(parse_id::<FormId>("nope"), Err(DomainError::Validation(_))));
    }

    #[test]
    fn forwarded_address_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.1.1.1, 10.2.2.2"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("agent/1"));
        let peer = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000)));
        let meta = submission_meta(&headers, Some(peer));
        assert_eq!(meta.ip_address.as_deref(), Some("10.1.1.1"));
        assert_eq!(meta.user_agent.as_deref(), Some("agent/1"));

        let meta = submission_meta(&HeaderMap::new(), Some(peer));
        assert_eq!(meta.ip_address.as_deref(), Some("127.0.0.1"));
    }
}
