//! External identity verification for social sign-in.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use formhub_core::DomainError;

/// A verified identity asserted by an external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    /// Provider-scoped stable subject identifier.
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait ExternalIdentityVerifier: Send + Sync {
    /// Verify a provider-issued token. Invalid or unverified tokens are
    /// [`DomainError::Auth`]; provider outages are [`DomainError::Internal`].
    async fn verify(&self, token: &str) -> Result<ExternalIdentity, DomainError>;
}

const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Verifies Google ID tokens against the tokeninfo endpoint.
#[derive(Debug, Clone)]
pub struct GoogleTokenInfoVerifier {
    client: reqwest::Client,
    client_id: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<serde_json::Value>,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleTokenInfoVerifier {
    pub fn new(client_id: impl Into<String>) -> Result<Self, DomainError> {
        Self::with_endpoint(client_id, GOOGLE_TOKENINFO_URL)
    }

    pub fn with_endpoint(
        client_id: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| DomainError::internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            client_id: client_id.into(),
            endpoint: endpoint.into(),
        })
    }
}

fn is_verified(flag: Option<&serde_json::Value>) -> bool {
    match flag {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s == "true",
        _ => false,
    }
}

#[async_trait]
impl ExternalIdentityVerifier for GoogleTokenInfoVerifier {
    async fn verify(&self, token: &str) -> Result<ExternalIdentity, DomainError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("id_token", token)])
            .send()
            .await
            .map_err(|e| DomainError::internal(format!("tokeninfo request failed: {e}")))?;

        if resp.status().is_client_error() {
            return Err(DomainError::auth("external token rejected"));
        }
        if !resp.status().is_success() {
            return Err(DomainError::internal(format!(
                "tokeninfo returned {}",
                resp.status()
            )));
        }

        let info: TokenInfo = resp
            .json()
            .await
            .map_err(|e| DomainError::internal(format!("tokeninfo parse failed: {e}")))?;

        if info.aud != self.client_id {
            return Err(DomainError::auth("external token issued for another client"));
        }
        if !is_verified(info.email_verified.as_ref()) {
            return Err(DomainError::auth("external email is not verified"));
        }
        let email = info
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| DomainError::auth("external token carries no email"))?;

        Ok(ExternalIdentity {
            subject: info.sub,
            email,
            name: info.name,
            picture: info.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn verified_flag_accepts_bool_and_string() {
        assert!(is_verified(Some(&json!(true))));
        assert!(is_verified(Some(&json!("true"))));
        assert!(!is_verified(Some(&json!("false"))));
        assert!(!is_verified(None));
    }
}
