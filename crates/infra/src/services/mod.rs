//! Application services: the operations behind every endpoint.
//!
//! Each service is generic over the persistence contract and performs its
//! access checks with the pure guard from `formhub-auth` after loading the
//! facts it needs.

pub mod accounts;
pub mod forms;
pub mod submissions;

pub use accounts::{AccountService, NewManagedUser, OwnerSignup, Session, StandaloneSignup};
pub use forms::{FormChanges, FormService, NewForm, PublishedForm};
pub use submissions::SubmissionService;

use formhub_core::DomainError;

/// Run CPU-bound work (password hashing) off the async workers.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, DomainError>
where
    F: FnOnce() -> Result<T, DomainError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| DomainError::internal(format!("blocking task failed: {e}")))?
}

/// Username for accounts created implicitly from an email address.
pub(crate) fn derived_username(email: &str) -> String {
    let local = email.split('@').next().unwrap_or("user");
    let cleaned: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let base = if cleaned.is_empty() { "user" } else { cleaned.as_str() };
    format!("{}_{}", base.to_lowercase(), chrono::Utc::now().timestamp_millis())
}
