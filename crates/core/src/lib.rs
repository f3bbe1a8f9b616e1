//! Identifiers and the shared error model.
//!
//! Everything here is pure: no IO, no transport, no storage.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{FormId, PrincipalId, SubmissionId, TenantId};
