//! Form definitions, field normalization and submissions.
//!
//! Pure domain: no IO. Ownership and assignment checks are made by the
//! services in `formhub-infra` using `formhub-auth`.

pub mod field;
pub mod form;
pub mod normalize;
pub mod submission;

pub use field::{Field, FieldConstraints, FieldKind};
pub use form::{Form, FormDraft, FormPatch, FormScope, PublicFormSettings, PublicFormSummary, PublicFormView};
pub use normalize::{NormalizedField, normalize_field, normalize_fields};
pub use submission::{Submission, SubmissionMeta, SubmissionStatus, parse_answers};
