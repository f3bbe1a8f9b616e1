//! Infrastructure layer: persistence, outbound mail, external identity and
//! the application services built on them.

pub mod identity;
pub mod mail;
pub mod services;
pub mod store;


pub use identity::{ExternalIdentity, ExternalIdentityVerifier, GoogleTokenInfoVerifier};
pub use mail::{LogMailer, MailError, Mailer};
pub use store::{InMemoryStore, PostgresStore, Store, StoreError, StoreResult};
