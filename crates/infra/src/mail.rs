//! Outbound mail.
//!
//! Delivery transport is pluggable; the bundled [`LogMailer`] writes the
//! message to the log, which is what dev deployments without SMTP use.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, to: &str, reset_link: &str) -> Result<(), MailError>;

    /// Flush and release transport resources.
    async fn shutdown(&self) {}
}

/// Logs outgoing mail instead of delivering it.
#[derive(Debug, Clone, Default)]
pub struct LogMailer {
    /// Include the reset link itself in the log line (dev only).
    reveal_links: bool,
}

impl LogMailer {
    pub fn new(reveal_links: bool) -> Self {
        Self { reveal_links }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, to: &str, reset_link: &str) -> Result<(), MailError> {
        if self.reveal_links {
            tracing::info!(to, reset_link, "password reset mail (not delivered)");
        } else {
            tracing::info!(to, "password reset mail (not delivered)");
        }
        Ok(())
    }

    async fn shutdown(&self) {
        tracing::debug!("log mailer stopped");
    }
}
