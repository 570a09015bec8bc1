//! Outgoing mail for the account lifecycle flows
//!
//! Flows hold an `Arc<dyn Mailer>`. Delivery is best-effort: [`send_best_effort`]
//! bounds every send with a timeout and logs failures instead of returning them.
//! [`spawn_best_effort`] does the same on a detached task. Log lines name the
//! user id, never the address.

pub mod smtp;
pub mod templates;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub use smtp::{SmtpConfig, SmtpMailer};
pub use templates::{EmailContent, MailTemplates};

/// Mail error types
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    BuildError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Mail delivery timed out")]
    Timeout,
}

/// Delivers verification codes and reset tokens
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_email(
        &self,
        email: &str,
        token: &str,
        name: Option<&str>,
    ) -> Result<(), MailError>;

    async fn send_reset_password_email(
        &self,
        email: &str,
        token: &str,
        name: Option<&str>,
    ) -> Result<(), MailError>;
}

/// Writes mail to the log instead of sending it.
///
/// Used when no SMTP host is configured.
#[derive(Debug, Clone)]
pub struct LogMailer {
    templates: MailTemplates,
}

impl LogMailer {
    pub fn new(templates: MailTemplates) -> Self {
        Self { templates }
    }

    fn log(&self, email: &str, content: EmailContent) {
        tracing::info!(
            to = %email,
            subject = %content.subject,
            "Mail not sent (no SMTP configured):\n{}",
            content.body
        );
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification_email(
        &self,
        email: &str,
        token: &str,
        name: Option<&str>,
    ) -> Result<(), MailError> {
        self.log(email, self.templates.verification(token, name));
        Ok(())
    }

    async fn send_reset_password_email(
        &self,
        email: &str,
        token: &str,
        name: Option<&str>,
    ) -> Result<(), MailError> {
        self.log(email, self.templates.reset_password(token, name));
        Ok(())
    }
}

/// Await a send, giving up after `timeout`. Failures are logged and dropped.
///
/// Returns whether the mail was handed to the transport.
pub async fn send_best_effort<F>(kind: &str, user_id: Uuid, timeout: Duration, send: F) -> bool
where
    F: Future<Output = Result<(), MailError>>,
{
    let result = match tokio::time::timeout(timeout, send).await {
        Ok(result) => result,
        Err(_) => Err(MailError::Timeout),
    };

    match result {
        Ok(()) => {
            tracing::info!("{} email sent for user {}", kind, user_id);
            true
        }
        Err(e) => {
            tracing::warn!("Failed to send {} email for user {}: {}", kind, user_id, e);
            false
        }
    }
}

/// [`send_best_effort`] on its own task; the caller does not wait for delivery
pub fn spawn_best_effort<F>(
    kind: &'static str,
    user_id: Uuid,
    timeout: Duration,
    send: F,
) -> JoinHandle<bool>
where
    F: Future<Output = Result<(), MailError>> + Send + 'static,
{
    tokio::spawn(send_best_effort(kind, user_id, timeout, send))
}
