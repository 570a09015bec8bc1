//! SMTP delivery through lettre's async transport

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::templates::{EmailContent, MailTemplates};
use super::{MailError, Mailer};

const DEFAULT_SMTP_PORT: u16 = 587;

/// SMTP settings loaded from the environment
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender mailbox, e.g. `Auth Flow <no-reply@example.com>`
    pub from: String,
    /// Negotiate STARTTLS (disable only for local relays)
    pub starttls: bool,
}

impl SmtpConfig {
    /// Read `SMTP_*` and `MAIL_FROM` variables.
    ///
    /// Returns `None` when `SMTP_HOST` is unset, meaning mail should be logged
    /// instead of sent.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok().filter(|h| !h.is_empty())?;

        let port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SMTP_PORT);

        let starttls = std::env::var("SMTP_STARTTLS")
            .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "no"))
            .unwrap_or(true);

        let from = std::env::var("MAIL_FROM")
            .unwrap_or_else(|_| format!("Auth Flow <no-reply@{host}>"));

        Some(Self {
            host,
            port,
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            from,
            starttls,
        })
    }
}

/// Mailer that talks to an SMTP relay
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    templates: MailTemplates,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, templates: MailTemplates) -> Result<Self, MailError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| MailError::InvalidAddress(format!("{}: {}", config.from, e)))?;

        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| MailError::TransportError(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        builder = builder.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            templates,
        })
    }

    fn build_message(&self, to: &str, content: EmailContent) -> Result<Message, MailError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| MailError::InvalidAddress(format!("{}: {}", to, e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(content.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(content.body)
            .map_err(|e| MailError::BuildError(e.to_string()))
    }

    async fn send(&self, to: &str, content: EmailContent) -> Result<(), MailError> {
        let message = self.build_message(to, content)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::TransportError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification_email(
        &self,
        email: &str,
        token: &str,
        name: Option<&str>,
    ) -> Result<(), MailError> {
        self.send(email, self.templates.verification(token, name))
            .await
    }

    async fn send_reset_password_email(
        &self,
        email: &str,
        token: &str,
        name: Option<&str>,
    ) -> Result<(), MailError> {
        self.send(email, self.templates.reset_password(token, name))
            .await
    }
}
