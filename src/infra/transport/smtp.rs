//! SMTP delivery through `lettre`.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::core::{MailerError, MailerResult};
use crate::infra::transport::{MailTransport, OutgoingEmail, SendReceipt};

/// STARTTLS SMTP relay transport.
#[derive(Clone)]
pub struct SmtpMailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl SmtpMailTransport {
    /// Build a relay transport from configuration.
    ///
    /// # Errors
    ///
    /// [`MailerError::Config`] if the relay host is rejected.
    pub fn from_config(config: &SmtpConfig) -> MailerResult<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| MailerError::Config(format!("smtp relay {}: {e}", config.host)))?
            .port(config.port);
        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        Ok(Self {
            mailer: builder.build(),
            host: config.host.clone(),
        })
    }
}

impl std::fmt::Debug for SmtpMailTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailTransport")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

fn mailbox(raw: &str, role: &str) -> MailerResult<Mailbox> {
    raw.parse()
        .map_err(|e| MailerError::Transport(format!("invalid {role} address {raw}: {e}")))
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, email: OutgoingEmail) -> MailerResult<SendReceipt> {
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.host);
        let message = Message::builder()
            .from(mailbox(&email.from, "from")?)
            .to(mailbox(&email.to, "to")?)
            .subject(email.subject)
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .map_err(|e| MailerError::Transport(e.to_string()))?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| MailerError::Transport(e.to_string()))?;

        info!(to = %email.to, message_id = %message_id, "email sent");
        Ok(SendReceipt { message_id })
    }
}
