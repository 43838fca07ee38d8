//! Recording transport for tests and dry runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::core::{MailerError, MailerResult};
use crate::infra::transport::{MailTransport, OutgoingEmail, SendReceipt};

/// Transport that keeps every message in memory instead of sending it.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<OutgoingEmail>>,
    failure: Mutex<Option<String>>,
}

impl MemoryTransport {
    /// Create a transport that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that rejects every message with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let transport = Self::default();
        transport.fail_with(Some(message.into()));
        transport
    }

    /// Set or clear the failure returned by subsequent sends.
    pub fn fail_with(&self, message: Option<String>) {
        *self.failure.lock() = message;
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().clone()
    }

    /// Number of messages accepted so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    async fn send(&self, email: OutgoingEmail) -> MailerResult<SendReceipt> {
        if let Some(message) = self.failure.lock().clone() {
            return Err(MailerError::Transport(message));
        }
        let message_id = format!("<{}@roster-mailer.local>", Uuid::new_v4());
        info!(to = %email.to, message_id = %message_id, "recorded outgoing email");
        self.sent.lock().push(email);
        Ok(SendReceipt { message_id })
    }
}
