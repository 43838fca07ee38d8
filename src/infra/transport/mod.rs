//! Mail transports.
//!
//! The processor only sees [`MailTransport`]; SMTP delivery lives behind the
//! `smtp` feature and [`MemoryTransport`] records messages for tests and
//! dry runs.

pub mod memory;
#[cfg(feature = "smtp")]
pub mod smtp;

use async_trait::async_trait;

use crate::core::MailerResult;

pub use memory::MemoryTransport;
#[cfg(feature = "smtp")]
pub use smtp::SmtpMailTransport;

/// A rendered message ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Sender, `Name <address>` or a bare address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Rendered subject line.
    pub subject: String,
    /// Rendered HTML body.
    pub html: String,
}

/// Acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Identifier assigned to the message.
    pub message_id: String,
}

/// Delivers rendered messages.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Dispatch one message.
    ///
    /// # Errors
    ///
    /// [`MailerError::Transport`](crate::core::MailerError::Transport)
    /// carrying the transport's own failure message.
    async fn send(&self, email: OutgoingEmail) -> MailerResult<SendReceipt>;
}
