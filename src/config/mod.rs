//! Configuration models for storage paths, delivery, and scheduling.

pub mod mailer;

pub use mailer::{LockConfig, MailerConfig, SmtpConfig};
