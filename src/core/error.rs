//! Error types for ledger, queue, and delivery operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::model::{MemberId, TemplateId};

/// Errors produced by mailer components.
#[derive(Debug, Error)]
pub enum MailerError {
    /// The advisory lock guarding a ledger file could not be obtained.
    #[error("lock acquisition failed for {path} after {attempts} attempts")]
    LockAcquisition {
        /// Ledger file the lock protects.
        path: PathBuf,
        /// Number of attempts made before giving up.
        attempts: u32,
    },
    /// Filesystem failure while reading or writing persisted state.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Persisted JSON could not be parsed or serialized.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Roster CSV could not be parsed.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// Referenced template does not exist in the template store.
    #[error("template {0} not found")]
    TemplateNotFound(TemplateId),
    /// Referenced roster record does not exist in the record store.
    #[error("member {0} not found")]
    MemberNotFound(MemberId),
    /// Template could not be rendered.
    #[error("render error: {0}")]
    Render(String),
    /// Mail transport rejected or failed a delivery. Displays the raw message.
    #[error("{0}")]
    Transport(String),
    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for library seams.
pub type MailerResult<T> = Result<T, MailerError>;

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
