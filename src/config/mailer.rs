//! Mailer configuration structures.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::TemplateId;
use crate::infra::ledger::LockOptions;

/// Ledger lock policy, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Backoff growth factor.
    pub factor: u32,
    /// First backoff delay.
    pub min_timeout_ms: u64,
    /// Backoff ceiling.
    pub max_timeout_ms: u64,
    /// Age after which a held lock counts as abandoned.
    pub stale_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        let options = LockOptions::default();
        Self {
            retries: options.retries,
            factor: options.factor,
            min_timeout_ms: millis(options.min_timeout),
            max_timeout_ms: millis(options.max_timeout),
            stale_ms: millis(options.stale),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl LockConfig {
    /// Validate lock policy values.
    pub fn validate(&self) -> Result<(), String> {
        if self.factor == 0 {
            return Err("lock.factor must be greater than 0".into());
        }
        if self.min_timeout_ms > self.max_timeout_ms {
            return Err("lock.min_timeout_ms must not exceed lock.max_timeout_ms".into());
        }
        if self.stale_ms == 0 {
            return Err("lock.stale_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Lock options for the ledger.
    pub const fn options(&self) -> LockOptions {
        LockOptions {
            retries: self.retries,
            factor: self.factor,
            min_timeout: Duration::from_millis(self.min_timeout_ms),
            max_timeout: Duration::from_millis(self.max_timeout_ms),
            stale: Duration::from_millis(self.stale_ms),
        }
    }
}

/// SMTP relay settings for live delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host.
    pub host: String,
    /// Relay port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Login user.
    #[serde(default)]
    pub username: Option<String>,
    /// Login password.
    #[serde(default)]
    pub password: Option<String>,
    /// Sender address.
    pub from_address: String,
    /// Sender display name.
    #[serde(default)]
    pub from_name: Option<String>,
}

const fn default_smtp_port() -> u16 {
    587
}

impl SmtpConfig {
    /// Validate SMTP settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("smtp.host must not be empty".into());
        }
        if self.port == 0 {
            return Err("smtp.port must be greater than 0".into());
        }
        if !self.from_address.contains('@') {
            return Err(format!("smtp.from_address `{}` is not an address", self.from_address));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err("smtp.username and smtp.password must be set together".into());
        }
        Ok(())
    }
}

/// Root mailer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    /// Directory holding the ledger, roster, and template stores.
    pub data_dir: PathBuf,
    /// Ledger file name inside `data_dir`.
    pub ledger_file: String,
    /// Roster file name inside `data_dir`.
    pub roster_file: String,
    /// Template store file name inside `data_dir`.
    pub templates_file: String,
    /// Base directory for relative template body paths.
    pub template_root: PathBuf,
    /// Directory receiving preview bodies.
    pub preview_dir: PathBuf,
    /// Write previews instead of sending.
    pub preview_mode: bool,
    /// Debounce window of both scheduler queues.
    pub batch_delay_ms: u64,
    /// Template sent to newly created roster records.
    pub welcome_template_id: TemplateId,
    /// Ledger lock policy.
    pub lock: LockConfig,
    /// SMTP relay, required for live delivery.
    pub smtp: Option<SmtpConfig>,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("local_db"),
            ledger_file: "sent_emails.json".into(),
            roster_file: "hof_member_data.json".into(),
            templates_file: "email_templates.json".into(),
            template_root: PathBuf::from("."),
            preview_dir: PathBuf::from("preview_mails"),
            preview_mode: true,
            batch_delay_ms: 200,
            welcome_template_id: 1,
            lock: LockConfig::default(),
            smtp: None,
        }
    }
}

impl MailerConfig {
    /// Validate all values.
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("ledger_file", &self.ledger_file),
            ("roster_file", &self.roster_file),
            ("templates_file", &self.templates_file),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} must not be empty"));
            }
        }
        if self.batch_delay_ms == 0 {
            return Err("batch_delay_ms must be greater than 0".into());
        }
        if self.welcome_template_id == 0 {
            return Err("welcome_template_id must be greater than 0".into());
        }
        self.lock.validate()?;
        if let Some(smtp) = &self.smtp {
            smtp.validate()?;
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Absent fields
    /// take their defaults.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `MAILER_*` and `SMTP_*` environment variables,
    /// after loading a `.env` file if one exists.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by variables resolved through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = lookup("MAILER_DATA_DIR") {
            cfg.data_dir = v.into();
        }
        if let Some(v) = lookup("MAILER_LEDGER_FILE") {
            cfg.ledger_file = v;
        }
        if let Some(v) = lookup("MAILER_ROSTER_FILE") {
            cfg.roster_file = v;
        }
        if let Some(v) = lookup("MAILER_TEMPLATES_FILE") {
            cfg.templates_file = v;
        }
        if let Some(v) = lookup("MAILER_TEMPLATE_ROOT") {
            cfg.template_root = v.into();
        }
        if let Some(v) = lookup("MAILER_PREVIEW_DIR") {
            cfg.preview_dir = v.into();
        }
        if let Some(v) = lookup("MAILER_PREVIEW_MODE") {
            cfg.preview_mode = parse_bool("MAILER_PREVIEW_MODE", &v)?;
        }
        if let Some(v) = lookup("MAILER_BATCH_DELAY_MS") {
            cfg.batch_delay_ms = parse("MAILER_BATCH_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("MAILER_WELCOME_TEMPLATE_ID") {
            cfg.welcome_template_id = parse("MAILER_WELCOME_TEMPLATE_ID", &v)?;
        }

        if let Some(host) = lookup("SMTP_HOST") {
            let from_address = lookup("SMTP_FROM_ADDRESS")
                .or_else(|| lookup("SMTP_USERNAME"))
                .ok_or("SMTP_FROM_ADDRESS is required when SMTP_HOST is set")?;
            cfg.smtp = Some(SmtpConfig {
                host,
                port: lookup("SMTP_PORT")
                    .map(|v| parse("SMTP_PORT", &v))
                    .transpose()?
                    .unwrap_or_else(default_smtp_port),
                username: lookup("SMTP_USERNAME"),
                password: lookup("SMTP_PASSWORD"),
                from_address,
                from_name: lookup("SMTP_FROM_NAME"),
            });
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Ledger file path.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(&self.ledger_file)
    }

    /// Roster file path.
    pub fn roster_path(&self) -> PathBuf {
        self.data_dir.join(&self.roster_file)
    }

    /// Template store file path.
    pub fn templates_path(&self) -> PathBuf {
        self.data_dir.join(&self.templates_file)
    }

    /// Scheduler debounce window.
    pub const fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| format!("{key}: invalid value `{raw}`: {e}"))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("{key}: invalid boolean `{raw}`")),
    }
}
