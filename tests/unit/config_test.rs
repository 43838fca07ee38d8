//! Tests for configuration validation

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use roster_mailer::config::{LockConfig, MailerConfig, SmtpConfig};

fn smtp() -> SmtpConfig {
    SmtpConfig {
        host: "smtp.example.com".to_string(),
        port: 587,
        username: Some("mailer".to_string()),
        password: Some("secret".to_string()),
        from_address: "hall@example.com".to_string(),
        from_name: Some("Hall of Fame".to_string()),
    }
}

#[test]
fn test_defaults_match_storage_layout() {
    let cfg = MailerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.ledger_path(), PathBuf::from("local_db/sent_emails.json"));
    assert_eq!(cfg.roster_path(), PathBuf::from("local_db/hof_member_data.json"));
    assert_eq!(cfg.templates_path(), PathBuf::from("local_db/email_templates.json"));
    assert!(cfg.preview_mode);
    assert_eq!(cfg.batch_delay(), Duration::from_millis(200));
    assert_eq!(cfg.welcome_template_id, 1);
}

#[test]
fn test_lock_defaults() {
    let options = LockConfig::default().options();
    assert_eq!(options.retries, 5);
    assert_eq!(options.factor, 2);
    assert_eq!(options.min_timeout, Duration::from_millis(100));
    assert_eq!(options.max_timeout, Duration::from_millis(2000));
    assert_eq!(options.stale, Duration::from_millis(5000));
}

#[test]
fn test_invalid_batch_delay() {
    let cfg = MailerConfig {
        batch_delay_ms: 0,
        ..MailerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_lock_bounds() {
    let cfg = MailerConfig {
        lock: LockConfig {
            min_timeout_ms: 5000,
            max_timeout_ms: 100,
            ..LockConfig::default()
        },
        ..MailerConfig::default()
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("min_timeout_ms"));
}

#[test]
fn test_smtp_validation() {
    assert!(smtp().validate().is_ok());
    let bad = SmtpConfig {
        from_address: "nobody".to_string(),
        ..smtp()
    };
    assert!(bad.validate().is_err());
    let half_auth = SmtpConfig {
        password: None,
        ..smtp()
    };
    assert!(half_auth.validate().is_err());
}

#[test]
fn test_from_json_str_fills_defaults() {
    let cfg = MailerConfig::from_json_str(
        r#"{"data_dir": "/var/mailer", "preview_mode": false,
            "smtp": {"host": "smtp.example.com", "from_address": "hall@example.com"}}"#,
    )
    .unwrap();
    assert_eq!(cfg.ledger_path(), PathBuf::from("/var/mailer/sent_emails.json"));
    assert!(!cfg.preview_mode);
    assert_eq!(cfg.batch_delay_ms, 200);
    let smtp = cfg.smtp.unwrap();
    assert_eq!(smtp.port, 587);
    assert!(smtp.username.is_none());
}

#[test]
fn test_from_json_str_rejects_invalid() {
    assert!(MailerConfig::from_json_str("not json").unwrap_err().starts_with("parse error"));
    assert!(MailerConfig::from_json_str(r#"{"welcome_template_id": 0}"#).is_err());
}

#[test]
fn test_from_lookup_reads_variables() {
    let vars: HashMap<&str, &str> = [
        ("MAILER_DATA_DIR", "db"),
        ("MAILER_PREVIEW_MODE", "no"),
        ("MAILER_BATCH_DELAY_MS", "50"),
        ("SMTP_HOST", "smtp.example.com"),
        ("SMTP_PORT", "2525"),
        ("SMTP_USERNAME", "hall@example.com"),
        ("SMTP_PASSWORD", "pw"),
    ]
    .into_iter()
    .collect();
    let cfg = MailerConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
    assert_eq!(cfg.data_dir, PathBuf::from("db"));
    assert!(!cfg.preview_mode);
    assert_eq!(cfg.batch_delay_ms, 50);
    let smtp = cfg.smtp.unwrap();
    assert_eq!(smtp.port, 2525);
    assert_eq!(smtp.from_address, "hall@example.com");
}

#[test]
fn test_from_lookup_rejects_bad_numbers() {
    let err = MailerConfig::from_lookup(|k| (k == "MAILER_BATCH_DELAY_MS").then(|| "soon".to_string()))
        .unwrap_err();
    assert!(err.contains("MAILER_BATCH_DELAY_MS"));
}
