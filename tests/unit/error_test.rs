//! Tests for error types

use std::path::PathBuf;

use roster_mailer::core::MailerError;

#[test]
fn test_lock_acquisition_error() {
    let err = MailerError::LockAcquisition {
        path: PathBuf::from("local_db/sent_emails.json"),
        attempts: 6,
    };
    assert_eq!(
        format!("{err}"),
        "lock acquisition failed for local_db/sent_emails.json after 6 attempts"
    );
}

#[test]
fn test_not_found_errors_mention_not_found() {
    assert_eq!(format!("{}", MailerError::MemberNotFound(7)), "member 7 not found");
    assert_eq!(format!("{}", MailerError::TemplateNotFound(2)), "template 2 not found");
}

#[test]
fn test_transport_error_is_raw_message() {
    let err = MailerError::Transport("quota exceeded".to_string());
    assert_eq!(format!("{err}"), "quota exceeded");
}

#[test]
fn test_config_error() {
    let err = MailerError::Config("missing smtp".to_string());
    assert_eq!(format!("{err}"), "configuration error: missing smtp");
}

#[test]
fn test_parse_error_from_serde() {
    let parse = serde_json::from_str::<Vec<u32>>("[1,").unwrap_err();
    let err: MailerError = parse.into();
    assert!(format!("{err}").starts_with("parse error:"));
}

#[test]
fn test_anyhow_conversion() {
    let err: anyhow::Error = MailerError::Render("bad tag".to_string()).into();
    assert_eq!(err.to_string(), "render error: bad tag");
}
