//! Tests for the runtime facade and builder wiring

use std::path::Path;
use std::sync::Arc;

use roster_mailer::builders::MailerBuilder;
use roster_mailer::config::MailerConfig;
use roster_mailer::core::{MailerError, SignalKind};
use roster_mailer::infra::store::{JsonRecordStore, RecordStore};
use roster_mailer::infra::transport::MemoryTransport;
use roster_mailer::runtime::{LedgerSummary, TokioSpawner};
use serde_json::{json, Map, Value};

fn config(root: &Path) -> MailerConfig {
    MailerConfig {
        data_dir: root.join("db"),
        preview_dir: root.join("previews"),
        template_root: root.to_path_buf(),
        batch_delay_ms: 10,
        ..MailerConfig::default()
    }
}

fn row(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_live_mode_without_transport_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = MailerConfig {
        preview_mode: false,
        ..config(dir.path())
    };
    let err = MailerBuilder::new(cfg).build(TokioSpawner::current()).unwrap_err();
    assert!(matches!(err, MailerError::Config(_)));
}

#[tokio::test]
async fn test_live_mode_with_injected_transport() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = MailerConfig {
        preview_mode: false,
        ..config(dir.path())
    };
    let mailer = MailerBuilder::new(cfg)
        .with_transport(Arc::new(MemoryTransport::new()))
        .build(TokioSpawner::current())
        .unwrap();
    assert!(!mailer.config().preview_mode);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = MailerConfig {
        batch_delay_ms: 0,
        ..config(dir.path())
    };
    assert!(MailerBuilder::new(cfg).build(TokioSpawner::current()).is_err());
}

#[tokio::test]
async fn test_builder_attaches_scheduler_to_bus() {
    let dir = tempfile::tempdir().unwrap();
    let mailer = MailerBuilder::new(config(dir.path()))
        .build(TokioSpawner::current())
        .unwrap();
    assert_eq!(mailer.bus().listener_count(SignalKind::RecordCreated), 1);
    assert_eq!(mailer.bus().listener_count(SignalKind::EmailsEnqueued), 1);
}

#[tokio::test]
async fn test_ensure_ledger_and_empty_summary() {
    let dir = tempfile::tempdir().unwrap();
    let mailer = MailerBuilder::new(config(dir.path()))
        .build(TokioSpawner::current())
        .unwrap();
    mailer.ensure_ledger().await.unwrap();
    assert!(dir.path().join("db/sent_emails.json").exists());
    assert_eq!(mailer.ledger_summary().await.unwrap(), LedgerSummary::default());
}

#[tokio::test]
async fn test_import_without_template_store_queues_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mailer = MailerBuilder::new(config(dir.path()))
        .build(TokioSpawner::current())
        .unwrap();
    let outcome = mailer
        .import_roster(vec![row(json!({"First Name": "Ada", "Last Name": "Lovelace", "Email Address": "ada@x.com"}))])
        .unwrap();
    assert_eq!(outcome.created.len(), 1);
    mailer.drain().await;

    let stats = mailer.scheduler().stats();
    assert_eq!(stats.enqueue.batches_run, 1);
    assert_eq!(stats.process.batches_run, 0);
    assert_eq!(mailer.ledger_summary().await.unwrap().total, 0);
}

#[tokio::test]
async fn test_import_roster_csv_export() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("roster.csv");
    std::fs::write(
        &csv_path,
        "\"First Name\",\"Last Name\",\"Email Address\",\"Are you a worker?\"\n\
         \"Ada\",\"Lovelace\",\"ada@x.com\",\"Yes\"\n\
         \"Grace\",\"Hopper\",\"grace@x.com\",\"No\"\n",
    )
    .unwrap();
    let mailer = MailerBuilder::new(config(dir.path()))
        .build(TokioSpawner::current())
        .unwrap();

    let first = mailer.import_roster_file(&csv_path).unwrap();
    assert_eq!(first.created.len(), 2);
    assert_eq!(first.total, 2);

    let again = mailer.import_roster_file(&csv_path).unwrap();
    assert!(again.created.is_empty());
    assert_eq!(again.unchanged, 2);
    mailer.drain().await;

    let records = JsonRecordStore::new(mailer.config().roster_path()).all();
    let ada = records
        .iter()
        .find(|r| r.first_name.as_deref() == Some("Ada"))
        .unwrap();
    assert_eq!(ada.email(), Some("ada@x.com"));
    assert_eq!(ada.attributes["are_you_a_worker"], "Yes");
}

#[tokio::test]
async fn test_import_roster_file_rejects_malformed_json() {
    let dir = tempfile::tempdir().unwrap();
    let rows_path = dir.path().join("rows.json");
    std::fs::write(&rows_path, "{\"not\": \"an array\"}").unwrap();
    let mailer = MailerBuilder::new(config(dir.path()))
        .build(TokioSpawner::current())
        .unwrap();
    let err = mailer.import_roster_file(&rows_path).unwrap_err();
    assert!(matches!(err, MailerError::Parse(_)));
}
