//! The assembled mailer: roster import, enqueue, processing, and status.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::config::MailerConfig;
use crate::core::{
    BatchScheduler, EmailEnqueuer, EmailProcessor, EmailStatus, MailerResult, ProcessReport,
    Signal, SignalBus, Spawn, TemplateId,
};
use crate::infra::store::{
    read_csv_rows, JsonRecordStore, RecordFilter, RecordStore, SyncOutcome,
};

/// Entry counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    /// All entries.
    pub total: usize,
    /// Awaiting processing.
    pub pending: usize,
    /// Delivered.
    pub success: usize,
    /// Failed.
    pub failed: usize,
    /// Written to preview files.
    pub preview: usize,
}

/// The mail pipeline, wired and ready. Build one with
/// [`MailerBuilder`](crate::builders::MailerBuilder).
pub struct Mailer<S> {
    config: MailerConfig,
    roster: JsonRecordStore,
    records: Arc<dyn RecordStore>,
    bus: Arc<SignalBus>,
    enqueuer: Arc<EmailEnqueuer>,
    processor: Arc<EmailProcessor>,
    scheduler: BatchScheduler<S>,
}

impl<S> Mailer<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        config: MailerConfig,
        roster: JsonRecordStore,
        records: Arc<dyn RecordStore>,
        bus: Arc<SignalBus>,
        enqueuer: Arc<EmailEnqueuer>,
        processor: Arc<EmailProcessor>,
        scheduler: BatchScheduler<S>,
    ) -> Self {
        Self {
            config,
            roster,
            records,
            bus,
            enqueuer,
            processor,
            scheduler,
        }
    }

    /// Configuration in effect.
    pub const fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// Signal bus the scheduler listens on.
    pub fn bus(&self) -> &Arc<SignalBus> {
        &self.bus
    }

    /// The batch scheduler.
    pub const fn scheduler(&self) -> &BatchScheduler<S> {
        &self.scheduler
    }

    /// Create the ledger file if it is missing.
    ///
    /// # Errors
    ///
    /// Lock or filesystem failure.
    pub async fn ensure_ledger(&self) -> MailerResult<()> {
        self.enqueuer.ledger().ensure_exists().await
    }

    /// Merge fetched roster rows and announce every new record, which
    /// schedules its welcome email.
    ///
    /// # Errors
    ///
    /// Roster read or write failure; nothing is announced then.
    pub fn import_roster<I>(&self, rows: I) -> MailerResult<SyncOutcome>
    where
        I: IntoIterator<Item = Map<String, Value>>,
    {
        let outcome = self.roster.upsert_rows(rows)?;
        for record in &outcome.created {
            self.bus.publish(&Signal::RecordCreated(record.clone()));
        }
        Ok(outcome)
    }

    /// Import a roster export: CSV when the extension is `.csv`, otherwise a
    /// JSON array of row objects.
    ///
    /// # Errors
    ///
    /// Unreadable or malformed file, or a roster write failure.
    pub fn import_roster_file(&self, path: &Path) -> MailerResult<SyncOutcome> {
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        let rows: Vec<Map<String, Value>> = if is_csv {
            read_csv_rows(File::open(path)?)?
        } else {
            serde_json::from_str(&fs::read_to_string(path)?)?
        };
        info!(path = %path.display(), rows = rows.len(), csv = is_csv, "importing roster file");
        self.import_roster(rows)
    }

    /// Queue `template_id` for every roster record matching `filter`.
    ///
    /// Publishes [`Signal::EmailsEnqueued`] when something was queued, so a
    /// processing pass follows through the scheduler.
    ///
    /// # Errors
    ///
    /// [`MailerError::TemplateNotFound`](crate::core::MailerError::TemplateNotFound).
    pub async fn enqueue(&self, filter: &RecordFilter, template_id: TemplateId) -> MailerResult<usize> {
        let records = self.records.find_all(filter);
        info!(matched = records.len(), template_id, "enqueueing for filtered roster");
        self.enqueuer.enqueue(&records, template_id).await
    }

    /// Run one processing pass immediately.
    ///
    /// # Errors
    ///
    /// Ledger write failure.
    pub async fn process_pending(&self) -> MailerResult<ProcessReport> {
        self.processor.process_pending().await
    }

    /// Wait until every scheduled batch has run.
    pub async fn drain(&self) {
        self.scheduler.wait_idle().await;
    }

    /// Count ledger entries per status.
    ///
    /// # Errors
    ///
    /// Lock, filesystem, or parse failure reading the ledger.
    pub async fn ledger_summary(&self) -> MailerResult<LedgerSummary> {
        let entries = self.enqueuer.ledger().read().await?;
        let mut summary = LedgerSummary {
            total: entries.len(),
            ..LedgerSummary::default()
        };
        for entry in &entries {
            match entry.status {
                EmailStatus::Pending => summary.pending += 1,
                EmailStatus::Success => summary.success += 1,
                EmailStatus::Failed => summary.failed += 1,
                EmailStatus::Preview => summary.preview += 1,
            }
        }
        Ok(summary)
    }
}

impl<S> std::fmt::Debug for Mailer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("config", &self.config)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}
