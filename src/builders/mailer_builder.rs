//! Builds a [`Mailer`] from [`MailerConfig`] using pluggable stores and transport.

use std::sync::Arc;

use tracing::info;

use crate::config::MailerConfig;
use crate::core::{
    BatchScheduler, DeliveryMode, EmailEnqueuer, EmailProcessor, LedgerEntry, MailerError,
    MailerResult, SenderIdentity, SignalBus, Spawn,
};
use crate::infra::ledger::LockedLedger;
use crate::infra::store::{JsonRecordStore, JsonTemplateStore, RecordStore, TemplateStore};
use crate::infra::transport::MailTransport;
use crate::runtime::Mailer;

/// Assembles stores, ledger, enqueuer, processor, and scheduler.
///
/// Stores default to the JSON files named by the configuration. In live mode
/// the transport defaults to SMTP built from `config.smtp`.
pub struct MailerBuilder {
    config: MailerConfig,
    records: Option<Arc<dyn RecordStore>>,
    templates: Option<Arc<dyn TemplateStore>>,
    transport: Option<Arc<dyn MailTransport>>,
}

impl MailerBuilder {
    /// Start from `config`.
    pub fn new(config: MailerConfig) -> Self {
        Self {
            config,
            records: None,
            templates: None,
            transport: None,
        }
    }

    /// Use `store` instead of the roster file for lookups.
    #[must_use]
    pub fn with_record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.records = Some(store);
        self
    }

    /// Use `store` instead of the template file.
    #[must_use]
    pub fn with_template_store(mut self, store: Arc<dyn TemplateStore>) -> Self {
        self.templates = Some(store);
        self
    }

    /// Deliver through `transport` in live mode.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate the configuration and wire the pipeline onto `spawner`.
    ///
    /// # Errors
    ///
    /// [`MailerError::Config`] for invalid configuration, or for live mode
    /// with neither an injected transport nor SMTP settings.
    pub fn build<S>(self, spawner: S) -> MailerResult<Mailer<S>>
    where
        S: Spawn + Clone + Send + Sync + 'static,
    {
        let config = self.config;
        config
            .validate()
            .map_err(|e| MailerError::Config(format!("config invalid: {e}")))?;

        let roster = JsonRecordStore::new(config.roster_path());
        let records = self
            .records
            .unwrap_or_else(|| Arc::new(roster.clone()) as Arc<dyn RecordStore>);
        let templates = self.templates.unwrap_or_else(|| {
            Arc::new(JsonTemplateStore::new(config.templates_path())) as Arc<dyn TemplateStore>
        });

        let mode = if config.preview_mode {
            DeliveryMode::Preview(config.preview_dir.clone())
        } else {
            DeliveryMode::Live(live_transport(self.transport, &config)?)
        };
        let sender = config.smtp.as_ref().map_or_else(SenderIdentity::default, |smtp| {
            let sender = SenderIdentity::new(&smtp.from_address);
            match &smtp.from_name {
                Some(name) => sender.with_name(name),
                None => sender,
            }
        });

        let ledger = LockedLedger::<LedgerEntry>::new(config.ledger_path(), config.lock.options());
        let bus = Arc::new(SignalBus::new());
        let enqueuer = Arc::new(
            EmailEnqueuer::new(ledger.clone(), Arc::clone(&templates)).with_signals(Arc::clone(&bus)),
        );
        let processor = Arc::new(
            EmailProcessor::new(
                ledger,
                Arc::clone(&records),
                templates,
                &config.template_root,
                mode,
            )
                .with_sender(sender),
        );
        let scheduler = BatchScheduler::new(
            Arc::clone(&enqueuer),
            Arc::clone(&processor),
            config.welcome_template_id,
            config.batch_delay(),
            spawner,
        );
        scheduler.attach(&bus);

        info!(
            ledger = %config.ledger_path().display(),
            preview = config.preview_mode,
            "mailer assembled"
        );
        Ok(Mailer::new(
            config, roster, records, bus, enqueuer, processor, scheduler,
        ))
    }
}

fn live_transport(
    injected: Option<Arc<dyn MailTransport>>,
    config: &MailerConfig,
) -> MailerResult<Arc<dyn MailTransport>> {
    if let Some(transport) = injected {
        return Ok(transport);
    }
    let Some(smtp) = &config.smtp else {
        return Err(MailerError::Config(
            "live mode requires smtp settings or an injected transport".into(),
        ));
    };
    smtp_transport(smtp)
}

#[cfg(feature = "smtp")]
fn smtp_transport(smtp: &crate::config::SmtpConfig) -> MailerResult<Arc<dyn MailTransport>> {
    Ok(Arc::new(crate::infra::transport::SmtpMailTransport::from_config(smtp)?))
}

#[cfg(not(feature = "smtp"))]
fn smtp_transport(_smtp: &crate::config::SmtpConfig) -> MailerResult<Arc<dyn MailTransport>> {
    Err(MailerError::Config(
        "live mode over smtp requires the `smtp` feature".into(),
    ))
}

impl std::fmt::Debug for MailerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailerBuilder")
            .field("config", &self.config)
            .field("records", &self.records.is_some())
            .field("templates", &self.templates.is_some())
            .field("transport", &self.transport.is_some())
            .finish()
    }
}
