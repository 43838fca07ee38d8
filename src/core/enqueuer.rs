//! Email queue enqueuer: roster records plus a template become `pending`
//! ledger entries.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::core::{
    LedgerEntry, MailerError, MailerResult, MemberId, RosterRecord, Signal, SignalBus, TemplateId,
};
use crate::infra::ledger::LockedLedger;
use crate::infra::render::TemplateRenderer;
use crate::infra::store::TemplateStore;
use crate::util::{now_ms, now_rfc3339};

/// Appends `pending` entries to the ledger, at most one per
/// `(member_id, template_id)` pair for the lifetime of the ledger.
pub struct EmailEnqueuer {
    ledger: LockedLedger<LedgerEntry>,
    templates: Arc<dyn TemplateStore>,
    renderer: TemplateRenderer,
    signals: Option<Arc<SignalBus>>,
}

impl EmailEnqueuer {
    /// Create an enqueuer writing to `ledger`.
    pub fn new(ledger: LockedLedger<LedgerEntry>, templates: Arc<dyn TemplateStore>) -> Self {
        Self {
            ledger,
            templates,
            renderer: TemplateRenderer::new(),
            signals: None,
        }
    }

    /// Publish [`Signal::EmailsEnqueued`] on `bus` after every pass that
    /// queued something.
    #[must_use]
    pub fn with_signals(mut self, bus: Arc<SignalBus>) -> Self {
        self.signals = Some(bus);
        self
    }

    /// The ledger this enqueuer writes to.
    pub const fn ledger(&self) -> &LockedLedger<LedgerEntry> {
        &self.ledger
    }

    /// Queue `template_id` for every eligible record and return how many
    /// entries were appended.
    ///
    /// Records without an identifier or email address are skipped, as are
    /// records that already have an entry for this template in any status.
    /// The whole pass is one ledger read and at most one merge. A ledger
    /// failure or a malformed subject pattern aborts the pass without
    /// writing anything and yields `0`.
    ///
    /// # Errors
    ///
    /// [`MailerError::TemplateNotFound`] if the template does not exist; the
    /// ledger is not touched.
    pub async fn enqueue(
        &self,
        records: &[RosterRecord],
        template_id: TemplateId,
    ) -> MailerResult<usize> {
        let template = self
            .templates
            .find_by_id(template_id)
            .ok_or(MailerError::TemplateNotFound(template_id))?;

        let existing = match self.ledger.read().await {
            Ok(entries) => entries,
            Err(e) => {
                error!(template_id, error = %e, "failed to read ledger, enqueue aborted");
                return Ok(0);
            }
        };
        let mut handled: HashSet<(MemberId, TemplateId)> = existing
            .iter()
            .map(|entry| (entry.member_id, entry.template_id))
            .collect();

        let created_ms = now_ms();
        let now = now_rfc3339();
        let mut queued = Vec::new();
        for record in records {
            let (Some(member_id), Some(email)) = (record.member_id(), record.email()) else {
                warn!(
                    member_id = ?record.id,
                    name = %record.display_name(),
                    "skipping record without id or email address"
                );
                continue;
            };
            if !handled.insert((member_id, template_id)) {
                info!(member_id, template_id, "email already queued, skipping");
                continue;
            }

            let subject = match self
                .renderer
                .try_render_string(&template.subject, &record.context())
            {
                Ok(subject) => subject,
                Err(e) => {
                    error!(member_id, template_id, error = %e, "subject render failed, enqueue aborted");
                    return Ok(0);
                }
            };
            queued.push(LedgerEntry::pending(
                member_id,
                Some(email.to_string()),
                template_id,
                subject,
                created_ms,
                &now,
            ));
        }

        if queued.is_empty() {
            info!(template_id, "no new emails to queue");
            return Ok(0);
        }
        if let Err(e) = self.ledger.merge(&queued).await {
            error!(template_id, error = %e, "failed to write ledger, enqueue aborted");
            return Ok(0);
        }

        let count = queued.len();
        info!(template_id, count, "emails queued");
        if let Some(bus) = &self.signals {
            bus.publish(&Signal::EmailsEnqueued(count));
        }
        Ok(count)
    }
}

impl std::fmt::Debug for EmailEnqueuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailEnqueuer")
            .field("ledger", &self.ledger.path())
            .field("signals", &self.signals.is_some())
            .finish_non_exhaustive()
    }
}
