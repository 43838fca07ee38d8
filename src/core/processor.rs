//! Email queue processor: resolves, renders, and dispatches `pending`
//! ledger entries.
//!
//! ```text
//! pending --(resolve, render, send ok)----> success
//! pending --(dispatch fails)--------------> failed
//! pending --(member or template missing)--> failed
//! pending --(preview mode)----------------> preview
//! ```
//!
//! Every transition is terminal; entries in any other status are never
//! touched. Rendering never fails an entry: a broken subject or body renders
//! as empty text, the renderer logs the cause, and dispatch goes ahead.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::core::{
    EmailStatus, EmailTemplate, LedgerEntry, MailerError, MailerResult, MemberId, RosterRecord,
    TemplateId,
};
use crate::infra::ledger::LockedLedger;
use crate::infra::render::TemplateRenderer;
use crate::infra::store::{RecordStore, TemplateStore};
use crate::infra::transport::{MailTransport, OutgoingEmail};
use crate::util::{now_ms, now_rfc3339};

/// Where rendered messages go, fixed for the lifetime of a processor.
#[derive(Clone)]
pub enum DeliveryMode {
    /// Write each body to an HTML file under this directory.
    Preview(PathBuf),
    /// Dispatch through a mail transport.
    Live(Arc<dyn MailTransport>),
}

impl DeliveryMode {
    /// Whether messages are written to files instead of sent.
    pub const fn is_preview(&self) -> bool {
        matches!(self, Self::Preview(_))
    }
}

impl std::fmt::Debug for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preview(dir) => f.debug_tuple("Preview").field(dir).finish(),
            Self::Live(_) => f.write_str("Live"),
        }
    }
}

/// The `From` identity of outgoing mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    /// Sender address.
    pub address: String,
    /// Optional display name.
    pub name: Option<String>,
}

impl SenderIdentity {
    /// Identity with a bare address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// `Name <address>`, or the bare address without a name.
    pub fn header(&self) -> String {
        match self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => format!("{name} <{}>", self.address),
            None => self.address.clone(),
        }
    }
}

impl Default for SenderIdentity {
    fn default() -> Self {
        Self::new("no-reply@localhost")
    }
}

/// Outcome of one processing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Pending entries examined.
    pub scanned: usize,
    /// Entries delivered by the transport.
    pub sent: usize,
    /// Entries written to preview files.
    pub previewed: usize,
    /// Entries that failed.
    pub failed: usize,
    /// Whether the ledger was rewritten.
    pub written: bool,
}

impl ProcessReport {
    /// Entries that changed status.
    pub const fn changed(&self) -> usize {
        self.sent + self.previewed + self.failed
    }
}

enum Dispatched {
    Sent(String),
    Previewed(String),
}

/// Drives `pending` ledger entries to a terminal status.
pub struct EmailProcessor {
    ledger: LockedLedger<LedgerEntry>,
    records: Arc<dyn RecordStore>,
    templates: Arc<dyn TemplateStore>,
    renderer: TemplateRenderer,
    template_root: PathBuf,
    mode: DeliveryMode,
    sender: SenderIdentity,
}

impl EmailProcessor {
    /// Create a processor. Relative template paths resolve against
    /// `template_root`.
    pub fn new(
        ledger: LockedLedger<LedgerEntry>,
        records: Arc<dyn RecordStore>,
        templates: Arc<dyn TemplateStore>,
        template_root: impl Into<PathBuf>,
        mode: DeliveryMode,
    ) -> Self {
        Self {
            ledger,
            records,
            templates,
            renderer: TemplateRenderer::new(),
            template_root: template_root.into(),
            mode,
            sender: SenderIdentity::default(),
        }
    }

    /// Set the sender used in live mode.
    #[must_use]
    pub fn with_sender(mut self, sender: SenderIdentity) -> Self {
        self.sender = sender;
        self
    }

    /// Delivery mode in effect.
    pub const fn mode(&self) -> &DeliveryMode {
        &self.mode
    }

    /// The ledger this processor rewrites.
    pub const fn ledger(&self) -> &LockedLedger<LedgerEntry> {
        &self.ledger
    }

    /// Process every `pending` entry currently in the ledger.
    ///
    /// Per-entry failures are recorded on the entry. The roster is read once
    /// per pass. Changed entries are merged back in a single call, and a pass
    /// that changed nothing does not touch the ledger. A ledger read failure
    /// is logged and treated as an empty ledger.
    ///
    /// # Errors
    ///
    /// Only the final ledger merge; the file is then left as it was.
    pub async fn process_pending(&self) -> MailerResult<ProcessReport> {
        let entries = match self.ledger.read().await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "failed to read ledger, nothing processed");
                return Ok(ProcessReport::default());
            }
        };

        let mut report = ProcessReport::default();
        let pending: Vec<LedgerEntry> = entries.into_iter().filter(LedgerEntry::is_pending).collect();
        if pending.is_empty() {
            debug!("no pending emails");
            return Ok(report);
        }

        let roster: HashMap<MemberId, RosterRecord> = self
            .records
            .all()
            .into_iter()
            .filter_map(|r| r.member_id().map(|id| (id, r)))
            .collect();
        let mut templates: HashMap<TemplateId, Option<EmailTemplate>> = HashMap::new();

        let mut changed = Vec::with_capacity(pending.len());
        for mut entry in pending {
            report.scanned += 1;
            let template = templates
                .entry(entry.template_id)
                .or_insert_with(|| self.templates.find_by_id(entry.template_id))
                .clone();
            let member = roster.get(&entry.member_id);
            self.process_entry(&mut entry, member, template.as_ref()).await;
            match entry.status {
                EmailStatus::Success => report.sent += 1,
                EmailStatus::Preview => report.previewed += 1,
                EmailStatus::Failed => report.failed += 1,
                EmailStatus::Pending => continue,
            }
            changed.push(entry);
        }

        if !changed.is_empty() {
            self.ledger.merge(&changed).await?;
            report.written = true;
        }
        info!(
            scanned = report.scanned,
            sent = report.sent,
            previewed = report.previewed,
            failed = report.failed,
            "processing pass complete"
        );
        Ok(report)
    }

    async fn process_entry(
        &self,
        entry: &mut LedgerEntry,
        member: Option<&RosterRecord>,
        template: Option<&EmailTemplate>,
    ) {
        let now = now_rfc3339();
        let Some(member) = member else {
            let e = MailerError::MemberNotFound(entry.member_id);
            warn!(entry_id = %entry.id, error = %e, "cannot resolve recipient");
            entry.mark_failed(e.to_string(), &now);
            return;
        };
        let Some(template) = template else {
            let e = MailerError::TemplateNotFound(entry.template_id);
            warn!(entry_id = %entry.id, error = %e, "cannot resolve template");
            entry.mark_failed(e.to_string(), &now);
            return;
        };

        match self.dispatch(entry, member, template).await {
            Ok((subject, Dispatched::Sent(message_id))) => {
                info!(entry_id = %entry.id, message_id = %message_id, "email sent");
                entry.mark_sent(subject, message_id, &now_rfc3339());
            }
            Ok((subject, Dispatched::Previewed(path))) => {
                info!(entry_id = %entry.id, path = %path, "email previewed");
                entry.mark_previewed(subject, path, &now_rfc3339());
            }
            Err(e) => {
                error!(entry_id = %entry.id, error = %e, "email dispatch failed");
                entry.subject = Some(template.subject.clone());
                entry.mark_failed(e.to_string(), &now_rfc3339());
            }
        }
    }

    async fn dispatch(
        &self,
        entry: &LedgerEntry,
        member: &RosterRecord,
        template: &EmailTemplate,
    ) -> MailerResult<(String, Dispatched)> {
        let context = merged_context(member, template, entry);
        let subject = match entry.subject.as_deref().filter(|s| !s.is_empty()) {
            Some(subject) => subject.to_string(),
            None => self.renderer.render_string(&template.subject, &context),
        };
        let body = self
            .renderer
            .render_file(&self.resolve(&template.template_path), &context);

        match &self.mode {
            DeliveryMode::Preview(dir) => {
                let path = write_preview(dir, member, &body)?;
                Ok((subject, Dispatched::Previewed(path.display().to_string())))
            }
            DeliveryMode::Live(transport) => {
                let to = member.email().ok_or_else(|| {
                    MailerError::Transport(format!(
                        "member {} has no email address",
                        entry.member_id
                    ))
                })?;
                let receipt = transport
                    .send(OutgoingEmail {
                        from: self.sender.header(),
                        to: to.to_string(),
                        subject: subject.clone(),
                        html: body,
                    })
                    .await?;
                Ok((subject, Dispatched::Sent(receipt.message_id)))
            }
        }
    }

    fn resolve(&self, template_path: &Path) -> PathBuf {
        if template_path.is_absolute() {
            template_path.to_path_buf()
        } else {
            self.template_root.join(template_path)
        }
    }
}

impl std::fmt::Debug for EmailProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailProcessor")
            .field("ledger", &self.ledger.path())
            .field("template_root", &self.template_root)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Member fields, overlaid by template fields, overlaid by entry fields.
fn merged_context(
    member: &RosterRecord,
    template: &EmailTemplate,
    entry: &LedgerEntry,
) -> Map<String, Value> {
    let mut context = member.context();
    context.extend(template.context());
    context.extend(entry.context());
    context
}

/// Write `body` to `{first}_{last}_{millis}.html` under `dir`, never
/// overwriting an earlier preview.
fn write_preview(dir: &Path, member: &RosterRecord, body: &str) -> MailerResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let stem = format!(
        "{}_{}_{}",
        file_safe(member.first_name.as_deref().unwrap_or_default()),
        file_safe(member.last_name.as_deref().unwrap_or_default()),
        now_ms()
    );
    let mut path = dir.join(format!("{stem}.html"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{stem}-{n}.html"));
        n += 1;
    }
    fs::write(&path, body)?;
    Ok(path)
}

fn file_safe(part: &str) -> String {
    part.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
