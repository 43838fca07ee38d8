//! Roster records, email templates, and ledger entries.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable roster record identifier, assigned on first sight.
pub type MemberId = u64;
/// Template identifier in the template store.
pub type TemplateId = u64;
/// Ledger entry identifier; the merge key for all ledger rewrites.
pub type EntryId = String;

/// A member of the synchronized roster.
///
/// Only the fields the mail pipeline relies on are typed; everything else the
/// roster carries (role flags, service units, dates) lives in `attributes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterRecord {
    /// Identifier, absent on malformed rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MemberId>,
    /// Recipient address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Every other attribute of the record.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl RosterRecord {
    /// Create a record with an identifier and nothing else.
    pub fn new(id: MemberId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Set the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email_address = Some(email.into());
        self
    }

    /// Set first and last name.
    #[must_use]
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// Set an arbitrary attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Identifier, treating `0` as unassigned.
    pub fn member_id(&self) -> Option<MemberId> {
        self.id.filter(|id| *id != 0)
    }

    /// Non-empty email address.
    pub fn email(&self) -> Option<&str> {
        self.email_address
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// `first last`, trimmed, for logs and preview file names.
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or_default();
        let last = self.last_name.as_deref().unwrap_or_default();
        format!("{first} {last}").trim().to_string()
    }

    /// The record flattened into a JSON object, for rendering and filtering.
    pub fn context(&self) -> Map<String, Value> {
        let mut ctx = self.attributes.clone();
        if let Some(id) = self.id {
            ctx.insert("id".into(), Value::from(id));
        }
        for (key, value) in [
            ("email_address", &self.email_address),
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
        ] {
            if let Some(v) = value {
                ctx.insert(key.into(), Value::String(v.clone()));
            }
        }
        ctx
    }
}

/// A stored email template: subject pattern plus body file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTemplate {
    /// Template identifier.
    pub id: TemplateId,
    /// Subject pattern rendered against the recipient.
    pub subject: String,
    /// Body template file, relative to the configured template root.
    pub template_path: PathBuf,
    /// Any other template metadata, exposed to the body context.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EmailTemplate {
    /// Create a template with no extra metadata.
    pub fn new(id: TemplateId, subject: impl Into<String>, template_path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            subject: subject.into(),
            template_path: template_path.into(),
            extra: Map::new(),
        }
    }

    /// The template flattened into a JSON object.
    pub fn context(&self) -> Map<String, Value> {
        let mut ctx = self.extra.clone();
        ctx.insert("id".into(), Value::from(self.id));
        ctx.insert("subject".into(), Value::String(self.subject.clone()));
        ctx.insert(
            "template_path".into(),
            Value::String(self.template_path.display().to_string()),
        );
        ctx
    }
}

/// Delivery state of a ledger entry. Every state but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    /// Queued, not yet dispatched.
    Pending,
    /// Delivered by the mail transport.
    Success,
    /// Resolution, render, or dispatch failed.
    Failed,
    /// Rendered to a preview file instead of being sent.
    Preview,
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Preview => "preview",
        };
        f.write_str(s)
    }
}

/// One (roster record, template) email obligation in the pending-email log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Immutable merge key, `{member_id}_{template_id}_{created_ms}`.
    pub id: EntryId,
    /// Recipient roster record.
    pub member_id: MemberId,
    /// Recipient address at enqueue time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    /// Template to render.
    pub template_id: TemplateId,
    /// Rendered subject, or the raw pattern after a failed dispatch.
    pub subject: Option<String>,
    /// Delivery state.
    pub status: EmailStatus,
    /// When the entry was created.
    pub created_at: Option<String>,
    /// When the entry was queued.
    pub queued_at: Option<String>,
    /// Last state transition.
    pub updated_at: Option<String>,
    /// When the transport accepted the message.
    pub sent_at: Option<String>,
    /// Failure description, only on `failed` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Transport message identifier of a successful send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Preview file written in preview mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_path: Option<String>,
    /// When the preview file was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_at: Option<String>,
}

impl LedgerEntry {
    /// Create a `pending` entry stamped at `now`.
    pub fn pending(
        member_id: MemberId,
        email_address: Option<String>,
        template_id: TemplateId,
        subject: String,
        created_ms: u128,
        now: &str,
    ) -> Self {
        Self {
            id: format!("{member_id}_{template_id}_{created_ms}"),
            member_id,
            email_address,
            template_id,
            subject: Some(subject),
            status: EmailStatus::Pending,
            created_at: Some(now.to_string()),
            queued_at: Some(now.to_string()),
            updated_at: None,
            sent_at: None,
            error: None,
            message_id: None,
            preview_path: None,
            preview_at: None,
        }
    }

    /// Whether the entry still awaits processing.
    pub fn is_pending(&self) -> bool {
        self.status == EmailStatus::Pending
    }

    /// Transition to `failed`.
    pub fn mark_failed(&mut self, error: impl Into<String>, now: &str) {
        self.status = EmailStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Some(now.to_string());
    }

    /// Transition to `success`.
    pub fn mark_sent(&mut self, subject: String, message_id: String, now: &str) {
        self.status = EmailStatus::Success;
        self.subject = Some(subject);
        self.message_id = Some(message_id);
        self.sent_at = Some(now.to_string());
        self.updated_at = Some(now.to_string());
    }

    /// Transition to `preview`. `sent_at` stays unset.
    pub fn mark_previewed(&mut self, subject: String, preview_path: String, now: &str) {
        self.status = EmailStatus::Preview;
        self.subject = Some(subject);
        self.preview_path = Some(preview_path);
        self.preview_at = Some(now.to_string());
        self.updated_at = Some(now.to_string());
    }

    /// The entry flattened into a JSON object.
    pub fn context(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_entry_has_only_creation_stamps() {
        let entry = LedgerEntry::pending(7, None, 2, "Hi".into(), 1_700, "t0");
        assert_eq!(entry.id, "7_2_1700");
        assert_eq!(entry.created_at.as_deref(), Some("t0"));
        assert_eq!(entry.queued_at.as_deref(), Some("t0"));
        assert!(entry.updated_at.is_none());
        assert!(entry.sent_at.is_none());
        assert!(entry.is_pending());
    }

    #[test]
    fn entry_serializes_nulls_but_omits_error() {
        let entry = LedgerEntry::pending(1, None, 1, "Hi".into(), 1, "t0");
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("sent_at").unwrap().is_null());
        assert!(value.get("error").is_none());
        assert_eq!(value["status"], "pending");
    }

    #[test]
    fn record_context_flattens_attributes() {
        let record = RosterRecord::new(3)
            .with_email("a@x.com")
            .with_attribute("is_a_worker", true);
        let ctx = record.context();
        assert_eq!(ctx["id"], 3);
        assert_eq!(ctx["email_address"], "a@x.com");
        assert_eq!(ctx["is_a_worker"], true);
        assert!(!ctx.contains_key("first_name"));
    }

    #[test]
    fn zero_id_and_blank_email_are_missing() {
        let record = RosterRecord {
            id: Some(0),
            email_address: Some("  ".into()),
            ..RosterRecord::default()
        };
        assert!(record.member_id().is_none());
        assert!(record.email().is_none());
    }
}
