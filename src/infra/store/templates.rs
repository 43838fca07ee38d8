//! Email template store.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{error, warn};

use crate::core::{EmailTemplate, MailerResult, TemplateId};

/// Lookup of stored email templates.
pub trait TemplateStore: Send + Sync {
    /// Every stored template.
    fn all(&self) -> Vec<EmailTemplate>;

    /// The template with identifier `id`.
    fn find_by_id(&self, id: TemplateId) -> Option<EmailTemplate> {
        self.all().into_iter().find(|t| t.id == id)
    }
}

/// Templates persisted as a JSON array of `{id, subject, template_path}`.
#[derive(Debug, Clone)]
pub struct JsonTemplateStore {
    path: PathBuf,
}

impl JsonTemplateStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Template file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> MailerResult<Vec<EmailTemplate>> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "template store not found");
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }
}

impl TemplateStore for JsonTemplateStore {
    fn all(&self) -> Vec<EmailTemplate> {
        self.load().unwrap_or_else(|e| {
            error!(path = %self.path.display(), error = %e, "failed to load templates");
            Vec::new()
        })
    }
}

/// Templates held in memory.
#[derive(Debug, Default)]
pub struct InMemoryTemplateStore {
    templates: RwLock<Vec<EmailTemplate>>,
}

impl InMemoryTemplateStore {
    /// Store seeded with `templates`.
    pub fn new(templates: Vec<EmailTemplate>) -> Self {
        Self {
            templates: RwLock::new(templates),
        }
    }

    /// Add or replace a template by identifier.
    pub fn insert(&self, template: EmailTemplate) {
        let mut templates = self.templates.write();
        templates.retain(|t| t.id != template.id);
        templates.push(template);
    }
}

impl TemplateStore for InMemoryTemplateStore {
    fn all(&self) -> Vec<EmailTemplate> {
        self.templates.read().clone()
    }
}
