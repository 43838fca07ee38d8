//! File-backed JSON ledger with merge-by-id rewrites.
//!
//! Every operation runs under the ledger's [`FileLock`]. Writers never replace
//! the file wholesale: `merge` overlays incoming entries field by field onto
//! whatever is on disk at that moment, so concurrent enqueue and process
//! passes each touch only the entries they know about.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::{LedgerEntry, MailerResult};
use crate::infra::ledger::{FileLock, LockOptions};

/// A record that can live in a [`LockedLedger`].
pub trait LedgerRecord: Serialize + DeserializeOwned + Send + Sync {
    /// Merge key; records without one are skipped on merge.
    fn ledger_id(&self) -> Option<String>;
}

impl LedgerRecord for LedgerEntry {
    fn ledger_id(&self) -> Option<String> {
        Some(self.id.clone()).filter(|id| !id.is_empty())
    }
}

impl LedgerRecord for Value {
    fn ledger_id(&self) -> Option<String> {
        match self.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Overlay `incoming` onto `existing` by `id`.
///
/// Incoming fields win, fields absent from an incoming object keep their
/// existing value, unknown ids are appended, and existing entries missing
/// from `incoming` are kept untouched. Incoming values without an id are
/// ignored.
pub fn merge_by_id(existing: Vec<Value>, incoming: Vec<Value>) -> Vec<Value> {
    let mut merged: Vec<Value> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(existing.len());

    for value in existing {
        match value.ledger_id() {
            Some(id) => {
                if let Some(&pos) = index.get(&id) {
                    merged[pos] = value;
                } else {
                    index.insert(id, merged.len());
                    merged.push(value);
                }
            }
            None => merged.push(value),
        }
    }

    for value in incoming {
        let Some(id) = value.ledger_id() else {
            warn!("skipping ledger row without id");
            continue;
        };
        match index.get(&id) {
            Some(&pos) => overlay(&mut merged[pos], value),
            None => {
                index.insert(id, merged.len());
                merged.push(value);
            }
        }
    }
    merged
}

fn overlay(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(current), Value::Object(fields)) => {
            for (key, value) in fields {
                current.insert(key, value);
            }
        }
        (target, incoming) => *target = incoming,
    }
}

/// JSON-array ledger guarded by an advisory lock.
#[derive(Debug, Clone)]
pub struct LockedLedger<T> {
    path: PathBuf,
    options: LockOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T: LedgerRecord> LockedLedger<T> {
    /// Create a ledger handle for `path`. Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>, options: LockOptions) -> Self {
        Self {
            path: path.into(),
            options,
            _marker: PhantomData,
        }
    }

    /// Ledger file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock policy in use.
    pub const fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Create the ledger as an empty array if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Lock acquisition or filesystem failure.
    pub async fn ensure_exists(&self) -> MailerResult<()> {
        let _lock = FileLock::acquire(&self.path, &self.options).await?;
        if !self.path.exists() {
            write_atomic(&self.path, &[])?;
            info!(path = %self.path.display(), "created empty ledger");
        }
        Ok(())
    }

    /// Read every entry. A missing file reads as empty.
    ///
    /// # Errors
    ///
    /// Lock acquisition, filesystem, or parse failure.
    pub async fn read(&self) -> MailerResult<Vec<T>> {
        let _lock = FileLock::acquire(&self.path, &self.options).await?;
        let Some(raw) = read_raw(&self.path)? else {
            return Ok(Vec::new());
        };
        let entries: Vec<T> = serde_json::from_str(&raw)?;
        debug!(path = %self.path.display(), entries = entries.len(), "read ledger");
        Ok(entries)
    }

    /// Merge `entries` into the ledger by id.
    ///
    /// # Errors
    ///
    /// Lock acquisition, filesystem, or parse failure. On error the file on
    /// disk is left as it was.
    pub async fn merge(&self, entries: &[T]) -> MailerResult<()> {
        let mut incoming = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.ledger_id().is_none() {
                warn!("skipping ledger row without id");
                continue;
            }
            incoming.push(serde_json::to_value(entry)?);
        }

        let _lock = FileLock::acquire(&self.path, &self.options).await?;
        let current: Vec<Value> = match read_raw(&self.path)? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        let merged = merge_by_id(current, incoming);
        write_atomic(&self.path, &merged)?;
        info!(
            path = %self.path.display(),
            incoming = entries.len(),
            total = merged.len(),
            "merged ledger"
        );
        Ok(())
    }
}

fn read_raw(path: &Path) -> MailerResult<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(raw))
}

/// Write through a sibling temp file and rename, so readers never observe a
/// partially written array.
fn write_atomic(path: &Path, values: &[Value]) -> MailerResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let body = serde_json::to_vec_pretty(values)?;
    let mut file = File::create(&tmp_path)?;
    file.write_all(&body)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
