//! Roster record store.
//!
//! [`JsonRecordStore`] reads the roster JSON file on every lookup, so a
//! processing pass always sees what the last sync wrote. [`upsert_rows`]
//! is the boundary of the sync step: it receives rows that were already
//! fetched and parsed, merges them by name, and reports which records are new.
//!
//! [`upsert_rows`]: JsonRecordStore::upsert_rows

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::core::{MailerResult, MemberId, RosterRecord};
use crate::infra::store::RecordFilter;

/// Read access to roster records.
pub trait RecordStore: Send + Sync {
    /// Every record in the roster.
    fn all(&self) -> Vec<RosterRecord>;

    /// Records matching `filter`.
    fn find_all(&self, filter: &RecordFilter) -> Vec<RosterRecord> {
        self.all().into_iter().filter(|r| filter.matches(r)).collect()
    }

    /// The record with identifier `id`.
    fn find_by_id(&self, id: MemberId) -> Option<RosterRecord> {
        self.all().into_iter().find(|r| r.member_id() == Some(id))
    }
}

/// Result of merging fetched rows into the roster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    /// Records seen for the first time, with their new identifiers.
    pub created: Vec<RosterRecord>,
    /// Existing records whose fields changed.
    pub updated: usize,
    /// Existing records left as they were.
    pub unchanged: usize,
    /// Roster size after the merge.
    pub total: usize,
}

/// Roster persisted as a JSON array.
#[derive(Debug, Clone)]
pub struct JsonRecordStore {
    path: PathBuf,
}

impl JsonRecordStore {
    /// Store backed by `path`. The file need not exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Roster file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> MailerResult<Vec<RosterRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, records: &[RosterRecord]) -> MailerResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut body = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut body, PrettyFormatter::with_indent(b"    "));
        records.serialize(&mut serializer)?;
        fs::write(&self.path, body)?;
        Ok(())
    }

    /// Merge freshly fetched rows into the roster.
    ///
    /// Header keys are normalised to snake_case and values trimmed. Rows are
    /// matched to existing records by lower-cased first and last name;
    /// matches have changed fields updated in place (never `id`), the rest
    /// get the next free identifier. Records absent from `rows` are kept.
    ///
    /// # Errors
    ///
    /// Filesystem or parse failure reading or writing the roster.
    pub fn upsert_rows<I>(&self, rows: I) -> MailerResult<SyncOutcome>
    where
        I: IntoIterator<Item = Map<String, Value>>,
    {
        let mut records = self.load()?;
        info!(path = %self.path.display(), existing = records.len(), "loaded roster");

        let mut next_id = records.iter().filter_map(RosterRecord::member_id).max().unwrap_or(0) + 1;
        let mut by_key: HashMap<String, usize> = records
            .iter()
            .enumerate()
            .map(|(pos, r)| (name_key(&r.context()), pos))
            .collect();

        let mut outcome = SyncOutcome::default();
        for raw in rows {
            let mut row = normalize_row(raw);
            row.remove("id");
            let key = name_key(&row);

            if let Some(&pos) = by_key.get(&key) {
                let mut ctx = records[pos].context();
                let mut changed = false;
                for (field, value) in row {
                    if ctx.get(&field) != Some(&value) {
                        ctx.insert(field, value);
                        changed = true;
                    }
                }
                if changed {
                    records[pos] = serde_json::from_value(Value::Object(ctx))?;
                    outcome.updated += 1;
                    debug!(key = %key, "updated roster record");
                } else {
                    outcome.unchanged += 1;
                }
            } else {
                row.insert("id".into(), Value::from(next_id));
                next_id += 1;
                let record: RosterRecord = serde_json::from_value(Value::Object(row))?;
                info!(member_id = ?record.id, key = %key, "new roster record");
                by_key.insert(key, records.len());
                outcome.created.push(record.clone());
                records.push(record);
            }
        }

        self.save(&records)?;
        outcome.total = records.len();
        info!(
            created = outcome.created.len(),
            updated = outcome.updated,
            total = outcome.total,
            "roster synchronized"
        );
        Ok(outcome)
    }
}

impl RecordStore for JsonRecordStore {
    fn all(&self) -> Vec<RosterRecord> {
        match self.load() {
            Ok(records) => records,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to load roster");
                Vec::new()
            }
        }
    }
}

/// Roster held in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<Vec<RosterRecord>>,
}

impl InMemoryRecordStore {
    /// Store seeded with `records`.
    pub fn new(records: Vec<RosterRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Add or replace a record by identifier.
    pub fn insert(&self, record: RosterRecord) {
        let mut records = self.records.write();
        match records
            .iter_mut()
            .find(|r| r.member_id().is_some() && r.member_id() == record.member_id())
        {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }
}

impl RecordStore for InMemoryRecordStore {
    fn all(&self) -> Vec<RosterRecord> {
        self.records.read().clone()
    }
}

/// Normalise a header to snake_case: trim, lower-case, whitespace runs to
/// `_`, drop anything that is not a word character.
pub fn normalize_key(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut in_space = false;
    for c in lowered.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        }
    }
    out
}

fn normalize_row(raw: Map<String, Value>) -> Map<String, Value> {
    raw.into_iter()
        .filter_map(|(key, value)| {
            let key = normalize_key(&key);
            if key.is_empty() {
                warn!("dropping column with empty header");
                return None;
            }
            let value = match value {
                Value::String(s) => Value::String(s.trim().to_string()),
                Value::Null => Value::String(String::new()),
                other => other,
            };
            Some((key, value))
        })
        .collect()
}

/// Parse roster CSV into raw rows keyed by the header line.
///
/// Headers are kept as written; [`JsonRecordStore::upsert_rows`] normalises
/// them. Short rows leave their missing columns out, and extra cells beyond
/// the header are dropped.
///
/// # Errors
///
/// [`MailerError::Csv`](crate::core::MailerError::Csv) on unreadable input
/// or malformed quoting.
pub fn read_csv_rows<R: Read>(reader: R) -> MailerResult<Vec<Map<String, Value>>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.to_string(), Value::String(cell.to_string())))
            .collect();
        rows.push(row);
    }
    debug!(rows = rows.len(), columns = headers.len(), "parsed roster csv");
    Ok(rows)
}

fn name_key(row: &Map<String, Value>) -> String {
    let part = |field: &str| {
        row.get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_lowercase()
    };
    format!("{}_{}", part("first_name"), part("last_name"))
}
