//! Roster lookup filters.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::core::{MailerError, MailerResult, RosterRecord};

/// Fields matched by exact, case-insensitive string comparison.
pub const SIMPLE_FIELDS: &[&str] = &[
    "title",
    "first_name",
    "last_name",
    "occupation",
    "marital_status",
    "phone_number",
    "home_address",
    "home_address_post_code",
];

const DATE_OF_BIRTH: &str = "date_of_birth";
const SERVICE_UNITS: &str = "service_units";

/// Date-of-birth predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateFilter {
    /// Stored value equals this string exactly.
    Exact(String),
    /// Stored value parses to a date within the inclusive bounds.
    Range {
        /// Lower bound, if any.
        from: Option<NaiveDate>,
        /// Upper bound, if any.
        to: Option<NaiveDate>,
    },
}

/// Conjunction of predicates over roster records. An empty filter matches
/// every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    fields: Vec<(String, String)>,
    date_of_birth: Option<DateFilter>,
    flags: Vec<(String, bool)>,
    memberships: Vec<(String, String)>,
    emails_in: Option<Vec<String>>,
}

impl RecordFilter {
    /// A filter matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`, ignoring case.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    /// Require the stored date of birth to equal `date` exactly.
    #[must_use]
    pub fn with_date_of_birth(mut self, date: impl Into<String>) -> Self {
        self.date_of_birth = Some(DateFilter::Exact(date.into()));
        self
    }

    /// Require the date of birth to fall within `from..=to`.
    #[must_use]
    pub fn with_date_of_birth_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_of_birth = Some(DateFilter::Range { from, to });
        self
    }

    /// Require a boolean flag to have `expected` value.
    #[must_use]
    pub fn with_flag(mut self, field: impl Into<String>, expected: bool) -> Self {
        self.flags.push((field.into(), expected));
        self
    }

    /// Require the list-valued `list_field` to contain `value`, ignoring case.
    #[must_use]
    pub fn with_membership(mut self, list_field: impl Into<String>, value: impl Into<String>) -> Self {
        self.memberships.push((list_field.into(), value.into()));
        self
    }

    /// Require the record's email address to appear in `emails`.
    #[must_use]
    pub fn with_emails_in<I, S>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.emails_in = Some(
            emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .collect(),
        );
        self
    }

    /// Whether the filter has no predicates.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
            && self.date_of_birth.is_none()
            && self.flags.is_empty()
            && self.memberships.is_empty()
            && self.emails_in.is_none()
    }

    /// Evaluate every predicate against `record`.
    pub fn matches(&self, record: &RosterRecord) -> bool {
        if self.is_empty() {
            return true;
        }
        let ctx = record.context();

        let fields_match = self.fields.iter().all(|(field, expected)| {
            ctx.get(field)
                .and_then(Value::as_str)
                .is_some_and(|actual| actual.to_lowercase() == expected.to_lowercase())
        });
        if !fields_match {
            return false;
        }

        if let Some(dob) = &self.date_of_birth {
            let stored = ctx.get(DATE_OF_BIRTH).and_then(Value::as_str);
            let ok = match dob {
                DateFilter::Exact(expected) => stored == Some(expected.as_str()),
                DateFilter::Range { from, to } => stored.and_then(parse_date).is_some_and(|d| {
                    from.is_none_or(|f| d >= f) && to.is_none_or(|t| d <= t)
                }),
            };
            if !ok {
                return false;
            }
        }

        let flags_match = self
            .flags
            .iter()
            .all(|(field, expected)| ctx.get(field).and_then(flag_value) == Some(*expected));
        if !flags_match {
            return false;
        }

        let memberships_match = self
            .memberships
            .iter()
            .all(|(field, wanted)| ctx.get(field).is_some_and(|list| list_contains(list, wanted)));
        if !memberships_match {
            return false;
        }

        match &self.emails_in {
            Some(allowed) => record
                .email()
                .is_some_and(|email| allowed.contains(&email.to_lowercase())),
            None => true,
        }
    }

    /// Build a filter from a JSON object in the roster's query shape, e.g.
    /// `{"is_a_worker": true, "service_unit": "Media", "emails_in": ["a@x.com"],
    /// "date_of_birth": {"from": "1990-01-01"}}`.
    ///
    /// # Errors
    ///
    /// [`MailerError::Config`] for unknown keys or values of the wrong type.
    pub fn from_json(value: &Value) -> MailerResult<Self> {
        let Value::Object(map) = value else {
            return Err(MailerError::Config("filter must be a JSON object".into()));
        };
        map.iter().try_fold(Self::new(), |filter, (key, value)| filter.apply_json(key, value))
    }

    fn apply_json(self, key: &str, value: &Value) -> MailerResult<Self> {
        let bad = |what: &str| MailerError::Config(format!("filter key `{key}` expects {what}"));
        match key {
            k if SIMPLE_FIELDS.contains(&k) => {
                let s = value.as_str().ok_or_else(|| bad("a string"))?;
                Ok(self.with_field(k, s))
            }
            DATE_OF_BIRTH => match value {
                Value::String(s) => Ok(self.with_date_of_birth(s.clone())),
                Value::Object(bounds) => {
                    let from = date_bound(bounds, "from").map_err(|()| bad("a parseable `from` date"))?;
                    let to = date_bound(bounds, "to").map_err(|()| bad("a parseable `to` date"))?;
                    Ok(self.with_date_of_birth_range(from, to))
                }
                _ => Err(bad("a date string or {from, to}")),
            },
            "service_unit" => {
                let s = value.as_str().ok_or_else(|| bad("a string"))?;
                Ok(self.with_membership(SERVICE_UNITS, s))
            }
            "emails_in" => {
                let list = value.as_array().ok_or_else(|| bad("an array of strings"))?;
                let emails = list
                    .iter()
                    .map(|v| v.as_str().ok_or_else(|| bad("an array of strings")))
                    .collect::<MailerResult<Vec<_>>>()?;
                Ok(self.with_emails_in(emails))
            }
            _ => match value {
                Value::Bool(b) => Ok(self.with_flag(key, *b)),
                _ => Err(MailerError::Config(format!("unsupported filter key `{key}`"))),
            },
        }
    }
}

fn date_bound(bounds: &Map<String, Value>, key: &str) -> Result<Option<NaiveDate>, ()> {
    match bounds.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse_date(s).map(Some).ok_or(()),
        Some(_) => Err(()),
    }
}

/// Parse the date formats found in roster exports.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

fn flag_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn list_contains(list: &Value, wanted: &str) -> bool {
    let wanted = wanted.to_lowercase();
    match list {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|item| item.trim().to_lowercase() == wanted),
        Value::String(s) => s.split(',').any(|item| item.trim().to_lowercase() == wanted),
        _ => false,
    }
}
