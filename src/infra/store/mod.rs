//! Record and template stores consumed by the mail pipeline.

pub mod filter;
pub mod roster;
pub mod templates;

pub use filter::{DateFilter, RecordFilter, SIMPLE_FIELDS};
pub use roster::{read_csv_rows, InMemoryRecordStore, JsonRecordStore, RecordStore, SyncOutcome};
pub use templates::{InMemoryTemplateStore, JsonTemplateStore, TemplateStore};
