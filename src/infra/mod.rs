//! Infrastructure adapters: the locked ledger, stores, rendering, and mail transports.

pub mod ledger;
pub mod render;
pub mod store;
pub mod transport;

pub use ledger::{FileLock, LedgerRecord, LockOptions, LockedLedger};
pub use render::{SafeContext, TemplateRenderer};
pub use store::{
    InMemoryRecordStore, InMemoryTemplateStore, JsonRecordStore, JsonTemplateStore, RecordFilter,
    RecordStore, TemplateStore,
};
pub use transport::{MailTransport, MemoryTransport, OutgoingEmail, SendReceipt};
