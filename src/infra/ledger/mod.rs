//! Locked ledger: a JSON array on disk with exclusive read-modify-write
//! access and merge-by-identifier updates.

pub mod lock;
pub mod locked;

pub use lock::{FileLock, LockOptions};
pub use locked::{merge_by_id, LedgerRecord, LockedLedger};
