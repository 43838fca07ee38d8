//! Runtime adapters and the assembled application facade.

pub mod app;
pub mod tokio_spawner;

pub use app::{LedgerSummary, Mailer};
pub use tokio_spawner::TokioSpawner;
