//! Domain model, signals, debounced batching, and the enqueue/process pipeline.

pub mod batch;
pub mod enqueuer;
pub mod error;
pub mod executor;
pub mod model;
pub mod processor;
pub mod scheduler;
pub mod signal;

pub use batch::{BatchStats, DebouncedBatch, Spawn};
pub use enqueuer::EmailEnqueuer;
pub use error::{AppResult, MailerError, MailerResult};
pub use executor::BatchOperation;
pub use model::{
    EmailStatus, EmailTemplate, EntryId, LedgerEntry, MemberId, RosterRecord, TemplateId,
};
pub use processor::{DeliveryMode, EmailProcessor, ProcessReport, SenderIdentity};
pub use scheduler::{BatchScheduler, EnqueueBatch, ProcessBatch, SchedulerStats};
pub use signal::{Signal, SignalBus, SignalKind, SubscriptionId};
