//! # Roster Mailer
//!
//! A batched, deduplicated email queue driven by roster synchronization.
//!
//! New roster records trigger a welcome enqueue; every enqueue that queued
//! something triggers a pass that flushes pending emails. The pieces:
//!
//! - **Locked Ledger**: a JSON array on disk, read and rewritten under an
//!   advisory file lock with bounded retry and stale-lock recovery. Rewrites
//!   merge by entry id and never drop entries they do not know about.
//! - **Enqueuer**: turns records plus a template into `pending` entries, at
//!   most one per `(member, template)` pair.
//! - **Processor**: resolves, renders, and sends or previews each `pending`
//!   entry, recording a terminal status.
//! - **Batch Scheduler**: two debounced queues that coalesce bursts of
//!   signals into sequential batches without dropping anything.
//!
//! ```rust,ignore
//! use roster_mailer::builders::MailerBuilder;
//! use roster_mailer::config::MailerConfig;
//! use roster_mailer::runtime::TokioSpawner;
//!
//! let mailer = MailerBuilder::new(MailerConfig::default()).build(TokioSpawner::current())?;
//! mailer.import_roster(rows)?;
//! mailer.drain().await;
//! println!("{:?}", mailer.ledger_summary().await?);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Domain model, signals, debounced batching, and the mail pipeline.
pub mod core;
/// Configuration models for storage, delivery, and scheduling.
pub mod config;
/// Builders to assemble the pipeline from configuration.
pub mod builders;
/// Infrastructure adapters: ledger, stores, rendering, transports.
pub mod infra;
/// Runtime adapters and the application facade.
pub mod runtime;
/// Shared utilities.
pub mod util;
