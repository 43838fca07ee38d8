//! Batch scheduler: two debounced queues wired to the signal bus.
//!
//! `RecordCreated` signals feed the enqueue queue, whose batches run the
//! [`EmailEnqueuer`] against the welcome template. `EmailsEnqueued` signals
//! feed the process queue, whose batches run a full
//! [`EmailProcessor::process_pending`] pass regardless of the count carried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use crate::core::{
    BatchOperation, BatchStats, DebouncedBatch, EmailEnqueuer, EmailProcessor, RosterRecord,
    Signal, SignalBus, SignalKind, Spawn, SubscriptionId, TemplateId,
};

/// Enqueue batch: welcome every record in the batch.
#[derive(Debug)]
pub struct EnqueueBatch {
    enqueuer: Arc<EmailEnqueuer>,
    template_id: TemplateId,
}

#[async_trait]
impl BatchOperation<RosterRecord> for EnqueueBatch {
    async fn run(&self, batch: Vec<RosterRecord>) {
        match self.enqueuer.enqueue(&batch, self.template_id).await {
            Ok(count) => info!(records = batch.len(), count, "enqueue batch complete"),
            Err(e) => error!(
                records = batch.len(),
                template_id = self.template_id,
                error = %e,
                "enqueue batch failed"
            ),
        }
    }
}

/// Process batch: flush everything pending.
#[derive(Debug)]
pub struct ProcessBatch {
    processor: Arc<EmailProcessor>,
}

#[async_trait]
impl BatchOperation<usize> for ProcessBatch {
    async fn run(&self, batch: Vec<usize>) {
        let announced: usize = batch.iter().sum();
        match self.processor.process_pending().await {
            Ok(report) => info!(announced, processed = report.changed(), "process batch complete"),
            Err(e) => error!(announced, error = %e, "process batch failed"),
        }
    }
}

/// Counters of both scheduler queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Enqueue queue.
    pub enqueue: BatchStats,
    /// Process queue.
    pub process: BatchStats,
}

/// Coalesces producer signals into debounced enqueue and process batches.
pub struct BatchScheduler<S> {
    enqueue: DebouncedBatch<RosterRecord, EnqueueBatch, S>,
    process: DebouncedBatch<usize, ProcessBatch, S>,
}

impl<S> BatchScheduler<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Create a scheduler whose queues both wait `delay` before running.
    pub fn new(
        enqueuer: Arc<EmailEnqueuer>,
        processor: Arc<EmailProcessor>,
        welcome_template_id: TemplateId,
        delay: Duration,
        spawner: S,
    ) -> Self {
        Self {
            enqueue: DebouncedBatch::new(
                "enqueue",
                delay,
                EnqueueBatch {
                    enqueuer,
                    template_id: welcome_template_id,
                },
                spawner.clone(),
            ),
            process: DebouncedBatch::new("process", delay, ProcessBatch { processor }, spawner),
        }
    }

    /// Subscribe both queues to their producer signals on `bus`.
    pub fn attach(&self, bus: &SignalBus) -> [SubscriptionId; 2] {
        let enqueue = self.enqueue.clone();
        let on_record = bus.subscribe(SignalKind::RecordCreated, move |signal| {
            if let Signal::RecordCreated(record) = signal {
                enqueue.push(record.clone());
            }
        });
        let process = self.process.clone();
        let on_enqueued = bus.subscribe(SignalKind::EmailsEnqueued, move |signal| {
            if let Signal::EmailsEnqueued(count) = signal {
                process.push(*count);
            }
        });
        [on_record, on_enqueued]
    }

    /// Queue a welcome email for `record`.
    pub fn queue_welcome_email(&self, record: RosterRecord) {
        self.enqueue.push(record);
    }

    /// Request a processing pass; `count` is informational.
    pub fn queue_process_emails(&self, count: usize) {
        self.process.push(count);
    }

    /// Wait until neither queue has a batch scheduled or running.
    pub async fn wait_idle(&self) {
        loop {
            self.enqueue.wait_idle().await;
            self.process.wait_idle().await;
            if self.enqueue.is_idle() && self.process.is_idle() {
                return;
            }
        }
    }

    /// Current counters.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            enqueue: self.enqueue.stats(),
            process: self.process.stats(),
        }
    }
}

impl<S> std::fmt::Debug for BatchScheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler").finish_non_exhaustive()
    }
}
