//! Debounced batch queue.
//!
//! Producers push items one at a time; the queue collects them for a fixed
//! delay and hands the whole buffer to a [`BatchOperation`]. While a batch is
//! in flight new items land in a fresh buffer, and once the batch completes a
//! non-empty buffer immediately re-arms another delayed batch with the same
//! delay. At most one batch of a given queue runs at any time and no pushed
//! item is ever dropped.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error};

use crate::core::BatchOperation;

/// Abstraction for spawning batch drivers on a runtime.
pub trait Spawn {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Point-in-time counters of a debounced queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Batch operations invoked so far.
    pub batches_run: u64,
    /// Items handed to batch operations so far.
    pub items_processed: u64,
    /// Items waiting for the next batch.
    pub buffered: usize,
    /// Whether a batch is scheduled or running.
    pub in_flight: bool,
}

struct BatchState<T> {
    buffer: Vec<T>,
    in_flight: bool,
}

struct BatchInner<T, O> {
    name: &'static str,
    delay: Duration,
    operation: O,
    state: Mutex<BatchState<T>>,
    idle: Notify,
    batches_run: AtomicU64,
    items_processed: AtomicU64,
}

impl<T, O> BatchInner<T, O> {
    fn settle(&self) {
        self.idle.notify_waiters();
    }
}

/// Clears the in-flight flag if a batch operation unwinds, so the next push
/// re-arms the queue instead of buffering forever.
struct PanicGuard<'a, T, O> {
    inner: &'a BatchInner<T, O>,
}

impl<T, O> Drop for PanicGuard<'_, T, O> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(queue = self.inner.name, "batch operation panicked");
            self.inner.state.lock().in_flight = false;
            self.inner.settle();
        }
    }
}

/// A debounced, strictly sequential batch queue.
pub struct DebouncedBatch<T, O, S> {
    inner: Arc<BatchInner<T, O>>,
    spawner: S,
}

impl<T, O, S: Clone> Clone for DebouncedBatch<T, O, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            spawner: self.spawner.clone(),
        }
    }
}

impl<T, O, S> DebouncedBatch<T, O, S>
where
    T: Send + 'static,
    O: BatchOperation<T>,
    S: Spawn,
{
    /// Create an idle queue. `name` only labels log lines.
    pub fn new(name: &'static str, delay: Duration, operation: O, spawner: S) -> Self {
        Self {
            inner: Arc::new(BatchInner {
                name,
                delay,
                operation,
                state: Mutex::new(BatchState {
                    buffer: Vec::new(),
                    in_flight: false,
                }),
                idle: Notify::new(),
                batches_run: AtomicU64::new(0),
                items_processed: AtomicU64::new(0),
            }),
            spawner,
        }
    }

    /// Append an item, arming a delayed batch if none is in flight.
    pub fn push(&self, item: T) {
        let arm = {
            let mut state = self.inner.state.lock();
            state.buffer.push(item);
            if state.in_flight {
                false
            } else {
                state.in_flight = true;
                true
            }
        };
        if arm {
            debug!(queue = self.inner.name, delay_ms = self.inner.delay.as_millis(), "batch armed");
            self.spawner.spawn(drive(Arc::clone(&self.inner)));
        }
    }

    /// Current counters.
    pub fn stats(&self) -> BatchStats {
        let state = self.inner.state.lock();
        BatchStats {
            batches_run: self.inner.batches_run.load(Ordering::Acquire),
            items_processed: self.inner.items_processed.load(Ordering::Acquire),
            buffered: state.buffer.len(),
            in_flight: state.in_flight,
        }
    }

    /// Whether no batch is scheduled or running.
    pub fn is_idle(&self) -> bool {
        !self.inner.state.lock().in_flight
    }

    /// The batch operation this queue drives.
    pub fn operation(&self) -> &O {
        &self.inner.operation
    }

    /// Wait until the queue has no batch scheduled or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

async fn drive<T, O>(inner: Arc<BatchInner<T, O>>)
where
    T: Send + 'static,
    O: BatchOperation<T>,
{
    let guard = PanicGuard { inner: &inner };
    loop {
        tokio::time::sleep(inner.delay).await;

        let batch = std::mem::take(&mut inner.state.lock().buffer);
        if !batch.is_empty() {
            let items = batch.len() as u64;
            debug!(queue = inner.name, items, "running batch");
            inner.operation.run(batch).await;
            inner.batches_run.fetch_add(1, Ordering::AcqRel);
            inner.items_processed.fetch_add(items, Ordering::AcqRel);
        }

        let rearm = {
            let mut state = inner.state.lock();
            if state.buffer.is_empty() {
                state.in_flight = false;
                false
            } else {
                true
            }
        };
        if !rearm {
            break;
        }
        debug!(queue = inner.name, "items arrived during batch, re-arming");
    }
    drop(guard);
    inner.settle();
}
