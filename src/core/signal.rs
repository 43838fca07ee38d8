//! Typed publish/subscribe bus connecting roster sync, enqueue, and processing.
//!
//! Signals form a closed enum so a misspelled event cannot silently go
//! unheard. Handlers run synchronously on the publishing task and must stay
//! cheap: the scheduler's handlers only push into a debounced buffer.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::core::model::RosterRecord;

/// A signal emitted by a producer.
#[derive(Debug, Clone)]
pub enum Signal {
    /// A roster record was seen for the first time.
    RecordCreated(RosterRecord),
    /// An enqueue pass appended this many new ledger entries.
    EmailsEnqueued(usize),
}

impl Signal {
    /// Kind used for subscription routing.
    pub const fn kind(&self) -> SignalKind {
        match self {
            Self::RecordCreated(_) => SignalKind::RecordCreated,
            Self::EmailsEnqueued(_) => SignalKind::EmailsEnqueued,
        }
    }
}

/// Discriminant of [`Signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// See [`Signal::RecordCreated`].
    RecordCreated,
    /// See [`Signal::EmailsEnqueued`].
    EmailsEnqueued,
}

/// Handle returned by [`SignalBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Signal) + Send + Sync>;

/// In-process signal bus.
#[derive(Default)]
pub struct SignalBus {
    handlers: RwLock<HashMap<SignalKind, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
}

impl SignalBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every signal of `kind`.
    pub fn subscribe<F>(&self, kind: SignalKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        debug!(?kind, "listener registered");
        id
    }

    /// Remove a previously registered handler. Returns whether it existed.
    pub fn unsubscribe(&self, kind: SignalKind, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        let removed = list.len() != before;
        if removed {
            debug!(?kind, "listener removed");
        }
        removed
    }

    /// Deliver `signal` to every handler of its kind and return how many ran.
    ///
    /// A panicking handler is logged and does not stop the others.
    pub fn publish(&self, signal: &Signal) -> usize {
        let kind = signal.kind();
        // Snapshot so handlers may subscribe or publish without deadlocking.
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            warn!(?kind, "no listeners registered for signal");
            return 0;
        }

        debug!(?kind, listeners = handlers.len(), "signal published");
        let mut delivered = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(signal))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(?kind, "signal listener panicked"),
            }
        }
        delivered
    }

    /// Number of handlers registered for `kind`.
    pub fn listener_count(&self, kind: SignalKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("SignalBus")
            .field("record_created", &handlers.get(&SignalKind::RecordCreated).map_or(0, Vec::len))
            .field("emails_enqueued", &handlers.get(&SignalKind::EmailsEnqueued).map_or(0, Vec::len))
            .finish()
    }
}
