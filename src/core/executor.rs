//! Batch operation trait driven by the debounced scheduler queues.

use async_trait::async_trait;

/// Work performed on one coalesced batch of items.
///
/// The scheduler treats every batch as best-effort: an implementation logs
/// and swallows its own failures so that a bad batch never stalls the queue
/// that invoked it.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use roster_mailer::core::BatchOperation;
///
/// struct CountBatch;
///
/// #[async_trait]
/// impl BatchOperation<u32> for CountBatch {
///     async fn run(&self, batch: Vec<u32>) {
///         tracing::info!(items = batch.len(), "batch ran");
///     }
/// }
/// ```
#[async_trait]
pub trait BatchOperation<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    /// Process every item accumulated during one debounce window.
    async fn run(&self, batch: Vec<T>);
}
