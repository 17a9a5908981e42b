use crate::backend::StorageBackendBoxed;
use crate::config::ExporterConfig;
use crate::coordinator::FlushCoordinator;
use crate::error::ExporterError;
use crate::logger::ExportLogger;
use crate::queue::{ExportResult, QueueEntry};
use crate::span::ScopeSpans;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Asynchronous span exporter persisting batches to a [`StorageBackend`].
///
/// `export` never blocks: it queues the batch and, if nothing is being
/// flushed, starts a background flush on the tokio runtime. Each batch is
/// persisted as its own backend call, strictly in submission order, with at
/// most one call in flight. Call [`shutdown`](Self::shutdown) (or
/// [`force_flush`](Self::force_flush)) before exiting so that every accepted
/// batch is attempted.
///
/// Clones share the same queue and backend.
///
/// # Example
///
/// ```ignore
/// let backend = Arc::new(MemoryBackend::new());
/// let exporter = SpanStoreExporter::new(backend, ExporterConfig::default())?;
///
/// exporter.export(batch, |result| {
///     if let Err(e) = result {
///         eprintln!("batch dropped: {e}");
///     }
/// });
///
/// exporter.shutdown().await;
/// ```
///
/// [`StorageBackend`]: crate::StorageBackend
#[derive(Clone)]
pub struct SpanStoreExporter {
    coordinator: Arc<FlushCoordinator>,
    runtime: Handle,
}

impl SpanStoreExporter {
    /// Creates an exporter bound to the current tokio runtime.
    pub fn new(
        backend: Arc<dyn StorageBackendBoxed>,
        config: ExporterConfig,
    ) -> Result<Self, ExporterError> {
        let runtime = Handle::try_current().map_err(|_| ExporterError::NoRuntime)?;
        Ok(Self::with_runtime(runtime, backend, config))
    }

    /// Creates an exporter that spawns its background flushes on `runtime`.
    ///
    /// Use this when spans are exported from threads outside the runtime.
    pub fn with_runtime(
        runtime: Handle,
        backend: Arc<dyn StorageBackendBoxed>,
        config: ExporterConfig,
    ) -> Self {
        Self {
            coordinator: Arc::new(FlushCoordinator::new(backend, config)),
            runtime,
        }
    }

    /// Queues `batch` for persistence and returns immediately.
    ///
    /// `callback` is invoked exactly once, from a flush task, with the
    /// batch's outcome. Malformed spans never fail here; they surface
    /// through the callback.
    pub fn export<F>(&self, batch: Vec<ScopeSpans>, callback: F)
    where
        F: FnOnce(ExportResult) + Send + 'static,
    {
        let entry = QueueEntry::new(batch, Box::new(callback));
        if let Some(pending) = self.coordinator.enqueue(entry) {
            let coordinator = Arc::clone(&self.coordinator);
            // Outcome already went to the callback and logger
            self.runtime.spawn(async move {
                let _ = coordinator.run(pending).await;
            });
        }
    }

    /// Persists the oldest queued batch, waiting first for any flush
    /// already in flight. No-op on an empty queue.
    pub async fn flush(&self) -> ExportResult {
        self.coordinator.flush().await
    }

    /// Persists every queued batch, one backend call each, in order.
    ///
    /// Returns once the queue is empty and no flush is in flight. Batches
    /// exported concurrently are drained as well, so sustained export
    /// traffic can keep this from returning.
    pub async fn force_flush(&self) {
        self.coordinator.force_flush().await;
    }

    /// Flushes everything accepted so far. The exporter stays usable.
    pub async fn shutdown(&self) {
        self.force_flush().await;
    }

    /// Replaces the logging collaborator; applies to flushes started after
    /// the call.
    pub fn set_logger(&self, logger: Arc<dyn ExportLogger>) {
        self.coordinator.set_logger(logger);
    }
}

impl fmt::Debug for SpanStoreExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanStoreExporter")
            .field("pending_entries", &self.coordinator.pending_entries())
            .field("flushing", &self.coordinator.is_flushing())
            .finish_non_exhaustive()
    }
}
