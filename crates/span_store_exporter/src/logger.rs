//! Logging collaborator.
//!
//! The exporter may be built before the host application has its own
//! logging set up, so the sink is a trait object that can be swapped later
//! through [`SpanStoreExporter::set_logger`](crate::SpanStoreExporter::set_logger).
//! Logging never affects control flow.

use crate::error::FlushError;
use std::sync::{Arc, RwLock};

/// Diagnostic sink used by the exporter.
pub trait ExportLogger: Send + Sync {
    fn debug(&self, msg: &str);

    fn error(&self, msg: &str);

    /// Reports a failed batch with its full context.
    fn track_exception(&self, error: &FlushError);
}

/// Default logger forwarding to the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl ExportLogger for TracingLogger {
    fn debug(&self, msg: &str) {
        tracing::debug!(target: "span_store_exporter", "{msg}");
    }

    fn error(&self, msg: &str) {
        tracing::error!(target: "span_store_exporter", "{msg}");
    }

    fn track_exception(&self, error: &FlushError) {
        tracing::error!(
            target: "span_store_exporter",
            error = %error,
            cause = %error.source,
            records = error.record_count,
            table = %error.table,
            "span batch dropped"
        );
    }
}

/// Late-bindable logger slot shared by the exporter and its flush tasks.
pub(crate) struct LoggerSlot {
    inner: RwLock<Arc<dyn ExportLogger>>,
}

impl LoggerSlot {
    pub(crate) fn new(logger: Arc<dyn ExportLogger>) -> Self {
        Self {
            inner: RwLock::new(logger),
        }
    }

    pub(crate) fn set(&self, logger: Arc<dyn ExportLogger>) {
        *self.inner.write().unwrap_or_else(|p| p.into_inner()) = logger;
    }

    /// Current logger; the lock is released before the caller logs.
    pub(crate) fn get(&self) -> Arc<dyn ExportLogger> {
        Arc::clone(&self.inner.read().unwrap_or_else(|p| p.into_inner()))
    }
}

impl Default for LoggerSlot {
    fn default() -> Self {
        Self::new(Arc::new(TracingLogger))
    }
}
