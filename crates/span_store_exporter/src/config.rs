//! Configuration for exporter behavior.

use crate::backend::TRACE_TABLE;
use std::time::Duration;

/// Configuration for a [`SpanStoreExporter`](crate::SpanStoreExporter).
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Table every batch is inserted into.
    ///
    /// Default: [`TRACE_TABLE`]
    pub table_name: String,

    /// Upper bound on a single batch insert.
    ///
    /// `None` waits for the backend indefinitely; a hung backend then holds
    /// the flush token and stalls every later flush.
    ///
    /// Default: `None`
    pub backend_timeout: Option<Duration>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            table_name: TRACE_TABLE.to_string(),
            backend_timeout: None,
        }
    }
}

impl ExporterConfig {
    /// Sets the target table.
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Bounds each batch insert; expiry fails the batch.
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = Some(timeout);
        self
    }
}
