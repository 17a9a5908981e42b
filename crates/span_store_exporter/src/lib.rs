//! Span Store Exporter
//!
//! An asynchronous span exporter that turns completed tracing spans into
//! flat storage records and persists them through a pluggable batch-insert
//! backend. Instrumented code hands batches to [`SpanStoreExporter::export`]
//! and moves on; a single background flush at a time transforms and writes
//! them in submission order, reporting each batch's outcome through its
//! completion callback.
//!
//! ```text
//!  export(batch, cb) ──► ExportQueue ──► FlushCoordinator ──► transform ──► StorageBackend
//!        (sync)            (FIFO)        (one flush at a time)   (pure)      (batch_insert)
//! ```
//!
//! # Native Async Traits
//!
//! [`StorageBackend`] uses native async fn in traits (no `#[async_trait]`
//! macro). [`StorageBackendBoxed`] is its object-safe twin, implemented for
//! every backend, which is what the exporter stores.

pub mod backend;
pub mod config;
mod coordinator;
pub mod error;
pub mod exporter;
pub mod logger;
pub(crate) mod queue;
pub mod record;
pub mod span;
pub mod transform;

// Re-export main types
pub use backend::{
    JsonLinesBackend, MemoryBackend, NullBackend, StdoutBackend, StorageBackend,
    StorageBackendBoxed, TRACE_TABLE,
};
pub use config::ExporterConfig;
pub use error::{BackendError, ExporterError, FlushError, FlushFailure, SpanSummary, TransformError};
pub use exporter::SpanStoreExporter;
pub use logger::{ExportLogger, TracingLogger};
pub use queue::{ExportCallback, ExportResult};
pub use record::StorageRecord;
pub use span::{AnyValue, KeyValue, RawSpan, ScopeSpans, SpanEvent, SpanKind, SpanLink, SpanStatus};
pub use transform::{flatten_attributes, transform_batch, transform_span};
