use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A raw span could not be converted into a storage record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Required timestamp absent from the span
    #[error("span {span_id} is missing {field}")]
    MissingTimestamp {
        span_id: String,
        field: &'static str,
    },
    /// Nested structure could not be JSON-encoded
    #[error("failed to encode {field} of span {span_id}: {reason}")]
    Encode {
        span_id: String,
        field: &'static str,
        reason: String,
    },
}

/// Error types for storage backend operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Transport-layer error (network, file system, driver)
    #[error("transport error: {0}")]
    Transport(String),
    /// Backend refused the records (constraint violation, schema mismatch)
    #[error("records rejected: {0}")]
    Rejected(String),
    /// Backend is not reachable or not accepting writes
    #[error("backend unavailable")]
    Unavailable,
    /// Batch insert did not settle in time
    #[error("batch insert timed out after {0:?}")]
    Timeout(Duration),
}

/// Identifying fields of the first span in a failed batch, for triage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanSummary {
    pub name: String,
    pub kind: String,
    pub scope: String,
}

impl fmt::Display for SpanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, scope {})", self.name, self.kind, self.scope)
    }
}

/// Underlying cause of a failed flush.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlushFailure {
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The flush was dropped before the backend call settled; the records
    /// may or may not have been written
    #[error("flush cancelled before the batch insert settled")]
    Cancelled,
}

/// A queued batch could not be persisted.
///
/// Carries enough context to find the batch in logs: how many records were
/// attempted, which table, and the first span's identifying fields.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to insert {record_count} span records into `{table}`{}", first_span_suffix(.first_span.as_ref()))]
pub struct FlushError {
    pub record_count: usize,
    pub table: String,
    pub first_span: Option<SpanSummary>,
    #[source]
    pub source: FlushFailure,
}

fn first_span_suffix(first: Option<&SpanSummary>) -> String {
    match first {
        Some(summary) => format!(" (first span: {summary})"),
        None => String::new(),
    }
}

impl FlushError {
    pub fn is_transform(&self) -> bool {
        matches!(self.source, FlushFailure::Transform(_))
    }

    pub fn is_backend(&self) -> bool {
        matches!(self.source, FlushFailure::Backend(_))
    }
}

/// Errors raised while setting up an exporter
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExporterError {
    /// `new` was called outside a tokio runtime
    #[error("no tokio runtime available; construct the exporter inside a runtime or pass a handle")]
    NoRuntime,
}
