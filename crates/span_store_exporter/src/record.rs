use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Flattened, storage-ready representation of one span.
///
/// Nested structures are carried as JSON strings so any backend that can
/// store text columns can persist a record without knowing the span model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRecord {
    /// Span identifier
    pub id: String,
    pub parent_span_id: Option<String>,
    pub trace_id: String,
    pub name: String,
    /// Instrumentation scope name
    pub scope: String,
    /// OTLP numeric span kind
    pub kind: i32,
    /// JSON-encoded status object
    pub status: String,
    /// JSON-encoded event list
    pub events: String,
    /// JSON-encoded link list
    pub links: String,
    /// JSON-encoded map of attribute key to scalar value
    pub attributes: String,
    /// Start time (Unix microseconds)
    pub start_time: i64,
    /// End time (Unix microseconds)
    pub end_time: i64,
    /// JSON-encoded residual span fields
    pub other: String,
    /// Wall-clock time of the flush that produced this record
    pub created_at: DateTime<Utc>,
}

impl StorageRecord {
    /// Duration of the span in microseconds (not clamped; producers are trusted)
    pub fn duration_micros(&self) -> i64 {
        self.end_time - self.start_time
    }
}
