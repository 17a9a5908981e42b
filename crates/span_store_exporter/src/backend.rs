use crate::error::BackendError;
use crate::record::StorageRecord;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

/// Well-known table holding span records.
pub const TRACE_TABLE: &str = "traces";

/// Trait for durable stores that accept batches of span records.
///
/// A failed `batch_insert` is assumed to have written either none or all of
/// the records; the exporter does not retry.
///
/// # Note on Object Safety
///
/// This trait uses `impl Future` return types which are not object-safe.
/// For dynamic dispatch, use `Arc<dyn StorageBackendBoxed>`; every
/// `StorageBackend` implements it.
pub trait StorageBackend: Send + Sync {
    /// Inserts `records` into `table` as one batch.
    fn batch_insert(
        &self,
        table: &str,
        records: Vec<StorageRecord>,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Returns the backend name for debugging.
    fn name(&self) -> &str;
}

/// Object-safe version of StorageBackend for dynamic dispatch.
pub trait StorageBackendBoxed: Send + Sync {
    /// Inserts a batch (boxed future for object safety).
    fn batch_insert_boxed<'a>(
        &'a self,
        table: &'a str,
        records: Vec<StorageRecord>,
    ) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + 'a>>;

    /// Returns the backend name for debugging.
    fn name(&self) -> &str;
}

/// Blanket implementation: any StorageBackend can be used as StorageBackendBoxed
impl<T: StorageBackend> StorageBackendBoxed for T {
    fn batch_insert_boxed<'a>(
        &'a self,
        table: &'a str,
        records: Vec<StorageRecord>,
    ) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + 'a>> {
        Box::pin(self.batch_insert(table, records))
    }

    fn name(&self) -> &str {
        StorageBackend::name(self)
    }
}

/// Null backend that discards all records (for benchmarking)
#[derive(Debug, Default)]
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}

impl StorageBackend for NullBackend {
    async fn batch_insert(&self, _table: &str, _records: Vec<StorageRecord>) -> Result<(), BackendError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Stdout backend for debugging
pub struct StdoutBackend {
    verbose: bool,
}

impl StdoutBackend {
    /// Creates a new stdout backend
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl StorageBackend for StdoutBackend {
    async fn batch_insert(&self, table: &str, records: Vec<StorageRecord>) -> Result<(), BackendError> {
        if self.verbose {
            println!("=== Inserting {} records into {} ===", records.len(), table);
            for record in &records {
                println!(
                    "Record: trace_id={} id={} name={} scope={} duration={}us attributes={}",
                    record.trace_id,
                    record.id,
                    record.name,
                    record.scope,
                    record.duration_micros(),
                    record.attributes
                );
            }
            println!("=== Insert complete ===\n");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

/// Appends records as JSON lines, one file per table under a directory.
///
/// The whole batch is encoded before anything is written, so an encoding
/// failure writes nothing.
pub struct JsonLinesBackend {
    dir: PathBuf,
}

impl JsonLinesBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file backing `table`
    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.jsonl"))
    }
}

impl StorageBackend for JsonLinesBackend {
    async fn batch_insert(&self, table: &str, records: Vec<StorageRecord>) -> Result<(), BackendError> {
        let mut buf = Vec::with_capacity(records.len() * 256);
        for record in &records {
            serde_json::to_writer(&mut buf, record)
                .map_err(|e| BackendError::Rejected(e.to_string()))?;
            buf.push(b'\n');
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.table_path(table))
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        file.write_all(&buf)
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(())
    }

    fn name(&self) -> &str {
        "json_lines"
    }
}

/// In-memory backend keeping every inserted batch, grouped by table.
///
/// Useful for local development and for asserting on exported records.
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<String, Vec<Vec<StorageRecord>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches inserted into `table`, in insertion order
    pub fn batches(&self, table: &str) -> Vec<Vec<StorageRecord>> {
        self.lock().get(table).cloned().unwrap_or_default()
    }

    /// All records inserted into `table`, flattened in insertion order
    pub fn records(&self, table: &str) -> Vec<StorageRecord> {
        self.lock()
            .get(table)
            .map(|batches| batches.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    pub fn record_count(&self, table: &str) -> usize {
        self.lock()
            .get(table)
            .map_or(0, |batches| batches.iter().map(Vec::len).sum())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Vec<StorageRecord>>>> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StorageBackend for MemoryBackend {
    async fn batch_insert(&self, table: &str, records: Vec<StorageRecord>) -> Result<(), BackendError> {
        self.lock().entry(table.to_string()).or_default().push(records);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
