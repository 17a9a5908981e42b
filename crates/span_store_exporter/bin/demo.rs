//! # Span Store Exporter Demo
//!
//! End-to-end run of the exporter against a deliberately unreliable backend.
//!
//! ## What It Shows
//!
//! - Several producer tasks exporting OTLP-shaped span batches concurrently,
//!   without ever waiting on storage
//! - A `StorageBackend` wrapper (`FlakyBackend`) adding latency and random
//!   failures on top of a real backend, written with native async fn in traits
//! - Occasional malformed spans (missing end time) failing only their batch
//! - Per-batch completion callbacks and a clean shutdown that attempts every
//!   accepted batch
//!
//! ## Running
//!
//! ```bash
//! # Quick mode (2 producers, 10 batches each)
//! cargo run -p span_store_exporter --bin demo -- --quick
//!
//! # Write records to ./spans/traces.jsonl instead of memory
//! cargo run -p span_store_exporter --bin demo -- --out ./spans
//!
//! # Exporter debug logs
//! RUST_LOG=span_store_exporter=debug cargo run -p span_store_exporter --bin demo -- --verbose
//! ```

use anyhow::Context;
use chrono::Utc;
use rand::Rng;
use span_store_exporter::{
    AnyValue, BackendError, ExporterConfig, JsonLinesBackend, MemoryBackend, RawSpan, ScopeSpans,
    SpanKind, SpanStatus, SpanStoreExporter, StorageBackend, StorageBackendBoxed, StorageRecord,
    TRACE_TABLE,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// =============================================================================
// SIMULATED BACKEND
// =============================================================================

/// Wraps a backend with simulated latency and a random failure rate.
struct FlakyBackend {
    inner: Arc<dyn StorageBackendBoxed>,
    failure_rate: f64,
    latency: Duration,
    attempts: AtomicU64,
    failures: AtomicU64,
}

impl FlakyBackend {
    fn new(inner: Arc<dyn StorageBackendBoxed>, failure_rate: f64, latency: Duration) -> Self {
        Self {
            inner,
            failure_rate,
            latency,
            attempts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    fn stats(&self) -> (u64, u64) {
        (
            self.attempts.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
        )
    }
}

impl StorageBackend for FlakyBackend {
    async fn batch_insert(&self, table: &str, records: Vec<StorageRecord>) -> Result<(), BackendError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;

        let fail = rand::thread_rng().gen_bool(self.failure_rate);
        if fail {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(BackendError::Transport(format!(
                "simulated connection reset ({} records)",
                records.len()
            )));
        }
        self.inner.batch_insert_boxed(table, records).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

// =============================================================================
// MAIN
// =============================================================================

#[derive(Default)]
struct ExportStats {
    batches_ok: AtomicU64,
    batches_failed: AtomicU64,
    transform_failures: AtomicU64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let verbose = args.contains(&"--verbose".to_string());
    let quick = args.contains(&"--quick".to_string());
    let out_dir = args
        .iter()
        .position(|a| a == "--out")
        .map(|i| args.get(i + 1).map(PathBuf::from).context("--out needs a directory"))
        .transpose()?;

    let (num_producers, batches_per_producer) = if quick { (2, 10) } else { (4, 50) };

    println!("Span Store Exporter Demo");
    println!("   Mode: {}", if quick { "quick" } else { "full" });
    println!("   Producers: {}", num_producers);
    println!("   Batches per producer: {}", batches_per_producer);
    println!(
        "   Storage: {}",
        out_dir.as_ref().map_or("memory".to_string(), |d| d.display().to_string())
    );
    println!();

    let memory = Arc::new(MemoryBackend::new());
    let storage: Arc<dyn StorageBackendBoxed> = match &out_dir {
        Some(dir) => Arc::new(JsonLinesBackend::new(dir)),
        None => memory.clone(),
    };
    let backend = Arc::new(FlakyBackend::new(storage, 0.1, Duration::from_millis(3)));

    let config = ExporterConfig::default().with_backend_timeout(Duration::from_secs(2));
    let exporter = SpanStoreExporter::new(backend.clone(), config)?;
    let stats = Arc::new(ExportStats::default());

    let start = Instant::now();
    let mut producers = Vec::new();
    for producer_id in 0..num_producers {
        let exporter = exporter.clone();
        let stats = Arc::clone(&stats);
        producers.push(tokio::spawn(async move {
            run_producer(producer_id, batches_per_producer, &exporter, &stats, verbose).await;
        }));
    }
    for producer in producers {
        producer.await?;
    }
    let generation_time = start.elapsed();
    println!("All producers finished in {:?} ({:?})", generation_time, exporter);

    exporter.shutdown().await;
    let total_time = start.elapsed();

    let (attempts, backend_failures) = backend.stats();
    let ok = stats.batches_ok.load(Ordering::Relaxed);
    let failed = stats.batches_failed.load(Ordering::Relaxed);

    println!();
    println!("Results");
    println!("   Total time:            {:>10.2?}", total_time);
    println!("   Batches exported:      {:>10}", ok + failed);
    println!("   Batches persisted:     {:>10}", ok);
    println!("   Batches dropped:       {:>10}", failed);
    println!(
        "     of which malformed:  {:>10}",
        stats.transform_failures.load(Ordering::Relaxed)
    );
    println!("   Backend calls:         {:>10}", attempts);
    println!("   Backend failures:      {:>10}", backend_failures);
    if out_dir.is_none() {
        println!("   Records stored:        {:>10}", memory.record_count(TRACE_TABLE));
    }

    Ok(())
}

// =============================================================================
// PRODUCERS
// =============================================================================

async fn run_producer(
    producer_id: usize,
    batches: usize,
    exporter: &SpanStoreExporter,
    stats: &Arc<ExportStats>,
    verbose: bool,
) {
    for seq in 0..batches {
        let batch = make_batch(&mut rand::thread_rng(), producer_id, seq);

        let stats = Arc::clone(stats);
        exporter.export(batch, move |result| match result {
            Ok(()) => {
                stats.batches_ok.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.batches_failed.fetch_add(1, Ordering::Relaxed);
                if e.is_transform() {
                    stats.transform_failures.fetch_add(1, Ordering::Relaxed);
                }
                if verbose {
                    eprintln!("   batch {producer_id}/{seq} dropped: {e}");
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    if verbose {
        println!("   Producer {producer_id} done");
    }
}

/// One trace worth of spans: a server root and a few children.
fn make_batch(rng: &mut impl Rng, producer_id: usize, seq: usize) -> Vec<ScopeSpans> {
    const OPERATIONS: [(&str, SpanKind); 4] = [
        ("db.query", SpanKind::Client),
        ("cache.get", SpanKind::Client),
        ("queue.publish", SpanKind::Producer),
        ("render", SpanKind::Internal),
    ];

    let trace_id = format!("{:032x}", rng.gen::<u128>());
    let root_id = format!("{:016x}", rng.gen::<u64>());
    let now = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;

    let root = RawSpan::new(&trace_id, &root_id, "GET /api/orders", now, now + 12_000_000)
        .with_kind(SpanKind::Server)
        .with_status(SpanStatus::ok())
        .with_attribute("service.name", AnyValue::from(format!("service-{}", producer_id % 2)))
        .with_attribute("http.status_code", AnyValue::from(200_i64))
        .with_attribute("batch.seq", AnyValue::from(seq as i64));

    let mut spans = vec![root];
    for _ in 0..rng.gen_range(1..=4) {
        let (operation, kind) = OPERATIONS[rng.gen_range(0..OPERATIONS.len())];
        let start = now + rng.gen_range(0..5_000_000);
        let mut child = RawSpan::new(
            &trace_id,
            format!("{:016x}", rng.gen::<u64>()),
            operation,
            start,
            start + rng.gen_range(100_000..5_000_000),
        )
        .with_parent(&root_id)
        .with_kind(kind)
        .with_attribute("cache.hit", AnyValue::from(rng.gen_bool(0.7)));

        if rng.gen_bool(0.05) {
            child = child.with_status(SpanStatus::error("simulated failure"));
        }
        // Instrumentation bug: span never ended
        if rng.gen_bool(0.01) {
            child.end_time_unix_nano = None;
        }
        spans.push(child);
    }

    vec![ScopeSpans::new("demo-instrumentation", spans)]
}
