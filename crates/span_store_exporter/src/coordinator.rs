//! Flush Coordinator
//!
//! Serializes persistence of queued batches: at most one flush is in flight
//! per exporter, and each flush handles exactly one queued batch as one
//! backend call.
//!
//! # State Machine
//!
//! ```text
//!            export() with no active flush
//!  ┌──────┐ ─────────────────────────────► ┌──────────┐
//!  │ Idle │                                │ Flushing │
//!  └──────┘ ◄───────────────────────────── └──────────┘
//!            backend call settles (ok / err / timeout)
//! ```
//!
//! Settling does not chain into the next entry. Only `export` starts a
//! background flush, and `flush`/`force_flush` drive the rest.
//!
//! # Flush Token
//!
//! The queue and the token live in one mutex-guarded [`CoordinatorState`],
//! so checking for an active flush, popping the front entry and taking the
//! token happen in one critical section. The token itself is the sending
//! half of a `watch` channel held by a [`FlushToken`] guard; dropping the
//! guard (success, failure, panic or a dropped future) clears the state and
//! wakes every waiter. The lock is never held across an `.await`.
//!
//! # Dropped Flushes
//!
//! An entry popped for a flush that never starts (its task was dropped
//! before the first poll, e.g. spawned on a runtime that has shut down)
//! goes back to the front of the queue. A flush dropped after it started
//! fails its entry with [`FlushFailure::Cancelled`]. Either way no callback
//! is lost.

use crate::backend::StorageBackendBoxed;
use crate::config::ExporterConfig;
use crate::error::{BackendError, FlushError, FlushFailure, SpanSummary};
use crate::logger::{ExportLogger, LoggerSlot};
use crate::queue::{ExportCallback, ExportQueue, ExportResult, QueueEntry};
use crate::span::ScopeSpans;
use crate::transform::{span_count, transform_batch};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// Shared mutable state: the pending queue and the flush token.
#[derive(Default)]
struct CoordinatorState {
    queue: ExportQueue,
    /// Present while a flush is in flight; waiters clone it
    active: Option<watch::Receiver<()>>,
}

/// Ownership of the flush token. Releases it on drop.
pub(crate) struct FlushToken {
    state: Arc<Mutex<CoordinatorState>>,
    _done: watch::Sender<()>,
}

impl Drop for FlushToken {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        debug_assert!(state.active.is_some(), "flush token released twice");
        state.active = None;
        // `_done` drops after this, waking waiters with the state already idle
    }
}

/// A dequeued entry together with the token that authorizes flushing it.
///
/// Dropped before [`FlushCoordinator::run`] takes the entry, it requeues the
/// entry at the front, then releases the token.
pub(crate) struct PendingFlush {
    entry: Option<QueueEntry>,
    token: FlushToken,
}

impl Drop for PendingFlush {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            // No flush ran since the pop, so the front is still its place
            lock(&self.token.state).queue.push_front(entry);
        }
    }
}

/// Callback of a flush that has started. Fires with the prepared
/// cancellation error if dropped before the flush settles.
struct InFlight {
    callback: Option<ExportCallback>,
    cancelled: FlushError,
    logger: Arc<dyn ExportLogger>,
}

impl InFlight {
    fn complete(mut self, result: ExportResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            self.logger
                .error(&format!("span export cancelled: {}", self.cancelled));
            self.logger.track_exception(&self.cancelled);
            callback(Err(self.cancelled.clone()));
        }
    }
}

enum Step {
    Run(PendingFlush),
    Wait(watch::Receiver<()>),
    Idle,
}

pub(crate) struct FlushCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
    backend: Arc<dyn StorageBackendBoxed>,
    logger: LoggerSlot,
    table: String,
    backend_timeout: Option<Duration>,
}

impl FlushCoordinator {
    pub(crate) fn new(backend: Arc<dyn StorageBackendBoxed>, config: ExporterConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CoordinatorState::default())),
            backend,
            logger: LoggerSlot::default(),
            table: config.table_name,
            backend_timeout: config.backend_timeout,
        }
    }

    pub(crate) fn set_logger(&self, logger: Arc<dyn ExportLogger>) {
        self.logger.set(logger);
    }

    /// Appends an entry. If no flush is active, takes the token and the
    /// front entry in the same critical section and hands them back; the
    /// caller must run the returned flush.
    #[must_use]
    pub(crate) fn enqueue(&self, entry: QueueEntry) -> Option<PendingFlush> {
        let mut state = lock(&self.state);
        state.queue.push(entry);
        if state.active.is_some() {
            return None;
        }
        self.begin(&mut state)
    }

    /// Flushes the oldest queued entry.
    ///
    /// Returns `Ok(())` immediately when the queue is empty. If another
    /// flush holds the token, waits for it to settle first.
    pub(crate) async fn flush(&self) -> ExportResult {
        loop {
            let step = {
                let mut state = lock(&self.state);
                if state.queue.is_empty() {
                    Step::Idle
                } else {
                    self.next_step(&mut state)
                }
            };

            match step {
                Step::Run(pending) => return self.run(pending).await,
                Step::Wait(rx) => wait_settled(rx).await,
                Step::Idle => return Ok(()),
            }
        }
    }

    /// Drains the queue one entry at a time.
    ///
    /// Waits for any in-flight flush, including one whose entry already
    /// left the queue, so every batch accepted before the call has had its
    /// callback fired when this returns. Exports arriving meanwhile are
    /// drained too; under sustained load this keeps running.
    pub(crate) async fn force_flush(&self) {
        loop {
            let step = {
                let mut state = lock(&self.state);
                self.next_step(&mut state)
            };

            match step {
                // Failures were already reported to the logger and callback
                Step::Run(pending) => {
                    let _ = self.run(pending).await;
                }
                Step::Wait(rx) => wait_settled(rx).await,
                Step::Idle => return,
            }
        }
    }

    /// Persists one dequeued entry, fires its callback, then releases the token.
    ///
    /// Dropping the returned future mid-flush fails the entry with
    /// [`FlushFailure::Cancelled`].
    pub(crate) async fn run(&self, mut pending: PendingFlush) -> ExportResult {
        let Some(entry) = pending.entry.take() else {
            return Ok(());
        };
        let (batch, callback) = entry.into_parts();
        let logger = self.logger.get();
        // Dropped before `pending`, so the callback fires before the token goes
        let in_flight = InFlight {
            callback: Some(callback),
            cancelled: self.flush_error(&batch, FlushFailure::Cancelled),
            logger: Arc::clone(&logger),
        };

        logger.debug(&format!(
            "flushing {} spans to `{}` via {}",
            span_count(&batch),
            self.table,
            self.backend.name()
        ));

        let result = match self.persist(&batch).await {
            Ok(count) => {
                logger.debug(&format!("flushed {count} span records to `{}`", self.table));
                Ok(())
            }
            Err(err) => {
                logger.error(&format!("span export failed: {err}: {}", err.source));
                logger.track_exception(&err);
                Err(err)
            }
        };

        in_flight.complete(result.clone());
        drop(pending);
        result
    }

    /// Number of entries waiting in the queue
    pub(crate) fn pending_entries(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Returns `true` while a flush holds the token
    pub(crate) fn is_flushing(&self) -> bool {
        lock(&self.state).active.is_some()
    }

    fn next_step(&self, state: &mut CoordinatorState) -> Step {
        if let Some(active) = &state.active {
            return Step::Wait(active.clone());
        }
        match self.begin(state) {
            Some(pending) => Step::Run(pending),
            None => Step::Idle,
        }
    }

    /// Takes the token and the front entry. Caller holds the lock and has
    /// checked that no flush is active.
    fn begin(&self, state: &mut CoordinatorState) -> Option<PendingFlush> {
        debug_assert!(
            state.active.is_none(),
            "flush started while another flush is in flight"
        );
        let entry = state.queue.pop_front()?;
        let (done, rx) = watch::channel(());
        state.active = Some(rx);
        Some(PendingFlush {
            entry: Some(entry),
            token: FlushToken {
                state: Arc::clone(&self.state),
                _done: done,
            },
        })
    }

    async fn persist(&self, batch: &[ScopeSpans]) -> Result<usize, FlushError> {
        // Stamped at flush time, not export time
        let created_at = Utc::now();
        let records =
            transform_batch(batch, created_at).map_err(|e| self.flush_error(batch, e.into()))?;
        let count = records.len();

        let insert = self.backend.batch_insert_boxed(&self.table, records);
        let outcome = match self.backend_timeout {
            Some(limit) => tokio::time::timeout(limit, insert)
                .await
                .unwrap_or(Err(BackendError::Timeout(limit))),
            None => insert.await,
        };

        outcome
            .map(|()| count)
            .map_err(|e| self.flush_error(batch, e.into()))
    }

    fn flush_error(&self, batch: &[ScopeSpans], source: FlushFailure) -> FlushError {
        let first_span = batch.iter().find_map(|group| {
            group.spans.first().map(|span| SpanSummary {
                name: span.name.clone(),
                kind: span.kind.to_string(),
                scope: group.scope.clone(),
            })
        });

        FlushError {
            record_count: span_count(batch),
            table: self.table.clone(),
            first_span,
            source,
        }
    }
}

fn lock(state: &Mutex<CoordinatorState>) -> MutexGuard<'_, CoordinatorState> {
    // Every mutation is a single push/pop/assign, so a panicking holder
    // cannot leave the state half-updated.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves once the flush owning the token has settled.
async fn wait_settled(mut rx: watch::Receiver<()>) {
    // The sender is never used to publish; `changed` resolves with an error
    // once the token guard drops it.
    let _ = rx.changed().await;
}
