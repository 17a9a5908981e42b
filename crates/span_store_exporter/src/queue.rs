//! Export Queue - Pure FIFO of Pending Batches
//!
//! Like any state guarded by the coordinator, this type carries no locks or
//! atomics of its own. The [`FlushCoordinator`](crate::coordinator::FlushCoordinator)
//! owns it behind a mutex together with the flush token, so the
//! "is a flush running?" check and the pop happen in one critical section.
//!
//! Entries are never reordered, merged or dropped. They leave through
//! [`ExportQueue::pop_front`] for a flush; a flush that never started puts
//! its entry back with [`ExportQueue::push_front`].

use crate::error::FlushError;
use crate::span::ScopeSpans;
use crate::transform::span_count;
use std::collections::VecDeque;
use std::fmt;

/// Outcome delivered to an export's completion callback.
pub type ExportResult = Result<(), FlushError>;

/// Completion callback supplied with each exported batch.
///
/// Invoked exactly once, from the flush task that processed the batch.
pub type ExportCallback = Box<dyn FnOnce(ExportResult) + Send + 'static>;

/// One submitted batch and the callback awaiting its outcome.
pub(crate) struct QueueEntry {
    batch: Vec<ScopeSpans>,
    callback: ExportCallback,
}

impl QueueEntry {
    pub(crate) fn new(batch: Vec<ScopeSpans>, callback: ExportCallback) -> Self {
        Self { batch, callback }
    }

    /// Splits the entry into its batch and callback.
    pub(crate) fn into_parts(self) -> (Vec<ScopeSpans>, ExportCallback) {
        (self.batch, self.callback)
    }
}

impl fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEntry")
            .field("scope_groups", &self.batch.len())
            .field("spans", &span_count(&self.batch))
            .finish_non_exhaustive()
    }
}

/// FIFO of batches waiting to be flushed. Insertion order is flush order.
#[derive(Debug, Default)]
pub(crate) struct ExportQueue {
    entries: VecDeque<QueueEntry>,
}

impl ExportQueue {
    /// Appends an entry at the back
    pub(crate) fn push(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    /// Returns an entry taken by `pop_front` to its place
    pub(crate) fn push_front(&mut self, entry: QueueEntry) {
        self.entries.push_front(entry);
    }

    /// Removes the oldest entry
    pub(crate) fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::RawSpan;
    use std::sync::{Arc, Mutex};

    fn entry(tag: &str, seen: &Arc<Mutex<Vec<String>>>) -> QueueEntry {
        let spans = vec![RawSpan::new("t", format!("{tag}-0"), tag, 0, 0)];
        let seen = Arc::clone(seen);
        let tag = tag.to_string();
        QueueEntry::new(
            vec![ScopeSpans::new("scope", spans)],
            Box::new(move |_| seen.lock().unwrap().push(tag)),
        )
    }

    fn drain_names(queue: &mut ExportQueue) -> Vec<String> {
        std::iter::from_fn(|| queue.pop_front())
            .map(|entry| entry.into_parts().0[0].spans[0].name.clone())
            .collect()
    }

    #[test]
    fn test_fifo_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut queue = ExportQueue::default();
        assert!(queue.pop_front().is_none());

        for tag in ["b1", "b2", "b3"] {
            queue.push(entry(tag, &seen));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(drain_names(&mut queue), vec!["b1", "b2", "b3"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_front_restores_position() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut queue = ExportQueue::default();
        for tag in ["b1", "b2"] {
            queue.push(entry(tag, &seen));
        }

        let first = queue.pop_front().unwrap();
        queue.push(entry("b3", &seen));
        queue.push_front(first);

        assert_eq!(drain_names(&mut queue), vec!["b1", "b2", "b3"]);
    }

    #[test]
    fn test_into_parts_keeps_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (batch, callback) = entry("x", &seen).into_parts();

        assert_eq!(span_count(&batch), 1);
        callback(Ok(()));

        assert_eq!(*seen.lock().unwrap(), vec!["x".to_string()]);
    }
}
