//! Background refresh requests.
//!
//! Read paths never call the generator directly. They enqueue a
//! [`RefreshRequest`] here and return; a worker drains the queue. Requests
//! already waiting are not queued twice, and a pending full refresh covers
//! every single-subject request.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use solartales_core::Subject;
use tokio::sync::mpsc;

use crate::telemetry::metrics;

/// Work item for the refresh worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefreshRequest {
    /// Regenerate every configured subject.
    AllSubjects,
    /// Regenerate one subject.
    Subject(Subject),
}

impl RefreshRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            RefreshRequest::AllSubjects => "all_subjects",
            RefreshRequest::Subject(_) => "subject",
        }
    }
}

/// Counters for queue activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RefreshQueueStats {
    pub enqueued: u64,
    pub deduplicated: u64,
    pub completed: u64,
    pub pending: usize,
}

/// Sending half shared by handlers and the query surface.
#[derive(Debug)]
pub struct RefreshQueue {
    tx: mpsc::UnboundedSender<RefreshRequest>,
    pending: Mutex<HashSet<RefreshRequest>>,
    enqueued: AtomicU64,
    deduplicated: AtomicU64,
    completed: AtomicU64,
}

impl RefreshQueue {
    /// Create the queue and the receiver the worker drains.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RefreshRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            tx,
            pending: Mutex::new(HashSet::new()),
            enqueued: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        });
        (queue, rx)
    }

    fn pending_set(&self) -> MutexGuard<'_, HashSet<RefreshRequest>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue `request` unless an equivalent one is already waiting.
    ///
    /// Returns `true` when a new item was queued.
    pub fn enqueue(&self, request: RefreshRequest) -> bool {
        let kind = request.kind();
        let queued = {
            let mut pending = self.pending_set();
            let covered = pending.contains(&RefreshRequest::AllSubjects)
                || pending.contains(&request);
            if covered {
                false
            } else if self.tx.send(request.clone()).is_ok() {
                pending.insert(request);
                true
            } else {
                tracing::warn!(kind, "Refresh worker is gone, dropping request");
                false
            }
        };

        if queued {
            self.enqueued.fetch_add(1, Ordering::Relaxed);
        } else {
            self.deduplicated.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(metrics) = metrics() {
            metrics.record_refresh_request(kind, queued);
        }
        queued
    }

    /// Mark a request taken off the queue as handled.
    pub fn complete(&self, request: &RefreshRequest) {
        self.pending_set().remove(request);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_pending(&self, request: &RefreshRequest) -> bool {
        self.pending_set().contains(request)
    }

    /// Requests waiting for the worker.
    pub fn pending(&self) -> Vec<RefreshRequest> {
        self.pending_set().iter().cloned().collect()
    }

    pub fn stats(&self) -> RefreshQueueStats {
        RefreshQueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            pending: self.pending_set().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(s: &str) -> Subject {
        Subject::parse(s).unwrap()
    }

    #[test]
    fn test_duplicate_requests_are_collapsed() {
        let (queue, mut rx) = RefreshQueue::new();
        assert!(queue.enqueue(RefreshRequest::Subject(subject("pilot"))));
        assert!(!queue.enqueue(RefreshRequest::Subject(subject("pilot"))));
        assert!(queue.enqueue(RefreshRequest::Subject(subject("farmer"))));

        assert_eq!(rx.try_recv().unwrap(), RefreshRequest::Subject(subject("pilot")));
        assert_eq!(rx.try_recv().unwrap(), RefreshRequest::Subject(subject("farmer")));
        assert!(rx.try_recv().is_err());

        let stats = queue.stats();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.deduplicated, 1);
        assert_eq!(stats.pending, 2);
    }

    #[test]
    fn test_full_refresh_covers_single_subjects() {
        let (queue, _rx) = RefreshQueue::new();
        assert!(queue.enqueue(RefreshRequest::AllSubjects));
        assert!(!queue.enqueue(RefreshRequest::Subject(subject("pilot"))));
        assert!(queue.is_pending(&RefreshRequest::AllSubjects));
    }

    #[test]
    fn test_completed_request_can_be_queued_again() {
        let (queue, mut rx) = RefreshQueue::new();
        let request = RefreshRequest::Subject(subject("pilot"));
        queue.enqueue(request.clone());
        let taken = rx.try_recv().unwrap();
        queue.complete(&taken);

        assert!(!queue.is_pending(&request));
        assert!(queue.enqueue(request));
        assert_eq!(queue.stats().completed, 1);
    }

    #[test]
    fn test_closed_receiver_drops_requests() {
        let (queue, rx) = RefreshQueue::new();
        drop(rx);
        assert!(!queue.enqueue(RefreshRequest::AllSubjects));
        assert!(queue.pending().is_empty());
    }
}
