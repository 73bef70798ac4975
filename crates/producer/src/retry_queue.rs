//! RetryQueue - batches waiting out their backoff
//!
//! Min-heap on next-eligible time. Inserts come from any worker, drains come
//! from the linger loop and from graceful close; both go through one mutex so
//! an entry is handed out exactly once.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::batch::Batch;

struct RetryEntry {
    ready_at: Instant,
    /// Insertion order, keeps equal deadlines FIFO
    seq: u64,
    batch: Batch,
}

impl Eq for RetryEntry {}

impl PartialEq for RetryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl Ord for RetryEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse for min-heap behavior
        other
            .ready_at
            .cmp(&self.ready_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for RetryEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<RetryEntry>,
    next_seq: u64,
}

/// Delayed requeue structure for transiently failed batches
#[derive(Default)]
pub struct RetryQueue {
    inner: Mutex<Inner>,
    pushed: Notify,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a batch that becomes eligible at `ready_at`
    pub fn push(&self, batch: Batch, ready_at: Instant) {
        {
            let mut inner = self.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            debug!(key = %batch.key(), attempts = batch.attempts(), "Batch queued for retry");
            inner.heap.push(RetryEntry {
                ready_at,
                seq,
                batch,
            });
        }
        self.pushed.notify_waiters();
    }

    /// Remove and return every batch due now, or all of them when `force_all`
    pub fn get_due(&self, force_all: bool) -> Vec<Batch> {
        self.get_due_at(Instant::now(), force_all)
    }

    /// Remove and return every batch due at `now`, or all when `force_all`
    pub fn get_due_at(&self, now: Instant, force_all: bool) -> Vec<Batch> {
        let mut inner = self.lock();
        if force_all {
            return std::mem::take(&mut inner.heap)
                .into_sorted_vec()
                .into_iter()
                .rev()
                .map(|entry| entry.batch)
                .collect();
        }

        let mut due = Vec::new();
        while inner.heap.peek().is_some_and(|entry| entry.ready_at <= now) {
            if let Some(entry) = inner.heap.pop() {
                due.push(entry.batch);
            }
        }
        due
    }

    /// Earliest eligibility time among queued batches
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.lock().heap.peek().map(|entry| entry.ready_at)
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Drop every queued batch without notifying callbacks
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.heap.len();
        inner.heap.clear();
        dropped
    }

    /// Resolves on the next `push`; create it before inspecting the queue
    pub fn pushed(&self) -> tokio::sync::futures::Notified<'_> {
        self.pushed.notified()
    }
}
