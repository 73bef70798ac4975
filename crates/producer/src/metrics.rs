//! Producer metrics for observability
//!
//! Every counter is an independent atomic; none of them is additionally
//! guarded by the dispatcher's map lock.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Process-wide producer counters
#[derive(Debug, Default)]
pub struct ProducerMetrics {
    /// Entries accepted by `submit`
    submitted: AtomicU64,
    /// Submissions rejected with queue full
    queue_full: AtomicU64,
    /// Bytes accepted but not yet terminal
    pending_bytes: AtomicU64,
    /// Entries accepted but not yet terminal
    pending_entries: AtomicU64,
    /// Batches currently open in the live map
    open_batches: AtomicUsize,
    /// Batches queued for or held by a worker
    in_flight: AtomicUsize,
    /// Batches flushed out of the live map
    batches_flushed: AtomicU64,
    /// Batches delivered
    delivered_batches: AtomicU64,
    /// Entries delivered
    delivered_entries: AtomicU64,
    /// Batches failed terminally
    failed_batches: AtomicU64,
    /// Entries failed terminally
    failed_entries: AtomicU64,
    /// Retries scheduled
    retries: AtomicU64,
}

impl ProducerMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_queue_full(&self) {
        self.queue_full.fetch_add(1, Ordering::Relaxed);
    }

    /// Account an entry handed to the dispatcher
    pub fn add_pending(&self, bytes: u64) -> u64 {
        self.pending_entries.fetch_add(1, Ordering::Relaxed);
        self.pending_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes
    }

    /// Release a terminal batch from the pending totals
    pub fn release_pending(&self, bytes: u64, entries: usize) -> u64 {
        saturating_sub(&self.pending_entries, entries as u64);
        saturating_sub(&self.pending_bytes, bytes)
    }

    /// Forget all pending totals (forced close)
    pub fn reset_pending(&self) {
        self.pending_bytes.store(0, Ordering::Relaxed);
        self.pending_entries.store(0, Ordering::Relaxed);
        self.open_batches.store(0, Ordering::Relaxed);
    }

    pub fn set_open_batches(&self, count: usize) {
        self.open_batches.store(count, Ordering::Relaxed);
    }

    pub fn inc_flushed(&self) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_in_flight(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub fn dec_in_flight(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn record_delivered(&self, entries: usize) {
        self.delivered_batches.fetch_add(1, Ordering::Relaxed);
        self.delivered_entries
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self, entries: usize) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.failed_entries
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pending_bytes(&self) -> u64 {
        self.pending_bytes.load(Ordering::Relaxed)
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self, retry_queue_len: usize) -> ProducerStatsSnapshot {
        ProducerStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            queue_full: self.queue_full.load(Ordering::Relaxed),
            pending_bytes: self.pending_bytes(),
            pending_entries: self.pending_entries.load(Ordering::Relaxed),
            open_batches: self.open_batches.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
            retry_queue_len,
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            delivered_batches: self.delivered_batches.load(Ordering::Relaxed),
            delivered_entries: self.delivered_entries.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            failed_entries: self.failed_entries.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Subtract without wrapping, returning the new value
fn saturating_sub(counter: &AtomicU64, amount: u64) -> u64 {
    let prev = counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(amount))
        })
        .unwrap_or_else(|v| v);
    prev.saturating_sub(amount)
}

/// Snapshot of producer metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStatsSnapshot {
    pub submitted: u64,
    pub queue_full: u64,
    pub pending_bytes: u64,
    pub pending_entries: u64,
    pub open_batches: usize,
    pub in_flight: usize,
    pub retry_queue_len: usize,
    pub batches_flushed: u64,
    pub delivered_batches: u64,
    pub delivered_entries: u64,
    pub failed_batches: u64,
    pub failed_entries: u64,
    pub retries: u64,
}
