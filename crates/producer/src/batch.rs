//! Batch - ordered entries sharing one routing key
//!
//! A batch is owned by exactly one stage at a time: the dispatcher's live
//! map, the worker task queue, a worker, or the retry queue.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use contracts::{DeliveryReport, DeliveryStatus, LogEntry, RoutingKey};
use tokio::time::{Duration, Instant};
use tracing::error;

use crate::callback::Callback;

/// One submitted entry on its way to the dispatcher
pub struct Submission {
    pub key: RoutingKey,
    pub entry: LogEntry,
    pub callback: Option<Callback>,
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("key", &self.key)
            .field("size", &self.entry.size())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Unit of accumulation and delivery
pub struct Batch {
    key: RoutingKey,
    entries: Vec<LogEntry>,
    total_size: u64,
    created_at: Instant,
    attempts: u32,
    callbacks: Vec<Callback>,
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("key", &self.key)
            .field("entries", &self.entries.len())
            .field("total_size", &self.total_size)
            .field("attempts", &self.attempts)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl Batch {
    /// Create a batch seeded with its first entry
    pub fn new(key: RoutingKey, entry: LogEntry, callback: Option<Callback>) -> Self {
        let mut batch = Self {
            key,
            entries: Vec::new(),
            total_size: 0,
            created_at: Instant::now(),
            attempts: 0,
            callbacks: Vec::new(),
        };
        batch.append(entry, callback);
        batch
    }

    /// Append an entry and the submission's callback, if any
    pub fn append(&mut self, entry: LogEntry, callback: Option<Callback>) {
        self.total_size += entry.size();
        self.entries.push(entry);
        if let Some(callback) = callback {
            self.callbacks.push(callback);
        }
    }

    pub fn key(&self) -> &RoutingKey {
        &self.key
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of appended entry sizes
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time the batch has been open as of `now`
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Delivery attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Count one delivery attempt, returning the new total
    pub(crate) fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Consume the batch and notify every attached callback once
    ///
    /// A panicking callback is logged and does not stop the others.
    pub fn complete(self, status: DeliveryStatus) -> DeliveryReport {
        let report = DeliveryReport {
            status,
            attempts: self.attempts,
            entry_count: self.entries.len(),
            byte_size: self.total_size,
        };
        let mut panicked = 0usize;
        for callback in self.callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(&report))).is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            error!(key = %self.key, callbacks = panicked, "Delivery callback panicked");
        }
        report
    }
}
