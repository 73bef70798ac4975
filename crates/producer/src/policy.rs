//! Flush policy - decides what an incoming entry does to its open batch

use contracts::ProducerConfig;

use crate::batch::Batch;

/// Outcome of routing one entry into an existing batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Append, keep the batch open
    AddAndHold,
    /// Append, then flush the batch immediately
    AddThenFlush,
    /// Flush the batch unchanged, seed a new batch with the entry
    FlushThenCreate,
}

/// Why a batch left the live map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Soft size limit crossed by an append
    Size,
    /// Hard ceiling or count limit would be breached
    Full,
    /// Open longer than the linger duration
    Linger,
    /// Graceful close
    Shutdown,
}

impl FlushReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Full => "full",
            Self::Linger => "linger",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Size and count thresholds used by [`decide`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushLimits {
    pub soft_size_bytes: u64,
    pub hard_size_bytes: u64,
    pub max_count: usize,
}

impl From<&ProducerConfig> for FlushLimits {
    fn from(config: &ProducerConfig) -> Self {
        Self {
            soft_size_bytes: config.max_batch_size_bytes,
            hard_size_bytes: config.hard_size_ceiling_bytes,
            max_count: config.max_batch_count,
        }
    }
}

/// Decide how `incoming_size` bytes join `batch`
///
/// Thresholds are evaluated against the size the batch would have after the
/// append. Crossing the soft limit while staying under the hard ceiling
/// appends then flushes, so an entry is never split off a batch it fits in.
pub fn decide(batch: &Batch, incoming_size: u64, limits: &FlushLimits) -> FlushDecision {
    let prospective_size = batch.total_size() + incoming_size;
    let prospective_count = batch.len() + 1;
    let count_fits = prospective_count <= limits.max_count;

    if prospective_size > limits.soft_size_bytes
        && prospective_size < limits.hard_size_bytes
        && count_fits
    {
        FlushDecision::AddThenFlush
    } else if prospective_size <= limits.soft_size_bytes && count_fits {
        FlushDecision::AddAndHold
    } else {
        FlushDecision::FlushThenCreate
    }
}
