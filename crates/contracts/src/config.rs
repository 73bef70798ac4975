//! Producer configuration contracts shared across crates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

use crate::ContractError;

/// Absolute payload bound a batch may never grow past (11 MiB)
pub const HARD_SIZE_CEILING_BYTES: u64 = 11 * 1024 * 1024;

/// Producer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProducerConfig {
    /// Soft batch size limit in bytes
    #[validate(range(min = 1))]
    pub max_batch_size_bytes: u64,

    /// Maximum entries per batch
    #[validate(range(min = 1))]
    pub max_batch_count: usize,

    /// Maximum time a batch stays open, milliseconds
    #[validate(range(min = 1))]
    pub linger_ms: u64,

    /// Retries allowed after the first failed attempt (0 = never retry)
    pub max_retry_count: u32,

    /// Delay schedule between retries
    #[validate(nested)]
    pub backoff: BackoffPolicy,

    /// Concurrent delivery workers
    #[validate(range(min = 1))]
    pub worker_pool_size: usize,

    /// Flushed-but-undelivered batches allowed to queue for the workers
    #[validate(range(min = 1))]
    pub task_queue_capacity: usize,

    /// Submissions allowed to queue for the dispatcher
    #[validate(range(min = 1))]
    pub submit_queue_capacity: usize,

    /// How long `submit` waits for queue room before reporting queue full
    pub submit_wait_ms: u64,

    /// Fixed safety ceiling, independent of the soft limit
    #[validate(range(min = 1, max = 11534336))]
    pub hard_size_ceiling_bytes: u64,

    /// Batch encoding handed to the transport
    pub format: BatchFormat,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            max_batch_size_bytes: 512 * 1024,
            max_batch_count: 4096,
            linger_ms: 2000,
            max_retry_count: 10,
            backoff: BackoffPolicy::default(),
            worker_pool_size: 16,
            task_queue_capacity: 64,
            submit_queue_capacity: 100,
            submit_wait_ms: 100,
            hard_size_ceiling_bytes: HARD_SIZE_CEILING_BYTES,
            format: BatchFormat::default(),
        }
    }
}

impl ProducerConfig {
    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }

    pub fn submit_wait(&self) -> Duration {
        Duration::from_millis(self.submit_wait_ms)
    }

    /// Field ranges plus cross-field rules
    ///
    /// # Errors
    /// Returns the first violated rule as `ContractError::ConfigValidation`
    pub fn check(&self) -> Result<(), ContractError> {
        self.validate()
            .map_err(|e| ContractError::config_validation("producer", e.to_string()))?;

        if self.hard_size_ceiling_bytes <= self.max_batch_size_bytes {
            return Err(ContractError::config_validation(
                "producer.hard_size_ceiling_bytes",
                format!(
                    "hard ceiling ({}) must be greater than max_batch_size_bytes ({})",
                    self.hard_size_ceiling_bytes, self.max_batch_size_bytes
                ),
            ));
        }

        if self.backoff.max_ms < self.backoff.initial_ms {
            return Err(ContractError::config_validation(
                "producer.backoff",
                format!(
                    "max_ms ({}) must be >= initial_ms ({})",
                    self.backoff.max_ms, self.backoff.initial_ms
                ),
            ));
        }

        Ok(())
    }
}

/// Exponential retry backoff
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first retry, milliseconds
    #[validate(range(min = 1))]
    pub initial_ms: u64,
    /// Upper bound for any single delay, milliseconds
    #[validate(range(min = 1))]
    pub max_ms: u64,
    /// Growth factor per attempt
    #[validate(range(min = 1.0))]
    pub multiplier: f64,
    /// Draw each delay uniformly from `[delay / 2, delay]`
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 100,
            max_ms: 50_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Un-jittered delay for a 1-based retry attempt
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let raw = self.initial_ms as f64 * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Wire encoding of a flushed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFormat {
    /// JSON (human-readable, larger)
    #[default]
    Json,
    /// Bincode (binary, compact)
    Bincode,
}

/// Transport selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Log batch summaries via tracing
    #[default]
    Log,
    /// Append payloads to files
    File,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Transport name (used for logging/metrics)
    #[serde(default = "default_transport_name")]
    pub name: String,

    #[serde(default)]
    pub kind: TransportKind,

    /// Transport specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            name: default_transport_name(),
            kind: TransportKind::default(),
            params: HashMap::new(),
        }
    }
}

fn default_transport_name() -> String {
    "default".to_string()
}

/// Complete shipper configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipperConfig {
    #[serde(default)]
    pub producer: ProducerConfig,

    #[serde(default)]
    pub transport: TransportConfig,
}
