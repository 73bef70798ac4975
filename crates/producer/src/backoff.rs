//! Retry delay schedule with optional jitter.

use std::time::Duration;

use contracts::BackoffPolicy;
use rand::Rng;

/// Produces the delay before retry attempt `n`
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }

    /// Delay for a 1-based retry attempt
    ///
    /// With jitter the delay is drawn from `[base / 2, base]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.policy.base_delay(attempt);
        if !self.policy.jitter {
            return base;
        }

        let max_ms = base.as_millis().min(u128::from(u64::MAX)) as u64;
        let min_ms = max_ms / 2;
        if max_ms == min_ms {
            return base;
        }
        Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
    }
}
