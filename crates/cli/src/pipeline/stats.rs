//! Shipping statistics.

use std::time::Duration;

use observability::DeliveryMetricsAggregator;
use producer::ProducerStatsSnapshot;

/// Statistics from a shipping run
#[derive(Debug, Clone, Default)]
pub struct ShipStats {
    /// Lines read from the input
    pub lines_read: u64,

    /// Entries accepted by the producer
    pub entries_submitted: u64,

    /// Entries rejected for exceeding the hard ceiling
    pub entries_rejected: u64,

    /// Submit attempts that hit a full queue and waited
    pub queue_full_waits: u64,

    /// Reading stopped by a signal before the input ended
    pub interrupted: bool,

    /// Total duration of the run
    pub duration: Duration,

    /// Producer counters at close
    pub producer: ProducerStatsSnapshot,

    /// Terminal outcomes observed through callbacks
    pub delivery: DeliveryMetricsAggregator,
}

impl ShipStats {
    /// Accepted entries per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.entries_submitted as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Entries accepted but never reported, abandoned by a forced close
    pub fn abandoned(&self) -> u64 {
        self.entries_submitted
            .saturating_sub(self.producer.delivered_entries + self.producer.failed_entries)
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                     Shipping Statistics                      ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Lines read: {}", self.lines_read);
        println!("   ├─ Entries submitted: {}", self.entries_submitted);
        println!("   ├─ Entries rejected: {}", self.entries_rejected);
        println!("   ├─ Queue-full waits: {}", self.queue_full_waits);
        println!("   ├─ Throughput: {:.2} entries/s", self.throughput());
        println!("   └─ Interrupted: {}", self.interrupted);

        let p = &self.producer;
        println!("\n📦 Producer");
        println!("   ├─ Batches flushed: {}", p.batches_flushed);
        println!(
            "   ├─ Delivered: {} batches / {} entries",
            p.delivered_batches, p.delivered_entries
        );
        println!(
            "   ├─ Failed: {} batches / {} entries",
            p.failed_batches, p.failed_entries
        );
        println!("   ├─ Retries scheduled: {}", p.retries);
        println!("   └─ Abandoned entries: {}", self.abandoned());

        println!("\n{}", self.delivery.summary());
    }
}
