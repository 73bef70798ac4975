//! Shipper - feeds input lines into the producer and closes it.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use contracts::{LogEntry, RoutingKey, ShipperConfig};
use observability::DeliveryMetricsAggregator;
use producer::{callback, Producer, ProducerError, ProducerHandle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use super::ShipStats;
use crate::error::{CliError, Result};

/// Back-off between submit attempts while the producer reports queue full
const QUEUE_FULL_PAUSE: Duration = Duration::from_millis(10);

/// Shipper configuration
#[derive(Debug, Clone)]
pub struct ShipperOptions {
    pub config: ShipperConfig,

    /// Input path (None = stdin)
    pub input: Option<PathBuf>,

    /// Routing key attached to every entry
    pub key: RoutingKey,

    /// Maximum number of entries to ship (None = unlimited)
    pub max_entries: Option<u64>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Reads lines, ships them, reports what happened
pub struct Shipper {
    options: ShipperOptions,
}

impl Shipper {
    pub fn new(options: ShipperOptions) -> Self {
        Self { options }
    }

    /// Ship the whole input
    ///
    /// `stop` ends reading early; the producer is then closed gracefully
    /// unless the future returned by `abort` resolves first.
    pub async fn run<S, A, F>(self, stop: S, abort: A) -> Result<ShipStats>
    where
        S: Future<Output = ()>,
        A: FnOnce() -> F,
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let options = self.options;

        if let Some(port) = options.metrics_port {
            if let Err(e) = observability::init_metrics_only(port) {
                warn!(error = %e, "Metrics endpoint unavailable");
            }
        }

        let transport =
            producer::create_transport(&options.config.transport, options.config.producer.format)?;
        let producer = Producer::start(options.config.producer.clone(), transport)?;
        let handle = producer.handle();
        let aggregator = Arc::new(Mutex::new(DeliveryMetricsAggregator::new()));

        let input_name = options
            .input
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdin".to_string());
        let reader = open_input(options.input.as_ref()).await?;
        let mut lines = reader.lines();

        let mut stats = ShipStats::default();
        tokio::pin!(stop);

        loop {
            if options
                .max_entries
                .is_some_and(|max| stats.entries_submitted >= max)
            {
                info!(max = stats.entries_submitted, "Entry limit reached");
                break;
            }

            let line = tokio::select! {
                biased;
                () = &mut stop => {
                    warn!("Stop requested, no longer reading input");
                    stats.interrupted = true;
                    break;
                }
                line = lines.next_line() => line
                    .map_err(|e| CliError::input(&input_name, e.to_string()))?,
            };
            let Some(line) = line else {
                break;
            };
            stats.lines_read += 1;
            if line.trim().is_empty() {
                continue;
            }

            let entry = LogEntry::message(line);
            match submit(&handle, &options.key, entry, &aggregator, &mut stats).await {
                Ok(()) => stats.entries_submitted += 1,
                Err(ProducerError::EntryTooLarge { size, max }) => {
                    warn!(size, max, line = stats.lines_read, "Entry rejected, too large");
                    stats.entries_rejected += 1;
                }
                Err(e) => return Err(e.into()),
            }

            if stats.entries_submitted.is_multiple_of(1000) && stats.entries_submitted > 0 {
                debug!(entries = stats.entries_submitted, "Shipping progress");
            }
        }

        info!(
            entries = stats.entries_submitted,
            "Input finished, closing producer"
        );
        stats.producer = producer.close_or_force(abort()).await;
        stats.delivery = aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        stats.duration = start_time.elapsed();

        Ok(stats)
    }
}

/// Submit one entry, pausing while the producer pushes back
async fn submit(
    handle: &ProducerHandle,
    key: &RoutingKey,
    entry: LogEntry,
    aggregator: &Arc<Mutex<DeliveryMetricsAggregator>>,
    stats: &mut ShipStats,
) -> std::result::Result<(), ProducerError> {
    loop {
        let aggregator = Arc::clone(aggregator);
        let on_complete = callback::from_fn(move |report| {
            aggregator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .update(report);
        });

        match handle
            .submit(key.clone(), entry.clone(), Some(on_complete))
            .await
        {
            Err(ProducerError::QueueFull) => {
                stats.queue_full_waits += 1;
                sleep(QUEUE_FULL_PAUSE).await;
            }
            other => return other,
        }
    }
}

async fn open_input(path: Option<&PathBuf>) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match path {
        Some(path) if path.as_os_str() != "-" => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| CliError::input(path.display().to_string(), e.to_string()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}
