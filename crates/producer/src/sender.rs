//! Sender - delivers one batch and classifies the outcome

use std::sync::Arc;

use bytes::Bytes;
use contracts::{
    BatchFormat, DeliveryError, DeliveryStatus, EncodedBatch, LogEntry, ProducerConfig,
    RoutingKey, Transport,
};
use serde::Serialize;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::backoff::Backoff;
use crate::batch::Batch;
use crate::metrics::ProducerMetrics;
use crate::retry_queue::RetryQueue;

/// What happened to a batch after one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Transport accepted the batch, callbacks notified
    Delivered,
    /// Transient failure, batch parked in the retry queue
    Requeued { attempts: u32, delay: Duration },
    /// Terminal failure, callbacks notified
    Failed(DeliveryError),
}

/// Wire shape of an encoded batch
#[derive(Serialize)]
struct LogGroup<'a> {
    topic: &'a str,
    source: &'a str,
    shard_hash: &'a str,
    file_name: &'a str,
    logs: &'a [LogEntry],
}

impl<'a> LogGroup<'a> {
    fn new(key: &'a RoutingKey, logs: &'a [LogEntry]) -> Self {
        Self {
            topic: &key.topic,
            source: &key.source,
            shard_hash: &key.shard_hash,
            file_name: &key.file_name,
            logs,
        }
    }
}

/// Encode the batch's entries into a transport payload
pub fn encode(format: BatchFormat, batch: &Batch) -> Result<Bytes, String> {
    let group = LogGroup::new(batch.key(), batch.entries());
    let payload = match format {
        BatchFormat::Json => serde_json::to_vec(&group).map_err(|e| e.to_string())?,
        BatchFormat::Bincode => bincode::serialize(&group).map_err(|e| e.to_string())?,
    };
    Ok(Bytes::from(payload))
}

/// Performs delivery through the shared transport
pub struct Sender<T> {
    transport: Arc<T>,
    retry_queue: Arc<RetryQueue>,
    backoff: Backoff,
    max_retry_count: u32,
    format: BatchFormat,
    metrics: Arc<ProducerMetrics>,
}

impl<T: Transport + Sync + 'static> Sender<T> {
    pub fn new(
        transport: T,
        retry_queue: Arc<RetryQueue>,
        config: &ProducerConfig,
        metrics: Arc<ProducerMetrics>,
    ) -> Self {
        Self {
            transport: Arc::new(transport),
            retry_queue,
            backoff: Backoff::new(config.backoff.clone()),
            max_retry_count: config.max_retry_count,
            format: config.format,
            metrics,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Attempt delivery of `batch` once
    ///
    /// Retryable failures are parked in the retry queue while attempts stay
    /// within `max_retry_count`; every other outcome is terminal and consumes
    /// the batch's callbacks.
    pub async fn send(&self, mut batch: Batch) -> SendOutcome {
        let payload = match encode(self.format, &batch) {
            Ok(payload) => payload,
            Err(reason) => {
                let error = DeliveryError::Fatal {
                    attempts: batch.attempts(),
                    reason: format!("encode failed: {reason}"),
                };
                return self.fail(batch, error);
            }
        };

        let encoded = EncodedBatch {
            key: batch.key().clone(),
            payload,
            entry_count: batch.len(),
            attempt: batch.attempts(),
        };
        let result = self.transport.deliver(&encoded).await;
        let attempts = batch.record_attempt();

        match result {
            Ok(()) => {
                debug!(
                    transport = self.transport.name(),
                    key = %batch.key(),
                    entries = batch.len(),
                    attempts,
                    "Batch delivered"
                );
                self.metrics.record_delivered(batch.len());
                self.finish(batch, DeliveryStatus::Delivered);
                SendOutcome::Delivered
            }
            Err(e) if e.is_retryable() && attempts <= self.max_retry_count => {
                let delay = self.backoff.delay(attempts);
                warn!(
                    transport = self.transport.name(),
                    key = %batch.key(),
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Delivery failed, retry scheduled"
                );
                self.metrics.inc_retries();
                observability::metrics::record_retry_scheduled(
                    self.transport.name(),
                    delay.as_millis() as u64,
                );
                self.retry_queue.push(batch, Instant::now() + delay);
                SendOutcome::Requeued { attempts, delay }
            }
            Err(e) if e.is_retryable() => {
                let error = DeliveryError::RetryExhausted {
                    attempts,
                    last_reason: e.reason().to_string(),
                };
                self.fail(batch, error)
            }
            Err(e) => {
                let error = DeliveryError::Fatal {
                    attempts,
                    reason: e.reason().to_string(),
                };
                self.fail(batch, error)
            }
        }
    }

    fn fail(&self, batch: Batch, error: DeliveryError) -> SendOutcome {
        error!(
            transport = self.transport.name(),
            key = %batch.key(),
            entries = batch.len(),
            error = %error,
            "Batch dropped"
        );
        self.metrics.record_failed(batch.len());
        self.finish(batch, DeliveryStatus::Failed(error.clone()));
        SendOutcome::Failed(error)
    }

    fn finish(&self, batch: Batch, status: DeliveryStatus) {
        let pending = self
            .metrics
            .release_pending(batch.total_size(), batch.len());
        observability::metrics::record_pending_bytes(pending);
        let report = batch.complete(status);
        observability::metrics::record_delivery(self.transport.name(), &report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback;
    use contracts::{BackoffPolicy, TransportError};
    use std::sync::Mutex;

    /// Transport replaying a scripted list of results
    struct ScriptedTransport {
        results: Mutex<Vec<Result<(), TransportError>>>,
        payloads: Mutex<Vec<EncodedBatch>>,
    }

    impl ScriptedTransport {
        fn new(mut results: Vec<Result<(), TransportError>>) -> Self {
            results.reverse();
            Self {
                results: Mutex::new(results),
                payloads: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn deliver(&self, batch: &EncodedBatch) -> Result<(), TransportError> {
            self.payloads.lock().unwrap().push(batch.clone());
            self.results.lock().unwrap().pop().unwrap_or(Ok(()))
        }
    }

    fn config(max_retry_count: u32) -> ProducerConfig {
        ProducerConfig {
            max_retry_count,
            backoff: BackoffPolicy {
                initial_ms: 10,
                max_ms: 100,
                multiplier: 2.0,
                jitter: false,
            },
            ..Default::default()
        }
    }

    fn sender(
        results: Vec<Result<(), TransportError>>,
        max_retry_count: u32,
    ) -> (Sender<ScriptedTransport>, Arc<RetryQueue>, Arc<ProducerMetrics>) {
        let retry_queue = Arc::new(RetryQueue::new());
        let metrics = Arc::new(ProducerMetrics::new());
        let sender = Sender::new(
            ScriptedTransport::new(results),
            Arc::clone(&retry_queue),
            &config(max_retry_count),
            Arc::clone(&metrics),
        );
        (sender, retry_queue, metrics)
    }

    fn batch_with_receipt() -> (Batch, tokio::sync::oneshot::Receiver<contracts::DeliveryReport>) {
        let (cb, rx) = callback::oneshot();
        let batch = Batch::new(
            RoutingKey::new("app").with_source("10.0.0.1"),
            LogEntry::message("hello"),
            Some(cb),
        );
        (batch, rx)
    }

    #[tokio::test]
    async fn test_success_notifies_callbacks() {
        let (sender, retry_queue, metrics) = sender(vec![Ok(())], 3);
        let (batch, rx) = batch_with_receipt();
        metrics.add_pending(batch.total_size());

        assert_eq!(sender.send(batch).await, SendOutcome::Delivered);

        let report = rx.await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.attempts, 1);
        assert!(retry_queue.is_empty());
        assert_eq!(metrics.pending_bytes(), 0);
    }

    #[tokio::test]
    async fn test_retryable_failure_is_requeued() {
        let (sender, retry_queue, metrics) =
            sender(vec![Err(TransportError::retryable("throttled"))], 3);
        let (batch, mut rx) = batch_with_receipt();

        let outcome = sender.send(batch).await;
        assert_eq!(
            outcome,
            SendOutcome::Requeued {
                attempts: 1,
                delay: Duration::from_millis(10)
            }
        );
        assert_eq!(retry_queue.len(), 1);
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.snapshot(0).retries, 1);

        let requeued = retry_queue.get_due(true).pop().unwrap();
        assert_eq!(requeued.attempts(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhaust_after_limit() {
        let results = (0..3)
            .map(|_| Err(TransportError::retryable("busy")))
            .collect();
        let (sender, retry_queue, _) = sender(results, 2);
        let (mut batch, rx) = batch_with_receipt();

        for expected in 1..=2 {
            match sender.send(batch).await {
                SendOutcome::Requeued { attempts, .. } => assert_eq!(attempts, expected),
                other => panic!("unexpected outcome: {other:?}"),
            }
            batch = retry_queue.get_due(true).pop().unwrap();
        }

        let outcome = sender.send(batch).await;
        let expected = DeliveryError::RetryExhausted {
            attempts: 3,
            last_reason: "busy".to_string(),
        };
        assert_eq!(outcome, SendOutcome::Failed(expected.clone()));
        assert_eq!(rx.await.unwrap().error(), Some(&expected));
        assert!(retry_queue.is_empty());
    }

    #[tokio::test]
    async fn test_zero_retry_limit_exhausts_immediately() {
        let (sender, retry_queue, _) = sender(vec![Err(TransportError::retryable("busy"))], 0);
        let (batch, rx) = batch_with_receipt();

        assert!(matches!(
            sender.send(batch).await,
            SendOutcome::Failed(DeliveryError::RetryExhausted { attempts: 1, .. })
        ));
        assert!(!rx.await.unwrap().is_success());
        assert!(retry_queue.is_empty());
    }

    #[tokio::test]
    async fn test_fatal_failure_skips_retry() {
        let (sender, retry_queue, metrics) =
            sender(vec![Err(TransportError::fatal("unauthorized"))], 5);
        let (batch, rx) = batch_with_receipt();

        let outcome = sender.send(batch).await;
        assert!(matches!(outcome, SendOutcome::Failed(DeliveryError::Fatal { attempts: 1, .. })));
        assert!(retry_queue.is_empty());
        assert!(!rx.await.unwrap().is_success());
        assert_eq!(metrics.snapshot(0).failed_batches, 1);
    }

    #[tokio::test]
    async fn test_payload_carries_attempt_and_entries() {
        let (sender, retry_queue, _) =
            sender(vec![Err(TransportError::retryable("busy")), Ok(())], 3);
        let (batch, _rx) = batch_with_receipt();

        sender.send(batch).await;
        let batch = retry_queue.get_due(true).pop().unwrap();
        sender.send(batch).await;

        let payloads = sender.transport().payloads.lock().unwrap();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].attempt, 0);
        assert_eq!(payloads[1].attempt, 1);
        assert_eq!(payloads[1].entry_count, 1);

        let json: serde_json::Value = serde_json::from_slice(&payloads[1].payload).unwrap();
        assert_eq!(json["topic"], "app");
        assert_eq!(json["source"], "10.0.0.1");
        assert_eq!(json["logs"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_bincode_encoding() {
        let batch = Batch::new(RoutingKey::new("t"), LogEntry::message("m"), None);
        let json = encode(BatchFormat::Json, &batch).unwrap();
        let bin = encode(BatchFormat::Bincode, &batch).unwrap();
        assert!(!bin.is_empty());
        assert_ne!(json, bin);
    }
}
