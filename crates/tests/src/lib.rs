//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 配置 -> Transport -> Producer 的 e2e 测试
//! - 重试、关闭与背压行为

#[cfg(test)]
mod contract_tests {
    use contracts::{LogEntry, ProducerConfig, RoutingKey, HARD_SIZE_CEILING_BYTES};

    #[test]
    fn test_default_config_is_valid() {
        let config = ProducerConfig::default();
        assert!(config.check().is_ok());
        assert_eq!(config.hard_size_ceiling_bytes, HARD_SIZE_CEILING_BYTES);
    }

    #[test]
    fn test_entry_size_model() {
        let entry = LogEntry::message("hello").with_content("level", "info");
        assert_eq!(entry.size(), 8 + 7 + 5 + 5 + 4);
    }

    #[test]
    fn test_routing_key_equality_covers_all_fields() {
        let a = RoutingKey::new("app").with_source("10.0.0.1");
        let b = RoutingKey::new("app").with_source("10.0.0.2");
        assert_ne!(a, b);
        assert_eq!(a, RoutingKey::new("app").with_source("10.0.0.1"));
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use contracts::{
        BackoffPolicy, DeliveryError, EncodedBatch, LogEntry, ProducerConfig, RoutingKey,
        Transport, TransportError,
    };
    use producer::{callback, create_transport, Producer, ProducerError};

    /// Scripted delivery outcomes, one per call; succeeds once the script runs out
    struct ScriptedTransport {
        script: Mutex<Vec<Result<(), TransportError>>>,
        calls: AtomicU32,
        delivered: Arc<Mutex<Vec<EncodedBatch>>>,
    }

    impl ScriptedTransport {
        fn new(mut script: Vec<Result<(), TransportError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
                delivered: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn always(outcome: Result<(), TransportError>, times: usize) -> Self {
            Self::new(vec![outcome; times])
        }
    }

    impl Transport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn deliver(&self, batch: &EncodedBatch) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self.script.lock().unwrap().pop().unwrap_or(Ok(()));
            if outcome.is_ok() {
                self.delivered.lock().unwrap().push(batch.clone());
            }
            outcome
        }
    }

    /// Never completes a delivery
    struct StuckTransport;

    impl Transport for StuckTransport {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn deliver(&self, _batch: &EncodedBatch) -> Result<(), TransportError> {
            std::future::pending().await
        }
    }

    fn fast_retry_config() -> ProducerConfig {
        ProducerConfig {
            linger_ms: 20,
            max_retry_count: 3,
            backoff: BackoffPolicy {
                initial_ms: 5,
                max_ms: 20,
                multiplier: 2.0,
                jitter: false,
            },
            ..Default::default()
        }
    }

    fn messages(payload: &[u8]) -> Vec<String> {
        let group: serde_json::Value = serde_json::from_slice(payload).unwrap();
        group["logs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|log| log["contents"][0]["value"].as_str().unwrap().to_string())
            .collect()
    }

    /// End-to-end test: TOML config -> create_transport -> Producer -> files
    #[tokio::test]
    async fn test_config_to_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            r#"
[producer]
linger_ms = 5000
max_batch_count = 10
worker_pool_size = 2

[transport]
name = "archive"
kind = "file"

[transport.params]
base_path = "{}"
"#,
            dir.path().display()
        );
        let config = config_loader::ConfigLoader::load_from_str(
            &toml,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let transport = create_transport(&config.transport, config.producer.format).unwrap();
        let producer = Producer::start(config.producer.clone(), transport).unwrap();

        for i in 0..25 {
            producer
                .submit(
                    RoutingKey::new("app"),
                    LogEntry::message(format!("app-{i}")),
                    None,
                )
                .await
                .unwrap();
        }
        for i in 0..3 {
            producer
                .submit(
                    RoutingKey::new("audit"),
                    LogEntry::message(format!("audit-{i}")),
                    None,
                )
                .await
                .unwrap();
        }

        let stats = producer.close().await;
        assert_eq!(stats.delivered_entries, 28);
        assert_eq!(stats.pending_bytes, 0);

        let app = std::fs::read_to_string(dir.path().join("app.log")).unwrap();
        let app_lines: Vec<_> = app.lines().collect();
        // 25 entries with a count limit of 10
        assert_eq!(app_lines.len(), 3);
        let shipped: Vec<String> = app_lines
            .iter()
            .flat_map(|line| messages(line.as_bytes()))
            .collect();
        let mut sorted = shipped.clone();
        sorted.sort();
        let mut expected: Vec<String> = (0..25).map(|i| format!("app-{i}")).collect();
        expected.sort();
        assert_eq!(sorted, expected);

        let audit = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        assert_eq!(audit.lines().count(), 1);
        assert_eq!(messages(audit.lines().next().unwrap().as_bytes()).len(), 3);
    }

    #[tokio::test]
    async fn test_entries_keep_submission_order_within_batch() {
        let transport = ScriptedTransport::new(Vec::new());
        let delivered = Arc::clone(&transport.delivered);
        let config = ProducerConfig {
            linger_ms: 60_000,
            ..Default::default()
        };
        let producer = Producer::start(config, transport).unwrap();

        for i in 0..50 {
            producer
                .submit(RoutingKey::new("app"), LogEntry::message(format!("{i}")), None)
                .await
                .unwrap();
        }
        producer.close().await;

        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(messages(&delivered[0].payload), expected);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::retryable("throttled")),
            Err(TransportError::retryable("throttled")),
        ]);
        let producer = Producer::start(fast_retry_config(), transport).unwrap();

        let receipt = producer
            .submit_with_receipt(RoutingKey::new("app"), LogEntry::message("eventually"))
            .await
            .unwrap();

        // delivered by the linger loop, before close begins
        let report = tokio::time::timeout(std::time::Duration::from_secs(5), receipt)
            .await
            .unwrap()
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.attempts, 3);

        let stats = producer.close().await;
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.delivered_entries, 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_reports_last_reason() {
        let transport =
            ScriptedTransport::always(Err(TransportError::retryable("unavailable")), 10);
        let producer = Producer::start(fast_retry_config(), transport).unwrap();

        let receipt = producer
            .submit_with_receipt(RoutingKey::new("app"), LogEntry::message("doomed"))
            .await
            .unwrap();
        let stats = producer.close().await;

        let report = receipt.await.unwrap();
        assert_eq!(report.attempts, 4);
        assert_eq!(
            report.error(),
            Some(&DeliveryError::RetryExhausted {
                attempts: 4,
                last_reason: "unavailable".to_string(),
            })
        );
        assert_eq!(stats.failed_entries, 1);
        assert_eq!(stats.retries, 3);
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::fatal("unauthorized"))]);
        let producer = Producer::start(fast_retry_config(), transport).unwrap();

        let receipt = producer
            .submit_with_receipt(RoutingKey::new("app"), LogEntry::message("denied"))
            .await
            .unwrap();
        let stats = producer.close().await;

        let report = receipt.await.unwrap();
        assert_eq!(report.attempts, 1);
        assert!(matches!(
            report.error(),
            Some(DeliveryError::Fatal { reason, .. }) if reason == "unauthorized"
        ));
        assert_eq!(stats.retries, 0);
    }

    #[tokio::test]
    async fn test_every_callback_fires_exactly_once() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::retryable("blip")),
            Err(TransportError::fatal("bad shard")),
        ]);
        let config = ProducerConfig {
            max_batch_count: 7,
            worker_pool_size: 4,
            ..fast_retry_config()
        };
        let producer = Producer::start(config, transport).unwrap();

        let fired: Arc<Mutex<HashMap<usize, usize>>> = Arc::default();
        let total = 200;
        let mut tasks = Vec::new();
        for i in 0..total {
            let handle = producer.handle();
            let fired = Arc::clone(&fired);
            tasks.push(tokio::spawn(async move {
                let key = RoutingKey::new(format!("topic-{}", i % 5));
                loop {
                    // a rejected submission drops its callback unfired
                    let fired = Arc::clone(&fired);
                    let callback = callback::from_fn(move |_report| {
                        *fired.lock().unwrap().entry(i).or_insert(0) += 1;
                    });
                    match handle
                        .submit(key.clone(), LogEntry::message(format!("{i}")), Some(callback))
                        .await
                    {
                        Err(ProducerError::QueueFull) => tokio::task::yield_now().await,
                        other => break other,
                    }
                }
                .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let stats = producer.close().await;
        assert_eq!(stats.delivered_entries + stats.failed_entries, total as u64);
        assert!(stats.failed_entries >= 1);
        assert_eq!(stats.pending_bytes, 0);
        assert_eq!(stats.pending_entries, 0);

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), total);
        assert!(fired.values().all(|&count| count == 1));
    }

    #[tokio::test]
    async fn test_callbacks_fire_once_per_submission() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::retryable("blip"))]);
        let config = ProducerConfig {
            max_batch_count: 3,
            ..fast_retry_config()
        };
        let producer = Producer::start(config, transport).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        for i in 0..10 {
            let calls = Arc::clone(&calls);
            producer
                .submit(
                    RoutingKey::new("app"),
                    LogEntry::message(format!("{i}")),
                    Some(callback::from_fn(move |_report| {
                        calls.fetch_add(1, Ordering::SeqCst);
                    })),
                )
                .await
                .unwrap();
        }

        let stats = producer.close().await;
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(stats.delivered_entries, 10);
    }

    #[tokio::test]
    async fn test_close_drains_long_backoff() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::retryable("later"))]);
        let config = ProducerConfig {
            linger_ms: 10,
            max_retry_count: 5,
            backoff: BackoffPolicy {
                initial_ms: 300_000,
                max_ms: 300_000,
                multiplier: 1.0,
                jitter: false,
            },
            ..Default::default()
        };
        let producer = Producer::start(config, transport).unwrap();

        let receipt = producer
            .submit_with_receipt(RoutingKey::new("app"), LogEntry::message("parked"))
            .await
            .unwrap();

        // wait until the first attempt failed and the batch is parked
        for _ in 0..200 {
            if producer.stats().retry_queue_len == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(producer.stats().retry_queue_len, 1);

        let stats = tokio::time::timeout(std::time::Duration::from_secs(5), producer.close())
            .await
            .unwrap();
        assert!(receipt.await.unwrap().is_success());
        assert_eq!(stats.retry_queue_len, 0);
    }

    #[tokio::test]
    async fn test_force_close_abandons_pending() {
        let config = ProducerConfig {
            linger_ms: 60_000,
            ..Default::default()
        };
        let producer = Producer::start(config, StuckTransport).unwrap();

        let receipt = producer
            .submit_with_receipt(RoutingKey::new("app"), LogEntry::message("stranded"))
            .await
            .unwrap();
        let handle = producer.handle();

        let stats = producer.force_close();
        assert_eq!(stats.pending_bytes, 0);
        // the callback was dropped without firing
        assert!(receipt.await.is_err());
        let late = handle.try_submit(RoutingKey::new("app"), LogEntry::message("late"), None);
        assert!(matches!(late, Err(ProducerError::Closed)));
    }

    #[tokio::test]
    async fn test_graceful_close_can_be_forced() {
        let config = ProducerConfig {
            linger_ms: 5,
            ..Default::default()
        };
        let producer = Producer::start(config, StuckTransport).unwrap();
        let receipt = producer
            .submit_with_receipt(RoutingKey::new("app"), LogEntry::message("stuck"))
            .await
            .unwrap();

        let abort = tokio::time::sleep(std::time::Duration::from_millis(50));
        let stats = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            producer.close_or_force(abort),
        )
        .await
        .unwrap();
        assert_eq!(stats.delivered_entries, 0);
        assert!(receipt.await.is_err());
    }

    #[tokio::test]
    async fn test_backpressure_reports_queue_full() {
        let config = ProducerConfig {
            max_batch_count: 1,
            worker_pool_size: 1,
            task_queue_capacity: 1,
            submit_queue_capacity: 1,
            submit_wait_ms: 10,
            ..Default::default()
        };
        let producer = Producer::start(config, StuckTransport).unwrap();

        let mut queue_full = false;
        for i in 0..20 {
            let result = producer
                .submit(RoutingKey::new("app"), LogEntry::message(format!("{i}")), None)
                .await;
            match result {
                Ok(()) => {}
                Err(ProducerError::QueueFull) => {
                    queue_full = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(queue_full);
        assert!(producer.stats().queue_full >= 1);
        producer.force_close();
    }

    #[tokio::test]
    async fn test_delivered_batches_respect_soft_limit() {
        let transport = ScriptedTransport::new(Vec::new());
        let delivered = Arc::clone(&transport.delivered);
        let config = ProducerConfig {
            max_batch_size_bytes: 200,
            hard_size_ceiling_bytes: 1024,
            linger_ms: 60_000,
            ..Default::default()
        };
        let producer = Producer::start(config, transport).unwrap();

        // each entry accounts 8 + 7 + 40 = 55 bytes; the fourth crosses the
        // soft limit and is appended before the flush
        for _ in 0..20 {
            producer
                .submit(RoutingKey::new("app"), LogEntry::message("x".repeat(40)), None)
                .await
                .unwrap();
        }
        let stats = producer.close().await;
        assert_eq!(stats.delivered_entries, 20);

        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 5);
        assert!(delivered.iter().all(|b| b.entry_count == 4));
    }

    #[tokio::test]
    async fn test_observability_aggregator_over_receipts() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::fatal("nope"))]);
        let config = ProducerConfig {
            max_batch_count: 2,
            linger_ms: 60_000,
            ..Default::default()
        };
        let producer = Producer::start(config, transport).unwrap();

        let mut receipts = Vec::new();
        for i in 0..4 {
            receipts.push(
                producer
                    .submit_with_receipt(RoutingKey::new("app"), LogEntry::message(format!("{i}")))
                    .await
                    .unwrap(),
            );
        }
        producer.close().await;

        let mut aggregator = observability::DeliveryMetricsAggregator::new();
        for receipt in receipts {
            aggregator.update(&receipt.await.unwrap());
        }
        // one report per receipt: two batches of two, one failed fatally
        assert_eq!(aggregator.fatal_batches, 2);
        assert_eq!(aggregator.delivered_batches, 2);
        assert_eq!(aggregator.summary().failure_rate, 50.0);
    }
}
