//! Dispatcher - owns the live batch map and the two loops that mutate it
//!
//! Every path that touches the map holds its lock for the whole
//! lookup/append/decide/hand-off sequence. Pushing to the task queue happens
//! under that lock, so a full queue stalls the dispatcher and, through the
//! bounded submission channel, `submit`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use contracts::RoutingKey;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::batch::{Batch, Submission};
use crate::metrics::ProducerMetrics;
use crate::policy::{self, FlushDecision, FlushLimits, FlushReason};
use crate::retry_queue::RetryQueue;
use crate::worker_pool::TaskQueue;

/// Lifecycle state broadcast to the dispatcher loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    Running,
    /// Drain the submission queue, then stop
    Graceful,
    /// Stop immediately
    Forced,
}

pub struct Dispatcher {
    batches: Mutex<HashMap<RoutingKey, Batch>>,
    limits: FlushLimits,
    linger: Duration,
    tasks: TaskQueue,
    retry_queue: Arc<RetryQueue>,
    metrics: Arc<ProducerMetrics>,
}

impl Dispatcher {
    pub fn new(
        limits: FlushLimits,
        linger: Duration,
        tasks: TaskQueue,
        retry_queue: Arc<RetryQueue>,
        metrics: Arc<ProducerMetrics>,
    ) -> Self {
        Self {
            batches: Mutex::new(HashMap::new()),
            limits,
            linger,
            tasks,
            retry_queue,
            metrics,
        }
    }

    /// Number of open batches
    pub async fn open_batches(&self) -> usize {
        self.batches.lock().await.len()
    }

    /// Route one submission into its batch, flushing per the flush policy
    pub async fn handle_submission(&self, submission: Submission) {
        let Submission {
            key,
            entry,
            callback,
        } = submission;
        let size = entry.size();
        let pending = self.metrics.add_pending(size);
        observability::metrics::record_pending_bytes(pending);

        let mut batches = self.batches.lock().await;
        let flushed = match batches.entry(key) {
            Entry::Vacant(slot) => {
                debug!(key = %slot.key(), "Batch created");
                let batch = Batch::new(slot.key().clone(), entry, callback);
                slot.insert(batch);
                None
            }
            Entry::Occupied(mut slot) => match policy::decide(slot.get(), size, &self.limits) {
                FlushDecision::AddAndHold => {
                    slot.get_mut().append(entry, callback);
                    None
                }
                FlushDecision::AddThenFlush => {
                    slot.get_mut().append(entry, callback);
                    Some((slot.remove(), FlushReason::Size))
                }
                FlushDecision::FlushThenCreate => {
                    let fresh = Batch::new(slot.key().clone(), entry, callback);
                    Some((slot.insert(fresh), FlushReason::Full))
                }
            },
        };
        self.record_open(batches.len());

        if let Some((batch, reason)) = flushed {
            self.dispatch(batch, reason).await;
        }
    }

    /// Flush every batch open for at least the linger duration
    ///
    /// Returns how long until the next open batch reaches the linger
    /// duration, or the full linger duration when none is open.
    pub async fn check_batches(&self) -> Duration {
        let now = Instant::now();
        let mut batches = self.batches.lock().await;

        let expired: Vec<RoutingKey> = batches
            .iter()
            .filter(|(_, batch)| batch.age(now) >= self.linger)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            if let Some(batch) = batches.remove(&key) {
                self.dispatch(batch, FlushReason::Linger).await;
            }
        }
        self.record_open(batches.len());

        batches
            .values()
            .map(|batch| self.linger.saturating_sub(batch.age(now)))
            .min()
            .unwrap_or(self.linger)
    }

    /// Push retry-queue batches that are due, or all of them with `force_all`
    pub async fn drain_due_retries(&self, force_all: bool) -> usize {
        let due = self.retry_queue.get_due(force_all);
        let count = due.len();
        for batch in due {
            debug!(key = %batch.key(), attempts = batch.attempts(), "Retrying batch");
            if let Err(batch) = self.tasks.push(batch).await {
                warn!(key = %batch.key(), "Task queue closed, retry abandoned");
            }
        }
        count
    }

    /// Flush every open batch regardless of size or age
    pub async fn flush_all(&self) -> usize {
        let mut batches = self.batches.lock().await;
        let open: Vec<Batch> = batches.drain().map(|(_, batch)| batch).collect();
        let count = open.len();
        for batch in open {
            self.dispatch(batch, FlushReason::Shutdown).await;
        }
        self.record_open(0);
        count
    }

    /// Submission loop
    ///
    /// On graceful shutdown the channel is closed and everything already
    /// queued is routed before returning.
    #[instrument(name = "dispatcher_run", skip_all)]
    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<Submission>,
        mut shutdown: watch::Receiver<ShutdownMode>,
    ) {
        info!("Dispatcher started");
        let mut routed: u64 = 0;

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    let mode = match changed {
                        Ok(()) => *shutdown.borrow_and_update(),
                        Err(_) => ShutdownMode::Forced,
                    };
                    match mode {
                        ShutdownMode::Running => continue,
                        ShutdownMode::Graceful => {
                            rx.close();
                            while let Some(submission) = rx.recv().await {
                                self.handle_submission(submission).await;
                                routed += 1;
                            }
                            break;
                        }
                        ShutdownMode::Forced => break,
                    }
                }
                received = rx.recv() => match received {
                    Some(submission) => {
                        self.handle_submission(submission).await;
                        routed += 1;
                    }
                    None => break,
                },
            }
        }

        info!(entries = routed, "Dispatcher stopped");
    }

    /// Linger loop: flushes aged batches and re-dispatches due retries
    #[instrument(name = "dispatcher_linger", skip_all, fields(linger_ms = self.linger.as_millis() as u64))]
    pub async fn run_linger(&self, mut shutdown: watch::Receiver<ShutdownMode>) {
        debug!("Linger loop started");

        loop {
            // Registered before draining so a retry pushed meanwhile wakes us
            let pushed = self.retry_queue.pushed();

            let mut wait = self.check_batches().await;
            self.drain_due_retries(false).await;
            if let Some(ready_at) = self.retry_queue.next_ready_at() {
                wait = wait.min(ready_at.saturating_duration_since(Instant::now()));
            }

            tokio::select! {
                () = sleep(wait) => {}
                () = pushed => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() != ShutdownMode::Running {
                        break;
                    }
                }
            }
        }

        debug!("Linger loop stopped");
    }

    /// Hand a batch to the worker pool; called with the map lock held
    async fn dispatch(&self, batch: Batch, reason: FlushReason) {
        debug!(
            key = %batch.key(),
            entries = batch.len(),
            bytes = batch.total_size(),
            reason = reason.as_str(),
            "Batch flushed"
        );
        self.metrics.inc_flushed();
        observability::metrics::record_batch_flushed(
            reason.as_str(),
            batch.len(),
            batch.total_size(),
        );

        if let Err(batch) = self.tasks.push(batch).await {
            warn!(key = %batch.key(), "Task queue closed, batch abandoned");
        }
    }

    fn record_open(&self, count: usize) {
        self.metrics.set_open_batches(count);
        observability::metrics::record_open_batches(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::Sender;
    use crate::worker_pool::WorkerPool;
    use contracts::{
        EncodedBatch, LogContent, LogEntry, ProducerConfig, Transport, TransportError,
    };
    use std::sync::Mutex as StdMutex;

    /// Records every delivered batch
    #[derive(Default)]
    struct RecordingTransport {
        delivered: StdMutex<Vec<EncodedBatch>>,
    }

    impl Transport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, batch: &EncodedBatch) -> Result<(), TransportError> {
            self.delivered.lock().unwrap().push(batch.clone());
            Ok(())
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        pool: WorkerPool,
        sender: Arc<Sender<RecordingTransport>>,
        metrics: Arc<ProducerMetrics>,
        retry_queue: Arc<RetryQueue>,
    }

    impl Fixture {
        fn new(soft: u64, count: usize, linger_ms: u64) -> Self {
            Self::with_config(ProducerConfig {
                max_batch_size_bytes: soft,
                max_batch_count: count,
                linger_ms,
                ..Default::default()
            })
        }

        fn with_config(config: ProducerConfig) -> Self {
            let metrics = Arc::new(ProducerMetrics::new());
            let retry_queue = Arc::new(RetryQueue::new());
            let sender = Arc::new(Sender::new(
                RecordingTransport::default(),
                Arc::clone(&retry_queue),
                &config,
                Arc::clone(&metrics),
            ));
            let pool = WorkerPool::spawn(Arc::clone(&sender), 2, 16, Arc::clone(&metrics));
            let dispatcher = Dispatcher::new(
                FlushLimits::from(&config),
                config.linger(),
                pool.queue(),
                Arc::clone(&retry_queue),
                Arc::clone(&metrics),
            );
            Self {
                dispatcher,
                pool,
                sender,
                metrics,
                retry_queue,
            }
        }

        async fn finish(self) -> Vec<EncodedBatch> {
            self.pool.shutdown().await;
            let delivered = self.sender.transport().delivered.lock().unwrap().clone();
            delivered
        }
    }

    /// Entry whose `size()` is exactly `size` bytes
    fn sized(size: u64) -> LogEntry {
        LogEntry {
            time_ms: 0,
            contents: vec![LogContent::new("", "x".repeat((size - 8) as usize))],
        }
    }

    fn submission(topic: &str, entry: LogEntry) -> Submission {
        Submission {
            key: RoutingKey::new(topic),
            entry,
            callback: None,
        }
    }

    #[tokio::test]
    async fn test_entries_group_by_routing_key() {
        let fx = Fixture::new(10_000, 100, 60_000);
        fx.dispatcher.handle_submission(submission("a", sized(10))).await;
        fx.dispatcher.handle_submission(submission("b", sized(10))).await;
        fx.dispatcher.handle_submission(submission("a", sized(10))).await;

        assert_eq!(fx.dispatcher.open_batches().await, 2);
        assert_eq!(fx.dispatcher.flush_all().await, 2);

        let mut delivered = fx.finish().await;
        delivered.sort_by(|x, y| x.key.cmp(&y.key));
        assert_eq!(delivered[0].key.topic, "a");
        assert_eq!(delivered[0].entry_count, 2);
        assert_eq!(delivered[1].entry_count, 1);
    }

    #[tokio::test]
    async fn test_soft_limit_flushes_after_append() {
        let fx = Fixture::new(1000, 5, 60_000);
        fx.dispatcher.handle_submission(submission("t", sized(950))).await;
        fx.dispatcher.handle_submission(submission("t", sized(100))).await;

        assert_eq!(fx.dispatcher.open_batches().await, 0);
        let delivered = fx.finish().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].entry_count, 2);
    }

    #[tokio::test]
    async fn test_hard_ceiling_ships_old_batch_and_seeds_new_one() {
        let fx = Fixture::with_config(ProducerConfig {
            max_batch_size_bytes: 100,
            hard_size_ceiling_bytes: 200,
            max_batch_count: 100,
            linger_ms: 60_000,
            ..Default::default()
        });
        fx.dispatcher.handle_submission(submission("t", sized(50))).await;
        // 50 + 180 reaches the hard ceiling
        fx.dispatcher.handle_submission(submission("t", sized(180))).await;

        {
            let batches = fx.dispatcher.batches.lock().await;
            let open = &batches[&RoutingKey::new("t")];
            assert_eq!(open.len(), 1);
            assert_eq!(open.total_size(), 180);
        }
        assert_eq!(fx.metrics.snapshot(0).batches_flushed, 1);

        let delivered = fx.finish().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].entry_count, 1);
        let group: serde_json::Value = serde_json::from_slice(&delivered[0].payload).unwrap();
        let value = group["logs"][0]["contents"][0]["value"].as_str().unwrap();
        assert_eq!(value.len(), 42);
    }

    #[tokio::test]
    async fn test_count_limit_flushes_before_append() {
        let fx = Fixture::new(10_000, 2, 60_000);
        for _ in 0..3 {
            fx.dispatcher.handle_submission(submission("t", sized(10))).await;
        }

        // the third entry seeds a new batch
        assert_eq!(fx.dispatcher.open_batches().await, 1);
        fx.dispatcher.flush_all().await;

        let delivered = fx.finish().await;
        let counts: Vec<usize> = delivered.iter().map(|b| b.entry_count).collect();
        assert_eq!(counts.iter().sum::<usize>(), 3);
        assert!(counts.contains(&2));
        assert!(counts.contains(&1));
    }

    #[tokio::test]
    async fn test_pending_bytes_track_batches() {
        let fx = Fixture::new(10_000, 100, 60_000);
        fx.dispatcher.handle_submission(submission("t", sized(40))).await;
        fx.dispatcher.handle_submission(submission("t", sized(60))).await;
        assert_eq!(fx.metrics.pending_bytes(), 100);
        assert_eq!(fx.metrics.snapshot(0).open_batches, 1);

        fx.dispatcher.flush_all().await;
        let metrics = Arc::clone(&fx.metrics);
        fx.finish().await;
        assert_eq!(metrics.pending_bytes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_batches_respects_linger() {
        let fx = Fixture::new(10_000, 100, 1_000);
        assert_eq!(fx.dispatcher.check_batches().await, Duration::from_millis(1_000));

        fx.dispatcher.handle_submission(submission("t", sized(10))).await;
        tokio::time::advance(Duration::from_millis(400)).await;

        let remaining = fx.dispatcher.check_batches().await;
        assert_eq!(remaining, Duration::from_millis(600));
        assert_eq!(fx.dispatcher.open_batches().await, 1);

        tokio::time::advance(Duration::from_millis(600)).await;
        fx.dispatcher.check_batches().await;
        assert_eq!(fx.dispatcher.open_batches().await, 0);

        let delivered = fx.finish().await;
        assert_eq!(delivered.len(), 1);
    }

    #[tokio::test]
    async fn test_drain_due_retries_respects_schedule() {
        let fx = Fixture::new(10_000, 100, 60_000);
        let now = Instant::now();
        fx.retry_queue.push(
            Batch::new(RoutingKey::new("soon"), sized(10), None),
            now,
        );
        fx.retry_queue.push(
            Batch::new(RoutingKey::new("later"), sized(10), None),
            now + Duration::from_secs(300),
        );

        assert_eq!(fx.dispatcher.drain_due_retries(false).await, 1);
        assert_eq!(fx.retry_queue.len(), 1);
        assert_eq!(fx.dispatcher.drain_due_retries(true).await, 1);
        assert!(fx.retry_queue.is_empty());

        assert_eq!(fx.finish().await.len(), 2);
    }

    #[tokio::test]
    async fn test_graceful_run_drains_queued_submissions() {
        let fx = Fixture::new(10_000, 100, 60_000);
        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownMode::Running);

        for _ in 0..5 {
            tx.send(submission("t", sized(10))).await.unwrap();
        }
        shutdown_tx.send_replace(ShutdownMode::Graceful);
        fx.dispatcher.run(rx, shutdown_rx).await;

        assert!(tx.send(submission("t", sized(10))).await.is_err());
        assert_eq!(fx.dispatcher.flush_all().await, 1);
        let delivered = fx.finish().await;
        assert_eq!(delivered[0].entry_count, 5);
    }

    #[tokio::test]
    async fn test_forced_run_abandons_queue() {
        let fx = Fixture::new(10_000, 100, 60_000);
        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownMode::Running);

        tx.send(submission("t", sized(10))).await.unwrap();
        shutdown_tx.send_replace(ShutdownMode::Forced);
        fx.dispatcher.run(rx, shutdown_rx).await;

        assert_eq!(fx.dispatcher.open_batches().await, 0);
        assert!(fx.finish().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_linger_loop_flushes_idle_batch() {
        let fx = Arc::new(Fixture::new(10_000, 100, 500));
        let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownMode::Running);

        fx.dispatcher.handle_submission(submission("t", sized(10))).await;
        let linger = {
            let fx = Arc::clone(&fx);
            tokio::spawn(async move { fx.dispatcher.run_linger(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(fx.dispatcher.open_batches().await, 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fx.dispatcher.open_batches().await, 0);

        shutdown_tx.send_replace(ShutdownMode::Graceful);
        linger.await.unwrap();

        let fx = Arc::into_inner(fx).unwrap();
        assert_eq!(fx.finish().await.len(), 1);
    }
}
