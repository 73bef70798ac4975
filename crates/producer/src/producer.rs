//! Producer - public facade over the dispatcher, retry queue and worker pool

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contracts::{DeliveryReport, LogEntry, ProducerConfig, RoutingKey, Transport};
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::batch::Submission;
use crate::callback::{self, Callback};
use crate::dispatcher::{Dispatcher, ShutdownMode};
use crate::error::ProducerError;
use crate::metrics::{ProducerMetrics, ProducerStatsSnapshot};
use crate::policy::FlushLimits;
use crate::retry_queue::RetryQueue;
use crate::sender::Sender;
use crate::worker_pool::WorkerPool;

/// Cloneable submission handle
///
/// Handles stay valid after the producer closes; submissions then fail with
/// [`ProducerError::Closed`].
#[derive(Clone)]
pub struct ProducerHandle {
    tx: mpsc::Sender<Submission>,
    closing: Arc<AtomicBool>,
    metrics: Arc<ProducerMetrics>,
    hard_ceiling: u64,
    submit_wait: Duration,
}

impl ProducerHandle {
    /// Submit an entry, waiting briefly for room in the submission queue
    ///
    /// # Errors
    /// `QueueFull` if the queue stays saturated for `submit_wait_ms`; the
    /// caller should retry. `Closed` once close began. `EntryTooLarge` if the
    /// entry alone exceeds the hard ceiling.
    pub async fn submit(
        &self,
        key: RoutingKey,
        entry: LogEntry,
        callback: Option<Callback>,
    ) -> Result<(), ProducerError> {
        self.admit(&entry)?;
        let topic = key.topic.clone();
        let submission = Submission {
            key,
            entry,
            callback,
        };

        match self.tx.send_timeout(submission, self.submit_wait).await {
            Ok(()) => {
                self.accepted(&topic);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => Err(self.queue_full()),
            Err(SendTimeoutError::Closed(_)) => Err(ProducerError::Closed),
        }
    }

    /// Submit without waiting; `QueueFull` immediately if saturated
    pub fn try_submit(
        &self,
        key: RoutingKey,
        entry: LogEntry,
        callback: Option<Callback>,
    ) -> Result<(), ProducerError> {
        self.admit(&entry)?;
        let topic = key.topic.clone();
        let submission = Submission {
            key,
            entry,
            callback,
        };

        match self.tx.try_send(submission) {
            Ok(()) => {
                self.accepted(&topic);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(self.queue_full()),
            Err(TrySendError::Closed(_)) => Err(ProducerError::Closed),
        }
    }

    /// Submit and receive the terminal report through a one-shot channel
    ///
    /// The receiver resolves to `Err` if the entry is abandoned by a forced
    /// close.
    pub async fn submit_with_receipt(
        &self,
        key: RoutingKey,
        entry: LogEntry,
    ) -> Result<oneshot::Receiver<DeliveryReport>, ProducerError> {
        let (callback, receipt) = callback::oneshot();
        self.submit(key, entry, Some(callback)).await?;
        Ok(receipt)
    }

    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    fn admit(&self, entry: &LogEntry) -> Result<(), ProducerError> {
        if self.is_closed() {
            return Err(ProducerError::Closed);
        }
        let size = entry.size();
        if size > self.hard_ceiling {
            return Err(ProducerError::EntryTooLarge {
                size,
                max: self.hard_ceiling,
            });
        }
        Ok(())
    }

    fn accepted(&self, topic: &str) {
        self.metrics.inc_submitted();
        observability::metrics::record_entry_submitted(topic);
    }

    fn queue_full(&self) -> ProducerError {
        self.metrics.inc_queue_full();
        observability::metrics::record_queue_full();
        ProducerError::QueueFull
    }
}

struct RunningTasks {
    dispatcher: JoinHandle<()>,
    linger: JoinHandle<()>,
    pool: WorkerPool,
}

impl RunningTasks {
    fn abort(&self) {
        self.dispatcher.abort();
        self.linger.abort();
        self.pool.abort();
    }
}

/// Buffering log producer
///
/// Dropping a producer without closing it behaves like [`Producer::force_close`].
pub struct Producer {
    handle: ProducerHandle,
    dispatcher: Arc<Dispatcher>,
    retry_queue: Arc<RetryQueue>,
    metrics: Arc<ProducerMetrics>,
    shutdown_tx: watch::Sender<ShutdownMode>,
    tasks: Option<RunningTasks>,
}

impl Producer {
    /// Validate `config` and spawn the dispatcher, linger loop and workers
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(name = "producer_start", skip_all, fields(transport = transport.name()))]
    pub fn start<T>(config: ProducerConfig, transport: T) -> Result<Self, ProducerError>
    where
        T: Transport + Sync + 'static,
    {
        config.check()?;

        let metrics = Arc::new(ProducerMetrics::new());
        let retry_queue = Arc::new(RetryQueue::new());
        let sender = Arc::new(Sender::new(
            transport,
            Arc::clone(&retry_queue),
            &config,
            Arc::clone(&metrics),
        ));
        let pool = WorkerPool::spawn(
            sender,
            config.worker_pool_size,
            config.task_queue_capacity,
            Arc::clone(&metrics),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            FlushLimits::from(&config),
            config.linger(),
            pool.queue(),
            Arc::clone(&retry_queue),
            Arc::clone(&metrics),
        ));

        let (tx, rx) = mpsc::channel(config.submit_queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownMode::Running);

        let dispatcher_task = {
            let dispatcher = Arc::clone(&dispatcher);
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move { dispatcher.run(rx, shutdown_rx).await })
        };
        let linger_task = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.run_linger(shutdown_rx).await })
        };

        info!(
            workers = pool.size(),
            soft_limit = config.max_batch_size_bytes,
            max_count = config.max_batch_count,
            linger_ms = config.linger_ms,
            "Producer started"
        );

        Ok(Self {
            handle: ProducerHandle {
                tx,
                closing: Arc::new(AtomicBool::new(false)),
                metrics: Arc::clone(&metrics),
                hard_ceiling: config.hard_size_ceiling_bytes,
                submit_wait: config.submit_wait(),
            },
            dispatcher,
            retry_queue,
            metrics,
            shutdown_tx,
            tasks: Some(RunningTasks {
                dispatcher: dispatcher_task,
                linger: linger_task,
                pool,
            }),
        })
    }

    pub fn handle(&self) -> ProducerHandle {
        self.handle.clone()
    }

    /// See [`ProducerHandle::submit`]
    pub async fn submit(
        &self,
        key: RoutingKey,
        entry: LogEntry,
        callback: Option<Callback>,
    ) -> Result<(), ProducerError> {
        self.handle.submit(key, entry, callback).await
    }

    /// See [`ProducerHandle::try_submit`]
    pub fn try_submit(
        &self,
        key: RoutingKey,
        entry: LogEntry,
        callback: Option<Callback>,
    ) -> Result<(), ProducerError> {
        self.handle.try_submit(key, entry, callback)
    }

    /// See [`ProducerHandle::submit_with_receipt`]
    pub async fn submit_with_receipt(
        &self,
        key: RoutingKey,
        entry: LogEntry,
    ) -> Result<oneshot::Receiver<DeliveryReport>, ProducerError> {
        self.handle.submit_with_receipt(key, entry).await
    }

    pub fn stats(&self) -> ProducerStatsSnapshot {
        self.metrics.snapshot(self.retry_queue.len())
    }

    /// Graceful close
    ///
    /// Routes everything already submitted, flushes every open batch and
    /// keeps draining the retry queue, ignoring backoff, until every batch
    /// reached a terminal outcome.
    pub async fn close(self) -> ProducerStatsSnapshot {
        self.close_or_force(std::future::pending()).await
    }

    /// Graceful close that turns into a forced close once `abort` resolves
    #[instrument(name = "producer_close", skip_all)]
    pub async fn close_or_force<F>(mut self, abort: F) -> ProducerStatsSnapshot
    where
        F: Future<Output = ()>,
    {
        let Some(mut tasks) = self.tasks.take() else {
            return self.stats();
        };
        self.handle.closing.store(true, Ordering::Release);
        self.shutdown_tx.send_replace(ShutdownMode::Graceful);

        let aborted = tokio::select! {
            () = self.drain(&mut tasks) => false,
            () = abort => true,
        };

        if aborted {
            warn!("Graceful close interrupted, forcing");
            self.abandon(&tasks);
        } else {
            tasks.pool.shutdown().await;
        }

        let stats = self.stats();
        info!(
            delivered = stats.delivered_entries,
            failed = stats.failed_entries,
            "Producer closed"
        );
        stats
    }

    /// Forced close: stop every loop now, abandon queued and open batches
    ///
    /// Abandoned entries get no callback; one-shot receipts resolve to `Err`.
    #[instrument(name = "producer_force_close", skip_all)]
    pub fn force_close(mut self) -> ProducerStatsSnapshot {
        if let Some(tasks) = self.tasks.take() {
            self.handle.closing.store(true, Ordering::Release);
            self.shutdown_tx.send_replace(ShutdownMode::Forced);
            self.abandon(&tasks);
        }
        self.stats()
    }

    async fn drain(&self, tasks: &mut RunningTasks) {
        join_task(&mut tasks.dispatcher, "dispatcher").await;
        join_task(&mut tasks.linger, "linger").await;

        let flushed = self.dispatcher.flush_all().await;
        info!(batches = flushed, "Open batches flushed");

        loop {
            let idle = tasks.pool.idle().notified();
            self.dispatcher.drain_due_retries(true).await;
            // in-flight first: a worker requeues before it leaves in-flight
            if self.metrics.in_flight() == 0 && self.retry_queue.is_empty() {
                break;
            }
            idle.await;
        }
    }

    fn abandon(&self, tasks: &RunningTasks) {
        tasks.abort();
        let dropped = self.retry_queue.clear();
        self.metrics.reset_pending();
        observability::metrics::record_pending_bytes(0);
        warn!(retries_dropped = dropped, "Producer force closed");
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.take() {
            self.handle.closing.store(true, Ordering::Release);
            self.shutdown_tx.send_replace(ShutdownMode::Forced);
            tasks.abort();
        }
    }
}

async fn join_task(handle: &mut JoinHandle<()>, name: &str) {
    if let Err(e) = handle.await {
        if !e.is_cancelled() {
            error!(task = name, error = ?e, "Producer task panicked");
        }
    }
}
