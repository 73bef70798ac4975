//! WorkerPool - fixed set of delivery workers over a bounded task queue

use std::sync::Arc;

use contracts::Transport;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use crate::batch::Batch;
use crate::metrics::ProducerMetrics;
use crate::sender::Sender;

/// Producer side of the task queue
///
/// Pushing blocks while the queue is full; that wait is what propagates
/// backpressure to `submit`.
#[derive(Clone)]
pub struct TaskQueue {
    tx: async_channel::Sender<Batch>,
    metrics: Arc<ProducerMetrics>,
}

impl TaskQueue {
    /// Hand a flushed batch to the workers
    ///
    /// Returns the batch back if the pool has shut down.
    pub async fn push(&self, batch: Batch) -> Result<(), Batch> {
        self.metrics.inc_in_flight();
        match self.tx.send(batch).await {
            Ok(()) => Ok(()),
            Err(async_channel::SendError(batch)) => {
                self.metrics.dec_in_flight();
                Err(batch)
            }
        }
    }

    /// Batches waiting for a free worker
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Handle to the running workers
pub struct WorkerPool {
    queue: TaskQueue,
    workers: Vec<JoinHandle<()>>,
    /// Notified each time a worker finishes a batch
    idle: Arc<Notify>,
}

impl WorkerPool {
    /// Spawn `size` workers sharing one sender
    pub fn spawn<T: Transport + Sync + 'static>(
        sender: Arc<Sender<T>>,
        size: usize,
        queue_capacity: usize,
        metrics: Arc<ProducerMetrics>,
    ) -> Self {
        let (tx, rx) = async_channel::bounded(queue_capacity.max(1));
        let idle = Arc::new(Notify::new());

        let workers = (0..size.max(1))
            .map(|id| {
                let sender = Arc::clone(&sender);
                let rx = rx.clone();
                let metrics = Arc::clone(&metrics);
                let idle = Arc::clone(&idle);
                tokio::spawn(async move {
                    delivery_worker(id, sender, rx, metrics, idle).await;
                })
            })
            .collect();

        Self {
            queue: TaskQueue { tx, metrics },
            workers,
            idle,
        }
    }

    pub fn queue(&self) -> TaskQueue {
        self.queue.clone()
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn idle(&self) -> &Notify {
        &self.idle
    }

    /// Close the queue and wait for workers to finish what is queued
    #[instrument(name = "worker_pool_shutdown", skip(self), fields(workers = self.workers.len()))]
    pub async fn shutdown(self) {
        self.queue.tx.close();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = ?e, "Delivery worker panicked");
            }
        }
        debug!("WorkerPool shutdown complete");
    }

    /// Stop every worker immediately; queued batches are abandoned
    pub fn abort(&self) {
        self.queue.tx.close();
        for worker in &self.workers {
            worker.abort();
        }
    }
}

/// Leaves in-flight and wakes close waiters even if delivery unwinds
struct InFlightGuard<'a> {
    metrics: &'a ProducerMetrics,
    idle: &'a Notify,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.dec_in_flight();
        self.idle.notify_waiters();
    }
}

#[instrument(name = "delivery_worker_loop", skip(sender, rx, metrics, idle))]
async fn delivery_worker<T: Transport + Sync + 'static>(
    id: usize,
    sender: Arc<Sender<T>>,
    rx: async_channel::Receiver<Batch>,
    metrics: Arc<ProducerMetrics>,
    idle: Arc<Notify>,
) {
    debug!(worker = id, "Delivery worker started");

    while let Ok(batch) = rx.recv().await {
        let _in_flight = InFlightGuard {
            metrics: &metrics,
            idle: &idle,
        };
        sender.send(batch).await;
    }

    debug!(worker = id, "Delivery worker stopped");
}
