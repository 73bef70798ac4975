//! # Producer
//!
//! Buffering log-shipping pipeline.
//!
//! Responsibilities:
//! - Accumulate submitted entries into per-`RoutingKey` batches
//! - Flush on size, count or linger triggers
//! - Deliver through a bounded worker pool
//! - Retry transient failures with backoff until success or exhaustion
//!
//! ```text
//! submit ─> [submit queue] ─> Dispatcher ─> [task queue] ─> workers ─> Sender ─> Transport
//!                                 ^                                      │
//!                                 └──── linger loop <── RetryQueue <─────┘
//! ```

pub mod backoff;
pub mod batch;
pub mod callback;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod producer;
pub mod retry_queue;
pub mod sender;
pub mod transports;
pub mod worker_pool;

pub use batch::{Batch, Submission};
pub use callback::Callback;
pub use contracts::{
    DeliveryError, DeliveryReport, DeliveryStatus, EncodedBatch, LogContent, LogEntry,
    ProducerConfig, RoutingKey, Transport, TransportError,
};
pub use dispatcher::{Dispatcher, ShutdownMode};
pub use error::ProducerError;
pub use metrics::{ProducerMetrics, ProducerStatsSnapshot};
pub use policy::{FlushDecision, FlushLimits, FlushReason};
pub use producer::{Producer, ProducerHandle};
pub use retry_queue::RetryQueue;
pub use sender::{SendOutcome, Sender};
pub use transports::{
    create_transport, ConfiguredTransport, FileTransport, FileTransportConfig, Framing, LogTransport,
};
pub use worker_pool::{TaskQueue, WorkerPool};
