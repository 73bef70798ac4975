//! Transport trait - delivery output interface
//!
//! Signing, TLS and connection management live behind this seam.

use bytes::Bytes;

use crate::{RoutingKey, TransportError};

/// A flushed batch, encoded and ready for delivery
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    pub key: RoutingKey,
    pub payload: Bytes,
    pub entry_count: usize,
    /// Zero-based delivery attempt this payload belongs to
    pub attempt: u32,
}

/// Delivery trait
///
/// All transports must implement this trait. One instance is shared by
/// every worker, so `deliver` takes `&self`.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Transport name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver one encoded batch
    ///
    /// # Errors
    /// `TransportError::Retryable` for transient conditions, `Fatal` otherwise
    async fn deliver(&self, batch: &EncodedBatch) -> Result<(), TransportError>;
}
