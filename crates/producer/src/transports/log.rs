//! LogTransport - logs batch summaries via tracing

use contracts::{EncodedBatch, Transport, TransportError};
use tracing::{info, instrument};

/// Transport that only logs what it would ship
pub struct LogTransport {
    name: String,
}

impl LogTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Transport for LogTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_transport_deliver",
        skip(self, batch),
        fields(transport = %self.name, topic = %batch.key.topic)
    )]
    async fn deliver(&self, batch: &EncodedBatch) -> Result<(), TransportError> {
        info!(
            transport = %self.name,
            key = %batch.key,
            entries = batch.entry_count,
            bytes = batch.payload.len(),
            attempt = batch.attempt,
            "Batch shipped"
        );
        Ok(())
    }
}
