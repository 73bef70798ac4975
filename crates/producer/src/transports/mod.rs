//! Transport implementations
//!
//! Contains LogTransport and FileTransport, plus the config-driven factory.

mod file;
mod log;

pub use self::file::{FileTransport, FileTransportConfig, Framing};
pub use self::log::LogTransport;

use contracts::{
    BatchFormat, EncodedBatch, Transport, TransportConfig, TransportError, TransportKind,
};
use tracing::instrument;

use crate::error::ProducerError;

/// Transport selected from configuration
pub enum ConfiguredTransport {
    Log(LogTransport),
    File(FileTransport),
}

impl Transport for ConfiguredTransport {
    fn name(&self) -> &str {
        match self {
            Self::Log(t) => t.name(),
            Self::File(t) => t.name(),
        }
    }

    async fn deliver(&self, batch: &EncodedBatch) -> Result<(), TransportError> {
        match self {
            Self::Log(t) => t.deliver(batch).await,
            Self::File(t) => t.deliver(batch).await,
        }
    }
}

/// Create a transport from configuration
///
/// `format` decides how the file transport frames records.
#[instrument(
    name = "producer_create_transport",
    skip(config),
    fields(transport = %config.name, kind = ?config.kind)
)]
pub fn create_transport(
    config: &TransportConfig,
    format: BatchFormat,
) -> Result<ConfiguredTransport, ProducerError> {
    match config.kind {
        TransportKind::Log => Ok(ConfiguredTransport::Log(LogTransport::new(&config.name))),
        TransportKind::File => {
            let transport = FileTransport::from_params(&config.name, &config.params, format)
                .map_err(|e| ProducerError::transport_creation(&config.name, e.to_string()))?;
            Ok(ConfiguredTransport::File(transport))
        }
    }
}
