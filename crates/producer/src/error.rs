//! Producer error types

use thiserror::Error;

/// Errors returned to submitters and at startup
#[derive(Debug, Error)]
pub enum ProducerError {
    /// Submission queue saturated, the caller should retry later
    #[error("submission queue full")]
    QueueFull,

    /// Producer is closing or closed
    #[error("producer closed")]
    Closed,

    /// Entry alone exceeds the hard payload ceiling
    #[error("log entry of {size} bytes exceeds hard ceiling of {max} bytes")]
    EntryTooLarge { size: u64, max: u64 },

    /// Invalid configuration
    #[error("invalid producer config: {0}")]
    Config(#[from] contracts::ContractError),

    /// Transport could not be created
    #[error("failed to create transport '{name}': {message}")]
    TransportCreation { name: String, message: String },
}

impl ProducerError {
    /// Create a transport creation error
    pub fn transport_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransportCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}
