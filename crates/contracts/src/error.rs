//! Layered error definitions
//!
//! Categorized by source: config / transport / delivery

use thiserror::Error;

/// Unified configuration and io error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Outcome classification reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Transient condition, the batch may be retried
    #[error("retryable transport error: {0}")]
    Retryable(String),

    /// Permanent condition, the batch must not be retried
    #[error("fatal transport error: {0}")]
    Fatal(String),
}

impl TransportError {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::Retryable(reason.into())
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Human readable reason without the classification prefix
    pub fn reason(&self) -> &str {
        match self {
            Self::Retryable(r) | Self::Fatal(r) => r,
        }
    }
}

/// Terminal delivery failure surfaced to submitters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Transport rejected the batch permanently
    #[error("fatal delivery error after {attempts} attempt(s): {reason}")]
    Fatal { attempts: u32, reason: String },

    /// Retryable failures exceeded the configured retry limit
    #[error("retries exhausted after {attempts} attempt(s): {last_reason}")]
    RetryExhausted { attempts: u32, last_reason: String },
}
