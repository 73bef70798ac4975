//! LogEntry - the unit a caller submits

use serde::{Deserialize, Serialize};

/// Bytes charged for the timestamp of every entry
pub const ENTRY_TIME_BYTES: u64 = 8;

/// Single key/value pair of a log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogContent {
    pub key: String,
    pub value: String,
}

impl LogContent {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One log line, shipped as part of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Event time, unix milliseconds
    pub time_ms: i64,
    /// Ordered key/value contents
    pub contents: Vec<LogContent>,
}

impl LogEntry {
    /// Create an entry stamped with the current wall clock
    pub fn now(contents: Vec<LogContent>) -> Self {
        Self {
            time_ms: chrono::Utc::now().timestamp_millis(),
            contents,
        }
    }

    /// Create an entry holding a single `message` content
    pub fn message(msg: impl Into<String>) -> Self {
        Self::now(vec![LogContent::new("message", msg)])
    }

    /// Append a content pair (builder style)
    pub fn with_content(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.contents.push(LogContent::new(key, value));
        self
    }

    /// Accounted byte size of this entry
    ///
    /// Timestamp plus the byte length of every key and value.
    pub fn size(&self) -> u64 {
        self.contents
            .iter()
            .map(|c| (c.key.len() + c.value.len()) as u64)
            .sum::<u64>()
            + ENTRY_TIME_BYTES
    }
}
