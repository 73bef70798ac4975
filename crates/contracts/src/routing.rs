//! RoutingKey - batch grouping key

use serde::{Deserialize, Serialize};
use std::fmt;

/// Routing key for a submitted entry
///
/// Entries with identical topic / source / shard hash / file name share one
/// open batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoutingKey {
    pub topic: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub shard_hash: String,
    #[serde(default)]
    pub file_name: String,
}

impl RoutingKey {
    /// Create a key for a topic with empty source / shard / file name
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_shard_hash(mut self, shard_hash: impl Into<String>) -> Self {
        self.shard_hash = shard_hash.into();
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.topic, self.shard_hash, self.source, self.file_name
        )
    }
}
