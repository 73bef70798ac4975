//! FileTransport - appends payloads to one file per topic

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use contracts::{BatchFormat, EncodedBatch, Transport, TransportError};
use tracing::{debug, instrument};

/// How records are separated inside a topic file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One record per line (JSON payloads)
    Lines,
    /// u32 little-endian length before each record (binary payloads)
    LengthPrefixed,
}

impl From<BatchFormat> for Framing {
    fn from(format: BatchFormat) -> Self {
        match format {
            BatchFormat::Json => Self::Lines,
            BatchFormat::Bincode => Self::LengthPrefixed,
        }
    }
}

/// Configuration for FileTransport
#[derive(Debug, Clone)]
pub struct FileTransportConfig {
    /// Base output directory
    pub base_path: PathBuf,
    pub framing: Framing,
}

impl FileTransportConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>, format: BatchFormat) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        Self {
            base_path,
            framing: Framing::from(format),
        }
    }
}

/// Transport that appends every batch to `<base_path>/<topic>.log`
pub struct FileTransport {
    name: String,
    config: FileTransportConfig,
    files: Mutex<HashMap<String, File>>,
}

impl FileTransport {
    pub fn new(name: impl Into<String>, config: FileTransportConfig) -> io::Result<Self> {
        fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            files: Mutex::new(HashMap::new()),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
        format: BatchFormat,
    ) -> io::Result<Self> {
        Self::new(name, FileTransportConfig::from_params(params, format))
    }

    /// Path a topic's records are appended to
    pub fn topic_path(&self, topic: &str) -> PathBuf {
        let file_name: String = topic
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '\0' => '_',
                c => c,
            })
            .collect();
        let file_name = if file_name.is_empty() {
            "_".to_string()
        } else {
            file_name
        };
        self.config.base_path.join(format!("{file_name}.log"))
    }

    fn append(&self, batch: &EncodedBatch) -> io::Result<()> {
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);

        if !files.contains_key(&batch.key.topic) {
            let path = self.topic_path(&batch.key.topic);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            debug!(transport = %self.name, path = %path.display(), "Topic file opened");
            files.insert(batch.key.topic.clone(), file);
        }
        let Some(file) = files.get_mut(&batch.key.topic) else {
            return Err(io::Error::other("topic file missing"));
        };

        let mut record = Vec::with_capacity(batch.payload.len() + 4);
        match self.config.framing {
            Framing::Lines => {
                record.extend_from_slice(&batch.payload);
                record.push(b'\n');
            }
            Framing::LengthPrefixed => {
                let len = u32::try_from(batch.payload.len())
                    .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "payload too large"))?;
                record.extend_from_slice(&len.to_le_bytes());
                record.extend_from_slice(&batch.payload);
            }
        }
        file.write_all(&record)?;
        file.flush()
    }
}

/// Map an io error onto the delivery taxonomy
pub(crate) fn classify(error: &io::Error) -> TransportError {
    match error.kind() {
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
            TransportError::retryable(error.to_string())
        }
        _ => TransportError::fatal(error.to_string()),
    }
}

impl Transport for FileTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_transport_deliver",
        skip(self, batch),
        fields(transport = %self.name, topic = %batch.key.topic)
    )]
    async fn deliver(&self, batch: &EncodedBatch) -> Result<(), TransportError> {
        self.append(batch).map_err(|e| classify(&e))
    }
}
