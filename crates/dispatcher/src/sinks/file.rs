//! FileSink - writes each event to `<base_path>/<device>/<event id>.json`

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use contracts::{ContractError, Event, EventSink};
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Store root
    pub base_path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let base_path = params
            .get("path")
            .map(PathBuf::from)
            .ok_or_else(|| "missing 'path' parameter".to_string())?;
        Ok(Self { base_path })
    }
}

/// Sink that stores events as JSON documents
///
/// The rename of the finished file is the acknowledgment. Re-delivering an
/// event overwrites the same file, so duplicates collapse on the id.
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
}

impl FileSink {
    /// Create a new FileSink
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.base_path)?;
        Ok(Self {
            name: name.into(),
            config,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config =
            FileSinkConfig::from_params(params).map_err(|e| ContractError::sink_connection(&name, e))?;
        Self::new(name.clone(), config).map_err(|e| ContractError::sink_connection(name, e.to_string()))
    }

    /// Where an event is stored
    pub fn event_path(&self, event: &Event) -> PathBuf {
        self.config
            .base_path
            .join(&event.device)
            .join(format!("{}.json", event.id))
    }

    fn persist(&self, event: &Event) -> std::io::Result<PathBuf> {
        let path = self.event_path(event);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_vec_pretty(event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        write_then_rename(&path, &data)?;
        Ok(path)
    }
}

fn write_then_rename(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

impl EventSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_deliver",
        skip(self, event),
        fields(sink = %self.name, event_id = %event.id)
    )]
    async fn deliver(&mut self, event: &Event) -> Result<(), ContractError> {
        match self.persist(event) {
            Ok(path) => {
                debug!(path = %path.display(), "event stored");
                Ok(())
            }
            Err(e) => {
                error!(sink = %self.name, event_id = %event.id, error = %e, "Write failed");
                Err(ContractError::sink_delivery(&self.name, e.to_string()))
            }
        }
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}
