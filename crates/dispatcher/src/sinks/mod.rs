//! Sink implementations
//!
//! Contains LogSink, FileSink, and NetworkSink, plus the factory that picks
//! one from configuration.

mod file;
mod log;
mod network;

use contracts::{AgentBlueprint, ContractError, Event, EventSink, SinkType};
use tracing::instrument;

use crate::error::DispatcherError;

pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;
pub use self::network::{
    decode_payload, encode_frame, Envelope, NetworkFormat, NetworkSink, NetworkSinkConfig, ACK,
    NAK,
};

/// The sink selected by configuration
pub enum ConfiguredSink {
    Log(LogSink),
    File(FileSink),
    Network(NetworkSink),
}

impl EventSink for ConfiguredSink {
    fn name(&self) -> &str {
        match self {
            Self::Log(sink) => sink.name(),
            Self::File(sink) => sink.name(),
            Self::Network(sink) => sink.name(),
        }
    }

    async fn deliver(&mut self, event: &Event) -> Result<(), ContractError> {
        match self {
            Self::Log(sink) => sink.deliver(event).await,
            Self::File(sink) => sink.deliver(event).await,
            Self::Network(sink) => sink.deliver(event).await,
        }
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        match self {
            Self::Log(sink) => sink.close().await,
            Self::File(sink) => sink.close().await,
            Self::Network(sink) => sink.close().await,
        }
    }
}

/// Create the configured sink
#[instrument(
    name = "dispatcher_create_sink",
    skip(blueprint),
    fields(sink = %blueprint.sink.name, sink_type = ?blueprint.sink.sink_type)
)]
pub fn create_sink(blueprint: &AgentBlueprint) -> Result<ConfiguredSink, DispatcherError> {
    let config = &blueprint.sink;
    match config.sink_type {
        SinkType::Log => Ok(ConfiguredSink::Log(LogSink::new(&config.name))),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(ConfiguredSink::File(sink))
        }
        SinkType::Network => {
            let sink = NetworkSink::from_blueprint(blueprint)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(ConfiguredSink::Network(sink))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_each_type() {
        let mut blueprint = AgentBlueprint::default();
        assert!(matches!(
            create_sink(&blueprint).unwrap(),
            ConfiguredSink::Network(_)
        ));

        blueprint.sink.sink_type = SinkType::Log;
        assert!(matches!(create_sink(&blueprint).unwrap(), ConfiguredSink::Log(_)));

        let dir = tempdir().unwrap();
        blueprint.sink.sink_type = SinkType::File;
        blueprint
            .sink
            .params
            .insert("path".into(), dir.path().display().to_string());
        let sink = create_sink(&blueprint).unwrap();
        assert_eq!(sink.name(), "remote");
    }

    #[test]
    fn test_file_sink_requires_path() {
        let mut blueprint = AgentBlueprint::default();
        blueprint.sink.sink_type = SinkType::File;
        assert!(matches!(
            create_sink(&blueprint),
            Err(DispatcherError::SinkCreation { .. })
        ));
    }
}
