//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Offline queue could not be opened
    #[error("failed to open offline queue at '{path}': {message}")]
    QueueOpen { path: String, message: String },

    /// Error from the shared contracts (sink, storage)
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a queue open error
    pub fn queue_open(path: impl AsRef<std::path::Path>, message: impl Into<String>) -> Self {
        Self::QueueOpen {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }
}
