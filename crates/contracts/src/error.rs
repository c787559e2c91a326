//! Layered error definitions
//!
//! Categorized by source: config / sensor / sink / queue

use thiserror::Error;

/// Unified error type
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

    // ===== Sensor Errors =====
    /// Sensor read failed (transient)
    #[error("sensor '{sensor_id}' read error: {message}")]
    SensorRead { sensor_id: String, message: String },

    /// Sensor read did not complete in time
    #[error("sensor '{sensor_id}' read timed out after {timeout_ms}ms")]
    SensorTimeout { sensor_id: String, timeout_ms: u64 },

    // ===== Sink Errors =====
    /// Sink delivery error (remote refused or failed to store)
    #[error("sink '{sink_name}' delivery error: {message}")]
    SinkDelivery { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== Offline Queue Errors =====
    /// Durable storage failure
    #[error("offline storage error at '{path}': {message}")]
    Storage { path: String, message: String },

    /// Stored record could not be decoded
    #[error("corrupt offline record '{path}': {message}")]
    CorruptRecord { path: String, message: String },

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

    /// Create sensor read error
    pub fn sensor_read(sensor_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SensorRead {
            sensor_id: sensor_id.into(),
            message: message.into(),
        }
    }

    /// Create sink delivery error
    pub fn sink_delivery(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkDelivery {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink connection error
    pub fn sink_connection(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkConnection {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create offline storage error
    pub fn storage(path: impl AsRef<std::path::Path>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    /// Create corrupt record error
    pub fn corrupt_record(path: impl AsRef<std::path::Path>, message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    /// Whether the failure is worth retrying later (remote side or transient sensor issue)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SensorRead { .. }
                | Self::SensorTimeout { .. }
                | Self::SinkDelivery { .. }
                | Self::SinkConnection { .. }
                | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_field() {
        let err = ContractError::config_validation("buffer.ring_buffer_seconds", "too small");
        let msg = err.to_string();
        assert!(msg.contains("buffer.ring_buffer_seconds"), "got: {msg}");
        assert!(msg.contains("too small"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ContractError::sink_connection("net", "refused").is_transient());
        assert!(ContractError::sensor_read("bmp280", "nack").is_transient());
        assert!(!ContractError::config_validation("x", "y").is_transient());
        assert!(!ContractError::corrupt_record("/tmp/a.json", "eof").is_transient());
    }
}
