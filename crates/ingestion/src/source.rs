//! Source selection from configuration

use std::path::Path;

use contracts::{ContractError, RawReading, SensorConfig, SensorSource, SourceKind};
use tracing::info;

use crate::error::{IngestionError, Result};
use crate::mock::{MockBarometer, MockBarometerConfig};
use crate::replay::ReplaySensor;

/// Sensor source chosen by `sensor.source`
pub enum BarometerSource {
    Mock(MockBarometer),
    Replay(ReplaySensor),
}

impl BarometerSource {
    /// Build the configured source
    ///
    /// # Errors
    /// Malformed source parameters or an unreadable replay file
    pub fn from_config(config: &SensorConfig) -> Result<Self> {
        let source = match config.source {
            SourceKind::Mock => {
                let mock = MockBarometerConfig::from_params(
                    &config.id,
                    config.sea_level_pressure,
                    &config.params,
                )?;
                Self::Mock(MockBarometer::new(mock))
            }
            SourceKind::Replay => {
                let path = config.params.get("path").ok_or_else(|| {
                    IngestionError::invalid_param("path", "replay needs a file path")
                })?;
                let looping = config
                    .params
                    .get("loop")
                    .map(|v| v == "true")
                    .unwrap_or(false);
                Self::Replay(ReplaySensor::load(&config.id, Path::new(path), looping)?)
            }
        };

        info!(
            sensor_id = %config.id,
            source = ?config.source,
            i2c_address = %format!("{:#04x}", config.i2c_address),
            "sensor source created"
        );
        Ok(source)
    }
}

impl SensorSource for BarometerSource {
    fn sensor_id(&self) -> &str {
        match self {
            Self::Mock(s) => s.sensor_id(),
            Self::Replay(s) => s.sensor_id(),
        }
    }

    async fn read(&mut self) -> std::result::Result<RawReading, ContractError> {
        match self {
            Self::Mock(s) => s.read().await,
            Self::Replay(s) => s.read().await,
        }
    }

    async fn reinitialize(&mut self) -> std::result::Result<(), ContractError> {
        match self {
            Self::Mock(s) => s.reinitialize().await,
            Self::Replay(s) => s.reinitialize().await,
        }
    }
}
