//! Replay sensor - plays back recorded raw readings
//!
//! Reads a JSON-lines file, one `{"pressure_hpa": .., "temperature_c": ..}`
//! object per line, and returns one reading per `read` call.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use contracts::{ContractError, RawReading, SensorSource};
use tracing::{debug, info};

use crate::error::{IngestionError, Result};

/// Replay sensor
pub struct ReplaySensor {
    sensor_id: String,
    readings: Vec<RawReading>,
    cursor: usize,
    looping: bool,
}

impl ReplaySensor {
    /// Load readings from a JSON-lines file
    ///
    /// Blank lines and lines starting with `#` are skipped.
    pub fn load(sensor_id: impl Into<String>, path: &Path, looping: bool) -> Result<Self> {
        let sensor_id = sensor_id.into();
        let file = File::open(path).map_err(|source| IngestionError::ReplayLoad {
            path: path.to_path_buf(),
            source,
        })?;

        let mut readings = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| IngestionError::ReplayLoad {
                path: path.to_path_buf(),
                source,
            })?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let reading: RawReading =
                serde_json::from_str(line).map_err(|e| IngestionError::ReplayParse {
                    line: idx + 1,
                    message: e.to_string(),
                })?;
            readings.push(reading);
        }

        info!(
            sensor_id = %sensor_id,
            path = %path.display(),
            readings = readings.len(),
            looping,
            "Loaded replay sensor"
        );

        Ok(Self::from_readings(sensor_id, readings, looping))
    }

    /// Replay an in-memory sequence
    pub fn from_readings(
        sensor_id: impl Into<String>,
        readings: Vec<RawReading>,
        looping: bool,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            readings,
            cursor: 0,
            looping,
        }
    }

    /// Readings left before the end of the recording
    pub fn remaining(&self) -> usize {
        self.readings.len().saturating_sub(self.cursor)
    }
}

impl SensorSource for ReplaySensor {
    fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    async fn read(&mut self) -> std::result::Result<RawReading, ContractError> {
        if self.cursor >= self.readings.len() {
            if !self.looping || self.readings.is_empty() {
                return Err(ContractError::sensor_read(&self.sensor_id, "replay exhausted"));
            }
            debug!(sensor_id = %self.sensor_id, "replay wrapped around");
            self.cursor = 0;
        }

        let reading = self.readings[self.cursor];
        self.cursor += 1;
        Ok(reading)
    }

    async fn reinitialize(&mut self) -> std::result::Result<(), ContractError> {
        Ok(())
    }
}
