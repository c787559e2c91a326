//! # Ingestion
//!
//! Barometer sampling front end.
//!
//! Responsibilities:
//! - Convert pressure to altitude (international barometric formula)
//! - Provide hardware-free sources (mock profile, JSON-lines replay)
//! - Read a source under a timeout and stamp each `Sample` with wall-clock time
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{BarometerSource, SensorReader};
//!
//! let source = BarometerSource::from_config(&blueprint.sensor)?;
//! let mut reader = SensorReader::new(
//!     source,
//!     blueprint.sensor.sea_level_pressure,
//!     blueprint.sensor.read_timeout(),
//! );
//! let sample = reader.sample().await?;
//! println!("{:.2} m", sample.altitude);
//! ```

mod altitude;
mod error;
mod mock;
mod reader;
mod replay;
mod source;

// Re-exports
pub use altitude::{altitude_to_pressure, pressure_to_altitude};
pub use error::{IngestionError, Result};
pub use mock::{AltitudeProfile, MockBarometer, MockBarometerConfig};
pub use reader::{ReaderMetrics, ReaderSnapshot, SensorReader};
pub use replay::ReplaySensor;
pub use source::BarometerSource;
