//! SensorSource trait - barometer abstraction
//!
//! Decouples the sampling loop from the concrete driver (bus I/O is external).
//! Mock, replay and hardware-backed sources all implement this trait.

use crate::{ContractError, RawReading};

/// Pull-based sensor data source
///
/// The sampling loop calls `read` once per tick. A failed read is transient:
/// the tick is skipped and the detector is not advanced.
///
/// # Example
///
/// ```ignore
/// let mut sensor = MockBarometer::constant("bench", 1013.25, 120.0);
/// let reading = sensor.read().await?;
/// println!("{} hPa", reading.pressure_hpa);
/// ```
#[trait_variant::make(SensorSource: Send)]
pub trait LocalSensorSource {
    /// Sensor identity (bus address or logical name)
    fn sensor_id(&self) -> &str;

    /// Read one raw pressure/temperature pair
    ///
    /// # Errors
    /// Returns a transient read error; the caller retries on the next tick
    async fn read(&mut self) -> Result<RawReading, ContractError>;

    /// Re-initialize the underlying device after repeated failures
    ///
    /// Sources without device state return `Ok(())` immediately.
    async fn reinitialize(&mut self) -> Result<(), ContractError>;
}
