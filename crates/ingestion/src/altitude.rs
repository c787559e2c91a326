//! Barometric altitude conversion
//!
//! International barometric formula, valid in the troposphere.

/// Exponent of the pressure ratio (1 / 5.255)
const PRESSURE_EXPONENT: f64 = 0.1903;

/// Scale height term of the formula (meters)
const ALTITUDE_SCALE_M: f64 = 44_330.0;

/// Altitude above the reference level for a measured pressure
///
/// `altitude = 44330 * (1 - (p / p0)^0.1903)`
pub fn pressure_to_altitude(pressure_hpa: f64, sea_level_hpa: f64) -> f64 {
    ALTITUDE_SCALE_M * (1.0 - (pressure_hpa / sea_level_hpa).powf(PRESSURE_EXPONENT))
}

/// Pressure that corresponds to an altitude (inverse of [`pressure_to_altitude`])
pub fn altitude_to_pressure(altitude_m: f64, sea_level_hpa: f64) -> f64 {
    sea_level_hpa * (1.0 - altitude_m / ALTITUDE_SCALE_M).powf(1.0 / PRESSURE_EXPONENT)
}
