//! # Contracts
//!
//! Frozen interface contracts shared by every altimon crate: sample and event
//! data structures, the agent configuration blueprint, and the traits at the
//! two external seams (sensor in, remote sink out).
//! Business crates depend only on this crate; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Sample timestamps are Unix seconds (`f64`): the wall clock read once when
//!   sampling starts, advanced by the monotonic clock from then on
//! - Ordering inside the agent relies on arrival order, never on re-sorting

mod blueprint;
mod error;
mod event;
mod sample;
mod sensor_source;
mod sink;

pub use blueprint::*;
pub use error::*;
pub use event::*;
pub use sample::*;
pub use sensor_source::{LocalSensorSource, SensorSource};
pub use sink::*;

/// Log target for dropped telemetry
///
/// Every record that leaves the agent without reaching the remote store is
/// logged at error level on this target, whatever the configured verbosity.
pub const DATA_LOSS_TARGET: &str = "altimon::data_loss";
