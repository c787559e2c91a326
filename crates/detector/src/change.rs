//! Altitude-change state machine.
//!
//! Compares each new sample against the buffered sample closest to
//! `now - comparison_window_seconds`. A delta of at least `threshold_meters`
//! starts (or extends) a recording; a continuous quiet period of
//! `stabilization_time_seconds` closes it.

use contracts::{DetectionConfig, Sample};
use tracing::{debug, trace};

use crate::ring_buffer::RingBuffer;

/// Slack for float comparisons on timestamps built from a fixed tick
pub const TIME_EPSILON: f64 = 1e-6;

/// Detector state
///
/// Stabilizing is folded into `Recording` as `quiet_since`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DetectorState {
    #[default]
    Idle,
    Recording {
        /// When the detector left Idle
        trigger_time: f64,
        /// Most recent sample beyond threshold
        last_significant_time: f64,
        /// First sample of the current quiet run, if any
        quiet_since: Option<f64>,
    },
}

/// Externally visible phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPhase {
    Idle,
    Recording,
    Stabilizing,
}

impl DetectorPhase {
    /// Numeric code for gauges
    pub fn code(self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::Recording => 1.0,
            Self::Stabilizing => 2.0,
        }
    }
}

/// Result of feeding one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Nothing to report
    None,
    /// Idle -> Recording
    Triggered { trigger_time: f64 },
    /// Recording closed, back to Idle
    Closed { trigger_time: f64, end_time: f64 },
}

/// Change detector
///
/// Holds only state-machine state; the ring buffer is passed in by the
/// sampling loop that owns it.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    config: DetectionConfig,
    state: DetectorState,
}

impl ChangeDetector {
    /// Create a detector in Idle
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            state: DetectorState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Current phase
    pub fn phase(&self) -> DetectorPhase {
        match self.state {
            DetectorState::Idle => DetectorPhase::Idle,
            DetectorState::Recording {
                quiet_since: None, ..
            } => DetectorPhase::Recording,
            DetectorState::Recording {
                quiet_since: Some(_),
                ..
            } => DetectorPhase::Stabilizing,
        }
    }

    /// Detection parameters
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Altitude of the reference sample for `now`
    ///
    /// `None` while the buffer does not yet reach back a full comparison window.
    pub fn reference_altitude(&self, now: f64, buffer: &RingBuffer) -> Option<f64> {
        let target = now - self.config.comparison_window_seconds;
        let oldest = buffer.oldest()?;
        if oldest.timestamp > target + TIME_EPSILON {
            return None;
        }
        buffer.closest_to(target).map(|s| s.altitude)
    }

    /// Advance the state machine with `sample`
    ///
    /// `buffer` must already contain `sample`.
    pub fn on_sample(&mut self, sample: &Sample, buffer: &RingBuffer) -> Transition {
        let now = sample.timestamp;
        let Some(reference) = self.reference_altitude(now, buffer) else {
            trace!(now, "reference not available yet");
            return Transition::None;
        };
        let delta = sample.altitude - reference;
        let significant = delta.abs() >= self.config.threshold_meters;

        match self.state {
            DetectorState::Idle => {
                if significant {
                    debug!(trigger_time = now, delta, "altitude change detected");
                    self.state = DetectorState::Recording {
                        trigger_time: now,
                        last_significant_time: now,
                        quiet_since: None,
                    };
                    Transition::Triggered { trigger_time: now }
                } else {
                    Transition::None
                }
            }
            DetectorState::Recording {
                trigger_time,
                last_significant_time,
                quiet_since,
            } => {
                if significant {
                    if quiet_since.is_some() {
                        trace!(now, delta, "quiet period interrupted");
                    }
                    self.state = DetectorState::Recording {
                        trigger_time,
                        last_significant_time: now,
                        quiet_since: None,
                    };
                    return Transition::None;
                }

                let quiet_since = quiet_since.unwrap_or(now);
                if now - quiet_since + TIME_EPSILON >= self.config.stabilization_time_seconds {
                    debug!(
                        trigger_time,
                        end_time = now,
                        last_significant_time,
                        "altitude stabilized"
                    );
                    self.state = DetectorState::Idle;
                    Transition::Closed {
                        trigger_time,
                        end_time: now,
                    }
                } else {
                    self.state = DetectorState::Recording {
                        trigger_time,
                        last_significant_time,
                        quiet_since: Some(quiet_since),
                    };
                    Transition::None
                }
            }
        }
    }

    /// Close an in-flight recording at `end_time` (shutdown flush)
    pub fn finish(&mut self, end_time: f64) -> Transition {
        match std::mem::take(&mut self.state) {
            DetectorState::Idle => Transition::None,
            DetectorState::Recording { trigger_time, .. } => {
                debug!(trigger_time, end_time, "recording closed by shutdown");
                Transition::Closed {
                    trigger_time,
                    end_time: end_time.max(trigger_time),
                }
            }
        }
    }
}
