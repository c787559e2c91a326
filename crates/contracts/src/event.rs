//! Event - Detector output, Dispatcher input
//!
//! An altitude-change event and its durable offline wrapper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{datetime_from_unix, Sample};

/// Detected altitude-change event
///
/// Created once when the detector closes a recording; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Locally generated id (`YYYYmmddHHMMSS-micros-sequence`), used as idempotency key
    pub id: String,

    /// Monotonic close order (defines global delivery order)
    pub sequence: u64,

    /// Device that recorded the event
    pub device: String,

    /// Time the detector left Idle (Unix seconds)
    pub trigger_time: f64,

    /// Earliest sample contained (Unix seconds, >= trigger_time - lookback)
    pub start_time: f64,

    /// Time the detector closed the recording (Unix seconds)
    pub end_time: f64,

    /// Samples ordered oldest-first
    pub samples: Vec<Sample>,
}

impl Event {
    /// Build the event id from its close time and sequence number
    pub fn make_id(closed_at: DateTime<Utc>, sequence: u64) -> String {
        format!(
            "{}-{:06}-{:06}",
            closed_at.format("%Y%m%d%H%M%S"),
            closed_at.timestamp_subsec_micros(),
            sequence
        )
    }

    /// Recording duration from trigger to close (seconds)
    pub fn duration(&self) -> f64 {
        (self.end_time - self.trigger_time).max(0.0)
    }

    /// Number of samples carried
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Largest absolute altitude excursion within the event (meters)
    pub fn altitude_span(&self) -> f64 {
        let mut iter = self.samples.iter().map(|s| s.altitude);
        let Some(first) = iter.next() else {
            return 0.0;
        };
        let (min, max) = iter.fold((first, first), |(lo, hi), a| (lo.min(a), hi.max(a)));
        max - min
    }

    /// Wall-clock close time
    pub fn closed_at(&self) -> DateTime<Utc> {
        datetime_from_unix(self.end_time)
    }
}

/// Event persisted in the offline queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineRecord {
    /// The undelivered event
    pub event: Event,

    /// When the event entered the queue
    pub enqueued_at: DateTime<Utc>,

    /// Failed delivery attempts so far
    pub attempt_count: u32,

    /// Most recent delivery error, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl OfflineRecord {
    /// Wrap an event that has not been delivered yet
    pub fn new(event: Event) -> Self {
        Self {
            event,
            enqueued_at: Utc::now(),
            attempt_count: 0,
            last_error: None,
        }
    }

    /// Record one more failed attempt
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.last_error = Some(error.into());
    }

    /// Event id shortcut
    pub fn id(&self) -> &str {
        &self.event.id
    }
}
