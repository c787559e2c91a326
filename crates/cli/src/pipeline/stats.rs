//! Run statistics.

use std::time::Duration;

use dispatcher::DeliverySnapshot;
use observability::EventStatsAggregator;

/// Statistics from an agent run
#[derive(Debug, Clone, Default)]
pub struct AgentStats {
    /// Samples read successfully
    pub samples_taken: u64,

    /// Ticks skipped because the sensor read failed or timed out
    pub sensor_errors: u64,

    /// The subset of `sensor_errors` that were timeouts
    pub sensor_timeouts: u64,

    /// Sensor re-initializations attempted
    pub sensor_reinits: u64,

    /// Events closed by the detector (including the shutdown flush)
    pub events_emitted: u64,

    /// Events handed to the sync worker over the live channel
    pub events_live: u64,

    /// Events written straight to the offline queue
    pub events_spilled: u64,

    /// Events that could not be stored anywhere
    pub events_lost: u64,

    /// Sync worker counters at exit
    pub delivery: DeliverySnapshot,

    /// Offline queue depth at exit
    pub final_queue_depth: usize,

    /// Total duration of the run
    pub duration: Duration,

    /// Configured sampling rate
    pub expected_rate_hz: f64,

    /// Event shape statistics
    pub event_stats: EventStatsAggregator,
}

impl AgentStats {
    /// Achieved sampling rate over the whole run
    pub fn actual_rate_hz(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.samples_taken as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== altimon run statistics ===\n");

        println!("Sampling");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Samples: {}", self.samples_taken);
        println!(
            "   ├─ Rate: {:.2} Hz (expected {:.2} Hz)",
            self.actual_rate_hz(),
            self.expected_rate_hz
        );
        println!(
            "   ├─ Sensor errors: {} ({} timeouts)",
            self.sensor_errors, self.sensor_timeouts
        );
        println!("   └─ Sensor re-initializations: {}", self.sensor_reinits);

        let summary = self.event_stats.summary();
        println!("\nEvents");
        println!("   ├─ Emitted: {}", self.events_emitted);
        println!("   ├─ Handed off live: {}", self.events_live);
        println!("   ├─ Spilled to offline queue: {}", self.events_spilled);
        println!("   ├─ Lost: {}", self.events_lost);
        println!("   ├─ Duration (s): {}", summary.duration_s);
        println!("   └─ Altitude span (m): {}", summary.span_m);

        println!("\nDelivery");
        println!("   ├─ Delivered: {}", self.delivery.delivered);
        println!("   ├─ Failed attempts: {}", self.delivery.failures);
        println!("   ├─ Data lost: {}", self.delivery.data_lost);
        println!("   └─ Offline queue depth: {}", self.final_queue_depth);

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actual_rate() {
        let stats = AgentStats {
            samples_taken: 50,
            duration: Duration::from_secs(10),
            ..Default::default()
        };
        assert!((stats.actual_rate_hz() - 5.0).abs() < 1e-9);
        assert_eq!(AgentStats::default().actual_rate_hz(), 0.0);
    }
}
