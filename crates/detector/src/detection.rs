//! DetectionCore - buffer, detector and assembler driven by one sample stream

use contracts::{AgentBlueprint, Event, Sample};
use tracing::{info, warn};

use crate::assembler::EventAssembler;
use crate::change::{ChangeDetector, DetectorPhase, Transition};
use crate::ring_buffer::RingBuffer;

/// Detection pipeline owned by the sampling loop
#[derive(Debug)]
pub struct DetectionCore {
    buffer: RingBuffer,
    detector: ChangeDetector,
    assembler: EventAssembler,
}

impl DetectionCore {
    /// Build from configuration; `first_sequence` continues event numbering
    pub fn new(blueprint: &AgentBlueprint, first_sequence: u64) -> Self {
        Self {
            buffer: RingBuffer::new(blueprint.buffer.ring_buffer_seconds),
            detector: ChangeDetector::new(blueprint.detection.clone()),
            assembler: EventAssembler::new(
                &blueprint.device.name,
                blueprint.detection.lookback_seconds,
                first_sequence,
            ),
        }
    }

    /// Feed one sample; returns an Event when a recording closes
    pub fn ingest(&mut self, sample: Sample) -> Option<Event> {
        if !self.buffer.push(sample) {
            warn!(
                timestamp = sample.timestamp,
                newest = self.buffer.newest().map(|s| s.timestamp),
                "out-of-order sample ignored"
            );
            return None;
        }

        let transition = self.detector.on_sample(&sample, &self.buffer);
        metrics::gauge!("altimon_detector_phase").set(self.detector.phase().code());

        match transition {
            Transition::None => {
                self.assembler.record(sample);
                None
            }
            Transition::Triggered { trigger_time } => {
                info!(trigger_time, altitude = sample.altitude, "recording started");
                self.assembler.begin(trigger_time, &self.buffer);
                None
            }
            Transition::Closed { end_time, .. } => {
                self.assembler.record(sample);
                self.close(end_time)
            }
        }
    }

    /// Close any in-flight recording at the newest sample (shutdown flush)
    pub fn finish(&mut self) -> Option<Event> {
        let end_time = self.buffer.newest()?.timestamp;
        match self.detector.finish(end_time) {
            Transition::Closed { end_time, .. } => self.close(end_time),
            _ => None,
        }
    }

    fn close(&mut self, end_time: f64) -> Option<Event> {
        let event = self.assembler.finish(end_time)?;
        info!(
            event_id = %event.id,
            sequence = event.sequence,
            samples = event.sample_count(),
            duration_s = event.duration(),
            altitude_span_m = event.altitude_span(),
            "event closed"
        );
        metrics::counter!("altimon_events_emitted_total").increment(1);
        metrics::histogram!("altimon_event_duration_seconds").record(event.duration());
        Some(event)
    }

    /// Current detector phase
    pub fn phase(&self) -> DetectorPhase {
        self.detector.phase()
    }

    /// Sample history
    pub fn buffer(&self) -> &RingBuffer {
        &self.buffer
    }

    /// Sequence number of the next event
    pub fn next_sequence(&self) -> u64 {
        self.assembler.next_sequence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::DetectionConfig;

    const RATE_HZ: f64 = 5.0;

    fn scenario_blueprint() -> AgentBlueprint {
        let mut blueprint = AgentBlueprint::default();
        blueprint.device.name = "scenario".into();
        blueprint.detection = DetectionConfig {
            threshold_meters: 1.0,
            comparison_window_seconds: 5.0,
            stabilization_time_seconds: 5.0,
            lookback_seconds: 60.0,
        };
        blueprint.buffer.ring_buffer_seconds = 65.0;
        blueprint
    }

    /// 0.0 m for 5 s, 2.0 m for 10 s, 0.1 m for 6 s at 5 Hz
    fn scenario_samples() -> Vec<Sample> {
        let segments = [(0.0, 25usize), (2.0, 50), (0.1, 30)];
        let mut samples = Vec::new();
        let mut tick = 0usize;
        for (altitude, count) in segments {
            for _ in 0..count {
                samples.push(Sample::new(tick as f64 / RATE_HZ, 1013.25, altitude, 20.0));
                tick += 1;
            }
        }
        samples
    }

    #[test]
    fn test_scenario_yields_exactly_one_event() {
        let mut core = DetectionCore::new(&scenario_blueprint(), 1);
        let mut events = Vec::new();
        let mut trigger_phase_at = None;

        for sample in scenario_samples() {
            events.extend(core.ingest(sample));
            if trigger_phase_at.is_none() && core.phase() != DetectorPhase::Idle {
                trigger_phase_at = Some(sample.timestamp);
            }
        }
        assert!(events.is_empty(), "closed early: {events:?}");
        assert!((trigger_phase_at.unwrap() - 5.0).abs() < 1e-9);

        events.extend(core.finish());
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert!((event.trigger_time - 5.0).abs() < 1e-9);
        assert!((event.end_time - 20.8).abs() < 1e-9);
        // lookback reaches the start of the buffer
        assert_eq!(event.start_time, 0.0);
        assert_eq!(event.sample_count(), 105);
        assert!(event
            .samples
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(core.phase(), DetectorPhase::Idle);
        assert!(core.finish().is_none());
    }

    #[test]
    fn test_quiet_tail_closes_at_stabilization_tick() {
        let mut core = DetectionCore::new(&scenario_blueprint(), 7);
        let mut samples = scenario_samples();
        // extend the 0.1 m plateau long enough to stabilize
        let last_tick = samples.len();
        for tick in last_tick..=last_tick + 20 {
            samples.push(Sample::new(tick as f64 / RATE_HZ, 1013.25, 0.1, 20.0));
        }

        let events: Vec<Event> = samples.into_iter().filter_map(|s| core.ingest(s)).collect();
        assert_eq!(events.len(), 1);
        // quiet from 20.0 s (reference reaches the 0.1 m plateau), closes 5 s later
        assert!((events[0].end_time - 25.0).abs() < 1e-9, "{}", events[0].end_time);
        assert_eq!(events[0].sequence, 7);
        assert_eq!(core.next_sequence(), 8);
    }

    #[test]
    fn test_out_of_order_sample_does_not_advance() {
        let mut core = DetectionCore::new(&scenario_blueprint(), 1);
        core.ingest(Sample::new(10.0, 1013.25, 0.0, 20.0));
        assert!(core.ingest(Sample::new(9.0, 1013.25, 50.0, 20.0)).is_none());
        assert_eq!(core.buffer().len(), 1);
        assert_eq!(core.phase(), DetectorPhase::Idle);
    }
}
