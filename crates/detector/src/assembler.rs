//! Event materialization.
//!
//! On trigger the assembler copies the lookback history out of the ring
//! buffer, then appends live samples until the detector closes the recording.
//! Events longer than the buffer window therefore stay complete.

use contracts::{datetime_from_unix, Event, Sample};
use tracing::debug;

use crate::ring_buffer::RingBuffer;

#[derive(Debug)]
struct OpenEvent {
    trigger_time: f64,
    samples: Vec<Sample>,
}

/// Builds `Event`s from buffered and live samples
#[derive(Debug)]
pub struct EventAssembler {
    device: String,
    lookback_seconds: f64,
    next_sequence: u64,
    open: Option<OpenEvent>,
}

impl EventAssembler {
    /// Create an assembler; `first_sequence` continues numbering across restarts
    pub fn new(device: impl Into<String>, lookback_seconds: f64, first_sequence: u64) -> Self {
        Self {
            device: device.into(),
            lookback_seconds,
            next_sequence: first_sequence,
            open: None,
        }
    }

    /// Start collecting for a recording triggered at `trigger_time`
    ///
    /// Copies every buffered sample in `[trigger_time - lookback, trigger_time]`.
    pub fn begin(&mut self, trigger_time: f64, buffer: &RingBuffer) {
        let since = trigger_time - self.lookback_seconds;
        let mut samples = buffer.snapshot(since);
        samples.retain(|s| s.timestamp <= trigger_time);
        debug!(
            trigger_time,
            lookback_samples = samples.len(),
            "event assembly started"
        );
        self.open = Some(OpenEvent {
            trigger_time,
            samples,
        });
    }

    /// Append a live sample to the open recording (no-op when none is open)
    pub fn record(&mut self, sample: Sample) {
        if let Some(open) = self.open.as_mut() {
            open.samples.push(sample);
        }
    }

    /// Whether a recording is being collected
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Sequence number the next event will get
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Close the open recording at `end_time` and produce its Event
    pub fn finish(&mut self, end_time: f64) -> Option<Event> {
        let OpenEvent {
            trigger_time,
            mut samples,
        } = self.open.take()?;

        samples.retain(|s| s.timestamp <= end_time);
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let start_time = samples
            .first()
            .map(|s| s.timestamp)
            .unwrap_or(trigger_time);

        Some(Event {
            id: Event::make_id(datetime_from_unix(end_time), sequence),
            sequence,
            device: self.device.clone(),
            trigger_time,
            start_time,
            end_time,
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_buffer(until: usize, window: f64) -> RingBuffer {
        let mut buffer = RingBuffer::new(window);
        for i in 0..=until {
            buffer.push(Sample::new(i as f64, 1000.0, i as f64, 20.0));
        }
        buffer
    }

    #[test]
    fn test_lookback_clipped_to_buffer() {
        let buffer = filled_buffer(10, 100.0);
        let mut assembler = EventAssembler::new("dev", 60.0, 1);
        assembler.begin(10.0, &buffer);
        let event = assembler.finish(10.0).unwrap();
        assert_eq!(event.start_time, 0.0);
        assert_eq!(event.sample_count(), 11);
    }

    #[test]
    fn test_window_bounds_are_exact() {
        let buffer = filled_buffer(100, 200.0);
        let mut assembler = EventAssembler::new("dev", 60.0, 1);
        assembler.begin(90.0, &buffer);
        // live samples arrive after the trigger
        for ts in [91.0, 92.0, 93.0] {
            assembler.record(Sample::new(ts, 1000.0, 0.0, 20.0));
        }
        let event = assembler.finish(92.0).unwrap();
        let first = event.samples.first().unwrap().timestamp;
        let last = event.samples.last().unwrap().timestamp;
        assert_eq!(first, 30.0);
        assert_eq!(last, 92.0);
        assert!(event
            .samples
            .iter()
            .all(|s| s.timestamp >= 30.0 && s.timestamp <= 92.0));
        assert_eq!(event.trigger_time, 90.0);
    }

    #[test]
    fn test_sequence_and_id() {
        let buffer = filled_buffer(3, 10.0);
        let mut assembler = EventAssembler::new("pi-7", 60.0, 41);
        assembler.begin(3.0, &buffer);
        let first = assembler.finish(3.0).unwrap();
        assembler.begin(3.0, &buffer);
        let second = assembler.finish(3.0).unwrap();
        assert_eq!(first.sequence, 41);
        assert_eq!(second.sequence, 42);
        assert_eq!(first.device, "pi-7");
        assert!(first.id.ends_with("-000041"));
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_finish_without_begin() {
        let mut assembler = EventAssembler::new("dev", 60.0, 1);
        assembler.record(Sample::new(1.0, 1000.0, 0.0, 20.0));
        assert!(assembler.finish(1.0).is_none());
        assert_eq!(assembler.next_sequence(), 1);
    }
}
