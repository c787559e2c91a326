//! LogSink - logs an event summary via tracing

use contracts::{ContractError, Event, EventSink};
use tracing::{info, instrument};

/// Sink that only logs (dry runs, bench setups)
///
/// Every delivery is acknowledged, so nothing reaches the offline queue.
pub struct LogSink {
    name: String,
    delivered: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delivered: 0,
        }
    }

    /// Events logged so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl EventSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_deliver",
        skip(self, event),
        fields(sink = %self.name, event_id = %event.id)
    )]
    async fn deliver(&mut self, event: &Event) -> Result<(), ContractError> {
        self.delivered += 1;
        info!(
            sink = %self.name,
            event_id = %event.id,
            device = %event.device,
            samples = event.sample_count(),
            duration_s = event.duration(),
            span_m = event.altitude_span(),
            "altitude event"
        );
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, delivered = self.delivered, "LogSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sink_acknowledges() {
        let mut sink = LogSink::new("test_log");
        let event = Event {
            id: "20250101000000-000000-000001".into(),
            sequence: 1,
            device: "dev".into(),
            trigger_time: 5.0,
            start_time: 0.0,
            end_time: 12.0,
            samples: Vec::new(),
        };

        assert!(sink.deliver(&event).await.is_ok());
        assert_eq!(sink.delivered(), 1);
        assert!(sink.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_log_sink_name() {
        let sink = LogSink::new("my_logger");
        assert_eq!(sink.name(), "my_logger");
    }
}
