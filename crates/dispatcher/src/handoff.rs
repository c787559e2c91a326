//! EventHandoff - producer side of the live channel
//!
//! The sampling loop must never block on delivery. Events go to the sync
//! worker over a bounded channel; when it is full (or the worker is gone)
//! they spill to the offline queue instead.

use std::sync::Arc;

use contracts::Event;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

use crate::metrics::DeliveryMetrics;
use crate::queue::{EnqueueOutcome, OfflineQueue, DATA_LOSS_TARGET};

/// Where a submitted event ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// Accepted by the live channel
    Live,
    /// Written to the offline queue
    Spilled,
    /// Could not be stored anywhere (logged on the data-loss target)
    Lost,
}

/// Non-blocking event submission
#[derive(Debug, Clone)]
pub struct EventHandoff {
    tx: mpsc::Sender<Event>,
    queue: OfflineQueue,
    metrics: Arc<DeliveryMetrics>,
}

impl EventHandoff {
    /// Create a handoff and the receiving end for the worker
    pub fn channel(
        capacity: usize,
        queue: OfflineQueue,
        metrics: Arc<DeliveryMetrics>,
    ) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, queue, metrics }, rx)
    }

    /// Submit an event without waiting
    pub fn submit(&self, event: Event) -> HandoffOutcome {
        let event = match self.tx.try_send(event) {
            Ok(()) => {
                self.metrics.inc_handed_off();
                return HandoffOutcome::Live;
            }
            Err(TrySendError::Full(event)) => {
                debug!(event_id = %event.id, "handoff channel full, spilling to offline queue");
                event
            }
            Err(TrySendError::Closed(event)) => {
                warn!(event_id = %event.id, "sync worker gone, spilling to offline queue");
                event
            }
        };

        let event_id = event.id.clone();
        match self.queue.enqueue(event) {
            Ok(EnqueueOutcome::Dropped) => HandoffOutcome::Lost,
            Ok(_) => {
                self.metrics.inc_spilled();
                metrics::counter!("altimon_events_spilled_total").increment(1);
                HandoffOutcome::Spilled
            }
            Err(e) => {
                error!(
                    target: DATA_LOSS_TARGET,
                    event_id = %event_id,
                    error = %e,
                    "event could not be stored offline and was dropped"
                );
                self.metrics.inc_data_lost();
                metrics::counter!("altimon_data_loss_total").increment(1);
                HandoffOutcome::Lost
            }
        }
    }

    /// Offline queue behind this handoff
    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn event(sequence: u64) -> Event {
        Event {
            id: format!("20250101000000-000000-{sequence:06}"),
            sequence,
            device: "dev".into(),
            trigger_time: 1.0,
            start_time: 0.0,
            end_time: 2.0,
            samples: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_spills_when_channel_full() {
        let dir = tempdir().unwrap();
        let metrics = Arc::new(DeliveryMetrics::new());
        let queue = OfflineQueue::open(dir.path(), 10, "dev", Arc::clone(&metrics)).unwrap();
        let (handoff, mut rx) = EventHandoff::channel(1, queue.clone(), Arc::clone(&metrics));

        assert_eq!(handoff.submit(event(1)), HandoffOutcome::Live);
        assert_eq!(handoff.submit(event(2)), HandoffOutcome::Spilled);
        assert_eq!(rx.recv().await.unwrap().sequence, 1);
        assert_eq!(queue.count(), 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.handed_off, 1);
        assert_eq!(snapshot.spilled, 1);
    }

    #[tokio::test]
    async fn test_spills_when_worker_gone() {
        let dir = tempdir().unwrap();
        let metrics = Arc::new(DeliveryMetrics::new());
        let queue = OfflineQueue::open(dir.path(), 10, "dev", Arc::clone(&metrics)).unwrap();
        let (handoff, rx) = EventHandoff::channel(4, queue.clone(), metrics);
        drop(rx);

        assert_eq!(handoff.submit(event(7)), HandoffOutcome::Spilled);
        assert_eq!(queue.next_sequence(), 8);
    }
}
