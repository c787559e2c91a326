//! SyncWorker - drains events to the remote sink in close order
//!
//! Queued records always go first. While the offline queue is non-empty,
//! live events are moved behind them so that delivery order matches the
//! order in which detection closed the events.

use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{AgentBlueprint, ContractError, Event, EventSink, OfflineRecord, RetryPolicy};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::backoff::Backoff;
use crate::metrics::{DeliveryMetrics, DeliverySnapshot};
use crate::queue::{OfflineQueue, DATA_LOSS_TARGET};

/// Slack on top of the sink's own connect and ack timeouts
const DELIVERY_MARGIN: Duration = Duration::from_secs(1);

/// Worker tuning
#[derive(Debug, Clone)]
pub struct SyncWorkerConfig {
    /// Longest wait for a live event before re-checking the queue
    pub idle_poll: Duration,
    /// Upper bound for one delivery attempt
    pub delivery_timeout: Duration,
    /// Delay schedule after failed attempts
    pub retry: RetryPolicy,
}

impl SyncWorkerConfig {
    /// Derive from the agent configuration
    pub fn from_blueprint(blueprint: &AgentBlueprint) -> Self {
        let db = &blueprint.database;
        Self {
            idle_poll: blueprint.runtime.idle_poll(),
            delivery_timeout: Duration::from_secs_f64(
                db.connect_timeout_seconds + db.ack_timeout_seconds,
            ) + DELIVERY_MARGIN,
            retry: db.retry_policy(),
        }
    }
}

enum Pending {
    Live(Event),
    Queued(OfflineRecord),
}

impl Pending {
    fn event(&self) -> &Event {
        match self {
            Self::Live(event) => event,
            Self::Queued(record) => &record.event,
        }
    }

    fn origin(&self) -> &'static str {
        match self {
            Self::Live(_) => "live",
            Self::Queued(_) => "queued",
        }
    }
}

enum Wait {
    Event(Event),
    Idle,
    Stop,
}

/// Delivery loop for one sink
pub struct SyncWorker<S> {
    sink: S,
    queue: OfflineQueue,
    rx: mpsc::Receiver<Event>,
    shutdown: watch::Receiver<bool>,
    config: SyncWorkerConfig,
    metrics: Arc<DeliveryMetrics>,
    backoff: Backoff,
}

impl<S: EventSink + Send + 'static> SyncWorker<S> {
    /// Create a worker
    pub fn new(
        sink: S,
        queue: OfflineQueue,
        rx: mpsc::Receiver<Event>,
        shutdown: watch::Receiver<bool>,
        config: SyncWorkerConfig,
        metrics: Arc<DeliveryMetrics>,
    ) -> Self {
        let backoff = Backoff::new(config.retry);
        Self {
            sink,
            queue,
            rx,
            shutdown,
            config,
            metrics,
            backoff,
        }
    }

    /// Spawn the worker as a background task
    pub fn spawn(self) -> JoinHandle<DeliverySnapshot> {
        tokio::spawn(self.run())
    }

    /// Run until shutdown is signalled (or the producer is gone and nothing is queued)
    ///
    /// A delivery in progress when shutdown arrives is allowed to finish.
    /// Events still in the live channel on exit are moved to the offline queue.
    #[instrument(name = "sync_worker_run", skip_all, fields(sink = %self.sink.name()))]
    pub async fn run(mut self) -> DeliverySnapshot {
        info!(queued = self.queue.count(), "sync worker started");

        loop {
            if *self.shutdown.borrow() {
                debug!("shutdown observed");
                break;
            }

            if !self.queue.is_empty() {
                self.absorb_live();
            }

            let pending = match self.queue.peek_oldest() {
                Ok(Some(record)) => Pending::Queued(record),
                Ok(None) => match self.wait_live().await {
                    Wait::Event(event) => Pending::Live(event),
                    Wait::Idle => continue,
                    Wait::Stop => break,
                },
                Err(e) => {
                    warn!(error = %e, "offline queue unreadable, retrying");
                    if !self.pause(self.config.idle_poll).await {
                        break;
                    }
                    continue;
                }
            };

            if !self.attempt(pending).await {
                break;
            }
        }

        self.absorb_live();
        if let Err(e) = self.sink.close().await {
            warn!(error = %e, "sink close failed");
        }

        let snapshot = self.metrics.snapshot();
        info!(
            delivered = snapshot.delivered,
            failures = snapshot.failures,
            queued = snapshot.queue_depth,
            "sync worker stopped"
        );
        snapshot
    }

    /// Deliver one event; returns `false` when shutdown interrupted the backoff
    async fn attempt(&mut self, pending: Pending) -> bool {
        let event = pending.event();
        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.config.delivery_timeout,
            self.sink.deliver(event),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ContractError::sink_delivery(
                self.sink.name(),
                format!(
                    "no acknowledgement within {}ms",
                    self.config.delivery_timeout.as_millis()
                ),
            )),
        };

        match result {
            Ok(()) => {
                self.metrics.inc_delivered();
                metrics::counter!(
                    "altimon_deliveries_total",
                    "sink" => self.sink.name().to_string(),
                    "status" => "ok"
                )
                .increment(1);
                metrics::histogram!("altimon_delivery_latency_seconds")
                    .record(started.elapsed().as_secs_f64());
                info!(
                    event_id = %event.id,
                    sequence = event.sequence,
                    origin = pending.origin(),
                    "event delivered"
                );

                if let Pending::Queued(record) = &pending {
                    if let Err(e) = self.queue.remove(record.id()) {
                        // stays queued and is delivered again; the id makes this idempotent
                        warn!(event_id = %record.id(), error = %e, "delivered record not removed");
                    }
                }
                self.backoff.reset();
                true
            }
            Err(e) => {
                self.metrics.inc_failures();
                metrics::counter!(
                    "altimon_deliveries_total",
                    "sink" => self.sink.name().to_string(),
                    "status" => "error"
                )
                .increment(1);
                let event_id = event.id.clone();
                self.park(pending, &e);

                let delay = self.backoff.next_delay();
                warn!(
                    event_id = %event_id,
                    error = %e,
                    consecutive_failures = self.backoff.failures(),
                    retry_in_ms = delay.as_millis() as u64,
                    "delivery failed, backing off"
                );
                self.pause(delay).await
            }
        }
    }

    /// Keep a failed event for the next attempt
    fn park(&self, pending: Pending, cause: &ContractError) {
        match pending {
            Pending::Live(event) => self.store(event, true),
            Pending::Queued(record) => {
                if let Err(e) = self.queue.record_failure(record.id(), &cause.to_string()) {
                    warn!(event_id = %record.id(), error = %e, "attempt count not updated");
                }
            }
        }
    }

    /// Move everything waiting in the live channel into the queue
    fn absorb_live(&mut self) {
        let mut moved = 0usize;
        while let Ok(event) = self.rx.try_recv() {
            self.store(event, false);
            moved += 1;
        }
        if moved > 0 {
            debug!(moved, "live events queued behind offline backlog");
        }
    }

    fn store(&self, event: Event, after_failure: bool) {
        let event_id = event.id.clone();
        match self.queue.enqueue(event) {
            Ok(_) => {
                if after_failure {
                    self.metrics.inc_requeued();
                }
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
            }
        }
    }

    async fn wait_live(&mut self) -> Wait {
        tokio::select! {
            biased;
            changed = self.shutdown.changed() => match changed {
                // loop head re-reads the flag
                Ok(()) => Wait::Idle,
                Err(_) => Wait::Stop,
            },
            received = tokio::time::timeout(self.config.idle_poll, self.rx.recv()) => match received {
                Ok(Some(event)) => Wait::Event(event),
                Ok(None) => {
                    debug!("producer closed the live channel");
                    Wait::Stop
                }
                Err(_) => Wait::Idle,
            },
        }
    }

    /// Cancellable sleep; `false` when shutdown arrived first
    async fn pause(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.changed() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    use crate::handoff::EventHandoff;

    /// Fails the first `fail_first` deliveries, then acknowledges
    struct ScriptedSink {
        fail_first: usize,
        attempts: usize,
        delivered: Arc<Mutex<Vec<u64>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl ScriptedSink {
        fn new(fail_first: usize) -> (Self, Arc<Mutex<Vec<u64>>>, Arc<Mutex<bool>>) {
            let delivered = Arc::new(Mutex::new(Vec::new()));
            let closed = Arc::new(Mutex::new(false));
            let sink = Self {
                fail_first,
                attempts: 0,
                delivered: Arc::clone(&delivered),
                closed: Arc::clone(&closed),
            };
            (sink, delivered, closed)
        }
    }

    impl EventSink for ScriptedSink {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn deliver(&mut self, event: &Event) -> Result<(), ContractError> {
            self.attempts += 1;
            if self.attempts <= self.fail_first {
                return Err(ContractError::sink_connection("scripted", "outage"));
            }
            self.delivered.lock().unwrap().push(event.sequence);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

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

    fn config(base_secs: u64) -> SyncWorkerConfig {
        SyncWorkerConfig {
            idle_poll: Duration::from_millis(100),
            delivery_timeout: Duration::from_secs(1),
            retry: RetryPolicy {
                base_delay: Duration::from_secs(base_secs),
                max_delay: Duration::from_secs(base_secs * 4),
                growth_steps: 5,
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_across_outage() {
        let dir = tempdir().unwrap();
        let metrics = Arc::new(DeliveryMetrics::new());
        let queue = OfflineQueue::open(dir.path(), 100, "dev", Arc::clone(&metrics)).unwrap();
        let (handoff, rx) = EventHandoff::channel(8, queue.clone(), Arc::clone(&metrics));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (sink, delivered, _) = ScriptedSink::new(3);

        for seq in 1..=5 {
            handoff.submit(event(seq));
        }
        let worker = SyncWorker::new(
            sink,
            queue.clone(),
            rx,
            shutdown_rx,
            config(1),
            Arc::clone(&metrics),
        )
        .spawn();

        while delivered.lock().unwrap().len() < 5 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        shutdown_tx.send(true).unwrap();
        let snapshot = worker.await.unwrap();

        assert_eq!(*delivered.lock().unwrap(), vec![1, 2, 3, 4, 5]);
        assert!(queue.is_empty());
        assert_eq!(snapshot.delivered, 5);
        assert_eq!(snapshot.failures, 3);
        assert_eq!(snapshot.requeued, 1);
    }

    #[tokio::test]
    async fn test_shutdown_moves_pending_live_events_to_queue() {
        let dir = tempdir().unwrap();
        let metrics = Arc::new(DeliveryMetrics::new());
        let queue = OfflineQueue::open(dir.path(), 100, "dev", Arc::clone(&metrics)).unwrap();
        let (handoff, rx) = EventHandoff::channel(8, queue.clone(), Arc::clone(&metrics));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (sink, delivered, closed) = ScriptedSink::new(0);

        for seq in 1..=3 {
            handoff.submit(event(seq));
        }
        shutdown_tx.send(true).unwrap();
        SyncWorker::new(sink, queue.clone(), rx, shutdown_rx, config(1), metrics)
            .run()
            .await;

        assert!(delivered.lock().unwrap().is_empty());
        assert_eq!(queue.count(), 3);
        assert!(*closed.lock().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff() {
        let dir = tempdir().unwrap();
        let metrics = Arc::new(DeliveryMetrics::new());
        let queue = OfflineQueue::open(dir.path(), 100, "dev", Arc::clone(&metrics)).unwrap();
        let (handoff, rx) = EventHandoff::channel(8, queue.clone(), Arc::clone(&metrics));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (sink, _, _) = ScriptedSink::new(usize::MAX);

        handoff.submit(event(1));
        let started = tokio::time::Instant::now();
        let worker = SyncWorker::new(
            sink,
            queue.clone(),
            rx,
            shutdown_rx,
            config(3600),
            Arc::clone(&metrics),
        )
        .spawn();

        while metrics.snapshot().failures == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(3600));
        // the failed live event is kept
        assert_eq!(queue.ids().len(), 1);
    }

    #[tokio::test]
    async fn test_queued_failure_increments_attempts() {
        let dir = tempdir().unwrap();
        let metrics = Arc::new(DeliveryMetrics::new());
        let queue = OfflineQueue::open(dir.path(), 100, "dev", Arc::clone(&metrics)).unwrap();
        queue.enqueue(event(1)).unwrap();
        let (_handoff, rx) = EventHandoff::channel(8, queue.clone(), Arc::clone(&metrics));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (sink, _, _) = ScriptedSink::new(usize::MAX);

        let worker = SyncWorker::new(
            sink,
            queue.clone(),
            rx,
            shutdown_rx,
            config(3600),
            Arc::clone(&metrics),
        )
        .spawn();
        while metrics.snapshot().failures == 0 {
            tokio::task::yield_now().await;
        }
        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();

        let record = queue.peek_oldest().unwrap().unwrap();
        assert_eq!(record.attempt_count, 1);
        assert_eq!(record.last_error.as_deref().map(|e| e.contains("outage")), Some(true));
    }
}
