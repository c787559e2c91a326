//! Orchestrator - sampling loop and sync worker lifecycle.
//!
//! The sampling loop owns the sensor reader and the detection core and runs
//! on the caller's task. The sync worker runs as a spawned task. The two only
//! share the live handoff channel and the offline queue.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use contracts::{AgentBlueprint, ContractError, Event, EventSink, SensorSource};
use detector::DetectionCore;
use dispatcher::{
    DeliveryMetrics, EventHandoff, HandoffOutcome, OfflineQueue, SyncWorker, SyncWorkerConfig,
};
use ingestion::{BarometerSource, SensorReader};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::AgentStats;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Validated agent configuration
    pub blueprint: AgentBlueprint,

    /// Stop after this long (None = until the shutdown signal)
    pub duration: Option<Duration>,
}

/// Main agent orchestrator
pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create a new orchestrator with the given configuration
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Run with the sensor source and sink selected by configuration
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<AgentStats> {
        let blueprint = &self.config.blueprint;
        let source = BarometerSource::from_config(&blueprint.sensor)
            .context("Failed to create sensor source")?;
        let sink = dispatcher::create_sink(blueprint).context("Failed to create sink")?;
        self.run_with(source, sink, shutdown).await
    }

    /// Run with explicit source and sink until `shutdown` resolves or the
    /// configured duration elapses
    ///
    /// On the way out the timer stops, an in-flight recording is closed and
    /// submitted, and the sync worker is allowed to finish its current
    /// delivery attempt before it moves pending live events to the queue.
    pub async fn run_with<Src, Snk>(
        self,
        source: Src,
        sink: Snk,
        shutdown: impl Future<Output = ()>,
    ) -> Result<AgentStats>
    where
        Src: SensorSource,
        Snk: EventSink + Send + 'static,
    {
        let start_time = Instant::now();
        let blueprint = self.config.blueprint;

        // Offline queue and delivery
        let delivery_metrics = Arc::new(DeliveryMetrics::new());
        let queue = OfflineQueue::open(
            &blueprint.storage.offline_data_path,
            blueprint.storage.max_offline_files,
            &blueprint.device.name,
            Arc::clone(&delivery_metrics),
        )
        .with_context(|| {
            format!(
                "Failed to open offline queue at {}",
                blueprint.storage.offline_data_path.display()
            )
        })?;

        let (handoff, live_rx) = EventHandoff::channel(
            blueprint.sink.handoff_capacity,
            queue.clone(),
            Arc::clone(&delivery_metrics),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = SyncWorker::new(
            sink,
            queue.clone(),
            live_rx,
            shutdown_rx,
            SyncWorkerConfig::from_blueprint(&blueprint),
            Arc::clone(&delivery_metrics),
        )
        .spawn();

        // Sampling
        let first_sequence = queue.next_sequence();
        let reader = SensorReader::new(
            source,
            blueprint.sensor.sea_level_pressure,
            blueprint.sensor.read_timeout(),
        );
        let mut sampling = SamplingLoop {
            core: DetectionCore::new(&blueprint, first_sequence),
            reader,
            handoff,
            sensor_retry: Duration::from_secs_f64(blueprint.sensor.sensor_retry_seconds),
            failing_since: None,
            rate: RateMonitor::new(
                blueprint.sensor.sample_rate_hz,
                Duration::from_secs_f64(blueprint.runtime.rate_log_interval_seconds),
                start_time,
            ),
            stats: AgentStats {
                expected_rate_hz: blueprint.sensor.sample_rate_hz,
                ..Default::default()
            },
        };

        info!(
            device = %blueprint.device.name,
            sensor = %sampling.reader.sensor_id(),
            sample_rate_hz = blueprint.sensor.sample_rate_hz,
            queued = queue.count(),
            first_sequence,
            "Agent running"
        );

        let mut ticker = tokio::time::interval(blueprint.sensor.sample_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let duration = self.config.duration;
        let deadline = async move {
            match duration {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = &mut deadline => {
                    info!(duration_secs = ?duration.map(|d| d.as_secs_f64()), "Run duration reached");
                    break;
                }
                _ = ticker.tick() => {}
            }
            sampling.tick().await;
        }

        // Shutdown
        info!("Shutting down agent...");
        if let Some(event) = sampling.core.finish() {
            info!(event_id = %event.id, "In-flight recording closed by shutdown");
            sampling.emit(event);
        }

        let SamplingLoop {
            reader,
            handoff,
            mut stats,
            ..
        } = sampling;
        drop(handoff);

        let sensor = reader.metrics().snapshot();
        stats.samples_taken = sensor.samples_read;
        stats.sensor_errors = sensor.failures();
        stats.sensor_timeouts = sensor.read_timeouts;
        stats.sensor_reinits = sensor.reinitializations;
        // the worker may already be gone, nothing else to tell it then
        let _ = shutdown_tx.send(true);

        stats.delivery = worker.await.context("Sync worker task failed")?;
        stats.final_queue_depth = queue.count();
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            samples = stats.samples_taken,
            events = stats.events_emitted,
            delivered = stats.delivery.delivered,
            queued = stats.final_queue_depth,
            "Agent shutdown complete"
        );

        Ok(stats)
    }
}

/// State owned by the sampling loop
struct SamplingLoop<Src> {
    reader: SensorReader<Src>,
    core: DetectionCore,
    handoff: EventHandoff,
    sensor_retry: Duration,
    failing_since: Option<Instant>,
    rate: RateMonitor,
    stats: AgentStats,
}

impl<Src: SensorSource> SamplingLoop<Src> {
    async fn tick(&mut self) {
        let now = Instant::now();
        self.rate.on_tick(now);

        match self.reader.sample().await {
            Ok(sample) => {
                self.rate.on_sample();
                if let Some(since) = self.failing_since.take() {
                    info!(
                        outage_ms = now.duration_since(since).as_millis() as u64,
                        "Sensor recovered"
                    );
                }
                if let Some(event) = self.core.ingest(sample) {
                    self.emit(event);
                }
            }
            Err(e) => self.on_read_failure(now, e).await,
        }

        self.rate.maybe_report(now);
    }

    /// A failed tick leaves the detector untouched
    async fn on_read_failure(&mut self, now: Instant, error: ContractError) {
        let since = match self.failing_since {
            Some(since) => {
                debug!(error = %error, "Sensor read failed, tick skipped");
                since
            }
            None => {
                warn!(
                    sensor = %self.reader.sensor_id(),
                    error = %error,
                    "Sensor read failed, tick skipped"
                );
                self.failing_since = Some(now);
                now
            }
        };

        if now.duration_since(since) < self.sensor_retry {
            return;
        }

        warn!(
            sensor = %self.reader.sensor_id(),
            failing_secs = now.duration_since(since).as_secs_f64(),
            "Sensor keeps failing, re-initializing"
        );
        let result = self.reader.reinitialize().await;
        observability::record_sensor_reinit(self.reader.sensor_id(), result.is_ok());
        match result {
            Ok(()) => info!(sensor = %self.reader.sensor_id(), "Sensor re-initialized"),
            Err(e) => warn!(error = %e, "Sensor re-initialization failed"),
        }
        // a full retry period before the next attempt
        self.failing_since = Some(now);
    }

    fn emit(&mut self, event: Event) {
        self.stats.events_emitted += 1;
        self.stats.event_stats.update(&event);
        observability::record_event_shape(&event);

        let event_id = event.id.clone();
        let outcome = self.handoff.submit(event);
        let label = match outcome {
            HandoffOutcome::Live => {
                self.stats.events_live += 1;
                "live"
            }
            HandoffOutcome::Spilled => {
                self.stats.events_spilled += 1;
                "spilled"
            }
            HandoffOutcome::Lost => {
                self.stats.events_lost += 1;
                "lost"
            }
        };
        observability::record_event_handoff(label);
        debug!(event_id = %event_id, outcome = label, "Event handed off");
    }
}

/// Expected vs actual sampling rate, reported once per interval
struct RateMonitor {
    expected_hz: f64,
    interval: Duration,
    window_start: Instant,
    window_samples: u64,
    last_tick: Option<Instant>,
}

impl RateMonitor {
    fn new(expected_hz: f64, interval: Duration, now: Instant) -> Self {
        Self {
            expected_hz,
            interval,
            window_start: now,
            window_samples: 0,
            last_tick: None,
        }
    }

    fn on_tick(&mut self, now: Instant) {
        if let Some(last) = self.last_tick.replace(now) {
            observability::record_tick_interval_ms(
                now.duration_since(last).as_secs_f64() * 1000.0,
            );
        }
    }

    fn on_sample(&mut self) {
        self.window_samples += 1;
    }

    fn maybe_report(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.window_start);
        if self.interval.is_zero() || elapsed < self.interval {
            return;
        }

        let actual_hz = self.window_samples as f64 / elapsed.as_secs_f64();
        info!(
            expected_hz = self.expected_hz,
            actual_hz = format!("{:.2}", actual_hz),
            samples = self.window_samples,
            "Sampling rate"
        );
        observability::record_sample_rate(self.expected_hz, actual_hz);
        self.window_start = now;
        self.window_samples = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SinkType;
    use ingestion::MockBarometer;
    use tempfile::tempdir;

    fn blueprint(offline_path: &std::path::Path) -> AgentBlueprint {
        let mut blueprint = AgentBlueprint::default();
        blueprint.storage.offline_data_path = offline_path.to_path_buf();
        blueprint.sink.sink_type = SinkType::Log;
        blueprint
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_for_duration() {
        let dir = tempdir().unwrap();
        let orchestrator = Orchestrator::new(OrchestratorConfig {
            blueprint: blueprint(dir.path()),
            duration: Some(Duration::from_secs(10)),
        });

        let source = MockBarometer::constant("mock", 1013.25, 100.0);
        let sink = dispatcher::LogSink::new("log");
        let stats = orchestrator
            .run_with(source, sink, std::future::pending())
            .await
            .unwrap();

        // 5 Hz for 10 s, first tick immediate
        assert!((49..=51).contains(&stats.samples_taken), "{stats:?}");
        assert_eq!(stats.events_emitted, 0);
        assert_eq!(stats.final_queue_depth, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinitializes_failing_sensor() {
        let dir = tempdir().unwrap();
        let mut blueprint = blueprint(dir.path());
        blueprint.sensor.sensor_retry_seconds = 2.0;
        let orchestrator = Orchestrator::new(OrchestratorConfig {
            blueprint,
            duration: Some(Duration::from_secs(5)),
        });

        let source = MockBarometer::constant("mock", 1013.25, 100.0);
        source
            .failure_injector()
            .store(15, std::sync::atomic::Ordering::SeqCst);
        let reinits = source.reinit_counter();

        let stats = orchestrator
            .run_with(source, dispatcher::LogSink::new("log"), std::future::pending())
            .await
            .unwrap();

        // counted by the reader, none of them timeouts
        assert_eq!(stats.sensor_errors, 15);
        assert_eq!(stats.sensor_timeouts, 0);
        assert!(stats.sensor_reinits >= 1);
        assert_eq!(
            reinits.load(std::sync::atomic::Ordering::SeqCst) as u64,
            stats.sensor_reinits
        );
        assert!(stats.samples_taken > 0);
    }
}
