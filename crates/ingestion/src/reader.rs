//! SensorReader - turns raw readings into timestamped samples

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{unix_now, ContractError, Sample, SensorSource};
use tokio::time::Instant;
use tracing::{instrument, trace};

use crate::altitude::pressure_to_altitude;

/// Reader counters
#[derive(Debug, Default)]
pub struct ReaderMetrics {
    /// Samples produced
    pub samples_read: AtomicU64,

    /// Reads that returned an error
    pub read_errors: AtomicU64,

    /// Reads that exceeded the timeout
    pub read_timeouts: AtomicU64,

    /// Re-initializations attempted
    pub reinitializations: AtomicU64,
}

impl ReaderMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    fn record_sample(&self) {
        self.samples_read.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("altimon_samples_total").increment(1);
    }

    fn record_error(&self, kind: &'static str) {
        match kind {
            "timeout" => self.read_timeouts.fetch_add(1, Ordering::Relaxed),
            _ => self.read_errors.fetch_add(1, Ordering::Relaxed),
        };
        metrics::counter!("altimon_sensor_errors_total", "kind" => kind).increment(1);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> ReaderSnapshot {
        ReaderSnapshot {
            samples_read: self.samples_read.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
            reinitializations: self.reinitializations.load(Ordering::Relaxed),
        }
    }
}

/// Reader metrics snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderSnapshot {
    pub samples_read: u64,
    pub read_errors: u64,
    pub read_timeouts: u64,
    pub reinitializations: u64,
}

impl ReaderSnapshot {
    /// Failed reads of any kind
    pub fn failures(&self) -> u64 {
        self.read_errors + self.read_timeouts
    }
}

/// Sample clock: wall-clock time at creation, advanced by the monotonic clock
///
/// Timestamps never step backwards when the system clock is adjusted.
#[derive(Debug, Clone, Copy)]
struct SampleClock {
    origin_unix: f64,
    origin: Instant,
}

impl SampleClock {
    fn start() -> Self {
        Self {
            origin_unix: unix_now(),
            origin: Instant::now(),
        }
    }

    fn now(&self) -> f64 {
        self.origin_unix + self.origin.elapsed().as_secs_f64()
    }
}

/// Reads a sensor source under a timeout and derives altitude
///
/// Every returned `Sample` carries the time of its read in Unix seconds.
pub struct SensorReader<S> {
    source: S,
    sea_level_pressure: f64,
    read_timeout: Duration,
    clock: SampleClock,
    metrics: Arc<ReaderMetrics>,
}

impl<S: SensorSource> SensorReader<S> {
    /// Wrap a source
    pub fn new(source: S, sea_level_pressure: f64, read_timeout: Duration) -> Self {
        Self {
            source,
            sea_level_pressure,
            read_timeout,
            clock: SampleClock::start(),
            metrics: Arc::new(ReaderMetrics::new()),
        }
    }

    /// Sensor identity
    pub fn sensor_id(&self) -> &str {
        self.source.sensor_id()
    }

    /// Shared counters
    pub fn metrics(&self) -> Arc<ReaderMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Take one sample
    ///
    /// # Errors
    /// Read failure, timeout, or a physically implausible pressure. All are
    /// transient: the caller skips this tick.
    #[instrument(
        name = "sensor_reader_sample",
        level = "trace",
        skip(self),
        fields(sensor = %self.source.sensor_id())
    )]
    pub async fn sample(&mut self) -> Result<Sample, ContractError> {
        let reading = match tokio::time::timeout(self.read_timeout, self.source.read()).await {
            Ok(Ok(reading)) => reading,
            Ok(Err(e)) => {
                self.metrics.record_error("read");
                return Err(e);
            }
            Err(_) => {
                self.metrics.record_error("timeout");
                return Err(ContractError::SensorTimeout {
                    sensor_id: self.source.sensor_id().to_string(),
                    timeout_ms: self.read_timeout.as_millis() as u64,
                });
            }
        };

        if !(reading.pressure_hpa.is_finite() && reading.pressure_hpa > 0.0) {
            self.metrics.record_error("implausible");
            return Err(ContractError::sensor_read(
                self.source.sensor_id(),
                format!("implausible pressure {} hPa", reading.pressure_hpa),
            ));
        }

        let altitude = pressure_to_altitude(reading.pressure_hpa, self.sea_level_pressure);
        let sample = Sample::new(
            self.clock.now(),
            reading.pressure_hpa,
            altitude,
            reading.temperature_c,
        );
        self.metrics.record_sample();
        metrics::gauge!("altimon_altitude_meters").set(altitude);
        trace!(timestamp = sample.timestamp, altitude, "sample taken");
        Ok(sample)
    }

    /// Re-initialize the underlying source
    pub async fn reinitialize(&mut self) -> Result<(), ContractError> {
        self.metrics.reinitializations.fetch_add(1, Ordering::Relaxed);
        self.source.reinitialize().await
    }
}
