//! Agent 指标收集模块
//!
//! 采样循环与事件输出的进程级指标，以及运行摘要用的内存聚合器。
//! 各业务 crate 内部的计数器 (样本、投递、离线队列) 由各自直接记录。

use contracts::Event;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

/// 登记全部 `altimon_*` 指标的说明，供 Prometheus 端点输出 HELP/UNIT
pub fn describe_agent_metrics() {
    // 采样
    describe_counter!("altimon_samples_total", "Samples read successfully");
    describe_counter!(
        "altimon_sensor_errors_total",
        "Failed sensor reads by kind (read, timeout, implausible)"
    );
    describe_counter!(
        "altimon_sensor_reinit_total",
        "Sensor re-initializations by outcome"
    );
    describe_gauge!(
        "altimon_altitude_meters",
        "Most recent altitude above the sea-level reference"
    );
    describe_gauge!("altimon_sample_rate_expected_hz", "Configured sampling rate");
    describe_gauge!("altimon_sample_rate_actual_hz", "Measured sampling rate");
    describe_histogram!(
        "altimon_tick_interval_ms",
        Unit::Milliseconds,
        "Interval between consecutive sampling ticks"
    );

    // 检测
    describe_gauge!(
        "altimon_detector_phase",
        "Detector phase (0 idle, 1 recording, 2 stabilizing)"
    );
    describe_counter!("altimon_events_emitted_total", "Events closed by the detector");
    describe_histogram!(
        "altimon_event_duration_seconds",
        Unit::Seconds,
        "Time from trigger to close"
    );
    describe_histogram!("altimon_event_samples", Unit::Count, "Samples per event");
    describe_histogram!(
        "altimon_event_span_meters",
        "Altitude range covered by an event"
    );

    // 投递
    describe_counter!(
        "altimon_event_handoff_total",
        "Events leaving the sampling loop by outcome (live, spilled, lost)"
    );
    describe_counter!(
        "altimon_events_spilled_total",
        "Events written to the offline queue because the live channel was full"
    );
    describe_counter!(
        "altimon_deliveries_total",
        "Delivery attempts by sink and status"
    );
    describe_histogram!(
        "altimon_delivery_latency_seconds",
        Unit::Seconds,
        "Duration of successful delivery attempts"
    );
    describe_gauge!(
        "altimon_remote_connected",
        "1 while the remote store connection is up"
    );
    describe_gauge!(
        "altimon_offline_queue_depth",
        Unit::Count,
        "Records waiting in the offline queue"
    );
    describe_counter!(
        "altimon_quarantined_records_total",
        "Unreadable or foreign records moved aside"
    );
    describe_counter!(
        "altimon_data_loss_total",
        "Events dropped without reaching the remote store"
    );
}

/// 记录采样速率 (期望值 vs 实际值)
pub fn record_sample_rate(expected_hz: f64, actual_hz: f64) {
    gauge!("altimon_sample_rate_expected_hz").set(expected_hz);
    gauge!("altimon_sample_rate_actual_hz").set(actual_hz);
}

/// 记录采样周期的实际间隔
pub fn record_tick_interval_ms(interval_ms: f64) {
    histogram!("altimon_tick_interval_ms").record(interval_ms);
}

/// 记录传感器重新初始化
pub fn record_sensor_reinit(sensor_id: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "altimon_sensor_reinit_total",
        "sensor_id" => sensor_id.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录事件交接结果 (live / spilled / lost)
pub fn record_event_handoff(outcome: &str) {
    counter!(
        "altimon_event_handoff_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录事件形状 (样本数、高度跨度)
pub fn record_event_shape(event: &Event) {
    histogram!("altimon_event_samples").record(event.sample_count() as f64);
    histogram!("altimon_event_span_meters").record(event.altitude_span());
}

/// 事件统计聚合器
///
/// 在内存中聚合已产生事件的统计，便于退出时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct EventStatsAggregator {
    /// 事件总数
    pub total_events: u64,

    /// 持续时间统计 (秒)
    pub duration_stats: RunningStats,

    /// 高度跨度统计 (米)
    pub span_stats: RunningStats,

    /// 每事件样本数统计
    pub sample_stats: RunningStats,
}

impl EventStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, event: &Event) {
        self.total_events += 1;
        self.duration_stats.push(event.duration());
        self.span_stats.push(event.altitude_span());
        self.sample_stats.push(event.sample_count() as f64);
    }

    /// 生成摘要
    pub fn summary(&self) -> EventSummary {
        EventSummary {
            total_events: self.total_events,
            duration_s: StatsSummary::from(&self.duration_stats),
            span_m: StatsSummary::from(&self.span_stats),
            samples: StatsSummary::from(&self.sample_stats),
        }
    }
}

/// 事件摘要
#[derive(Debug, Clone, Default)]
pub struct EventSummary {
    pub total_events: u64,
    pub duration_s: StatsSummary,
    pub span_m: StatsSummary,
    pub samples: StatsSummary,
}

impl std::fmt::Display for EventSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Event Summary ===")?;
        writeln!(f, "Total events: {}", self.total_events)?;
        writeln!(f, "Duration (s): {}", self.duration_s)?;
        writeln!(f, "Altitude span (m): {}", self.span_m)?;
        writeln!(f, "Samples per event: {}", self.samples)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Sample;

    fn event(duration: f64, altitudes: &[f64]) -> Event {
        Event {
            id: "20250101000000-000000-000001".into(),
            sequence: 1,
            device: "dev".into(),
            trigger_time: 10.0,
            start_time: 0.0,
            end_time: 10.0 + duration,
            samples: altitudes
                .iter()
                .enumerate()
                .map(|(i, a)| Sample::new(i as f64, 1000.0, *a, 20.0))
                .collect(),
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_event_aggregator() {
        let mut aggregator = EventStatsAggregator::new();
        aggregator.update(&event(4.0, &[0.0, 2.0, 2.1]));
        aggregator.update(&event(8.0, &[0.0, -3.0]));

        let summary = aggregator.summary();
        assert_eq!(summary.total_events, 2);
        assert!((summary.duration_s.mean - 6.0).abs() < 1e-10);
        assert!((summary.span_m.max - 3.0).abs() < 1e-10);
        assert_eq!(summary.samples.count, 2);
        assert!(summary.to_string().contains("Total events: 2"));
    }

    #[test]
    fn test_empty_summary_display() {
        assert_eq!(StatsSummary::default().to_string(), "N/A");
    }
}
