//! # Observability
//!
//! 可观测性模块：结构化日志 + Prometheus 指标。
//!
//! ## 功能
//!
//! - 日志初始化 (JSON/Pretty/Compact)，数据丢失日志 (`altimon::data_loss`) 始终开启
//! - Prometheus 端点，安装时登记所有 `altimon_*` 指标的说明
//! - 采样速率与事件指标记录、运行摘要聚合
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{init_with_config, ObservabilityConfig};
//!
//! init_with_config(ObservabilityConfig::default())?;
//!
//! if let Some(event) = core.ingest(sample) {
//!     observability::record_event_shape(&event);
//! }
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use contracts::DATA_LOSS_TARGET;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

pub use crate::metrics::{
    describe_agent_metrics, record_event_handoff, record_event_shape, record_sample_rate,
    record_sensor_reinit, record_tick_interval_ms, EventStatsAggregator, EventSummary,
    RunningStats, StatsSummary,
};

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// Prometheus 端口 (None = 禁用)
    pub metrics_port: Option<u16>,
    /// 默认日志级别 (RUST_LOG 未设置时生效)
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            // 设备上通常由 journald 收集
            log_format: LogFormat::Json,
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    #[default]
    Json,
    /// 人类可读格式
    Pretty,
    /// 紧凑单行格式
    Compact,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 初始化日志，可选地启动指标端点
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = build_filter(&config.default_log_level)?;

    tracing_subscriber::registry()
        .with(format_layer(config.log_format).with_filter(filter))
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// RUST_LOG 优先，否则使用默认级别；数据丢失目标总是追加在最后
fn build_filter(default_level: &str) -> Result<EnvFilter> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .with_context(|| format!("Invalid log level '{default_level}'"))?;

    let directive: Directive = format!("{DATA_LOSS_TARGET}=error")
        .parse()
        .context("Invalid data-loss filter directive")?;
    Ok(filter.add_directive(directive))
}

fn format_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        // target 保留，便于按 altimon::data_loss 过滤
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    }
}

/// 仅启动 Prometheus 指标端点（不初始化日志）
///
/// 日志在启动时初始化，端口由 `run` 子命令决定。
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to install Prometheus recorder on port {port}"))?;

    describe_agent_metrics();
    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.default_log_level, "info");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_filter_keeps_data_loss_target() {
        let filter = build_filter("warn").unwrap();
        assert!(filter.to_string().contains("altimon::data_loss=error"));
    }
}
