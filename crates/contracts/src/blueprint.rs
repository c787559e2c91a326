//! AgentBlueprint - Config Loader 的输出
//!
//! 完整的 agent 配置：设备身份、传感器、检测阈值、历史缓冲、
//! 远端数据库、离线存储、Sink。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的 agent 配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 设备身份
    #[serde(default)]
    pub device: DeviceConfig,

    /// 气压计设置
    #[serde(default)]
    pub sensor: SensorConfig,

    /// 事件检测阈值
    #[serde(default)]
    pub detection: DetectionConfig,

    /// 采样历史
    #[serde(default)]
    pub buffer: BufferConfig,

    /// 远端数据库连接
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 离线队列存储
    #[serde(default)]
    pub storage: StorageConfig,

    /// 远端 Sink 选择
    #[serde(default)]
    pub sink: SinkConfig,

    /// 循环调优参数
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 设备身份
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// 设备名，需与远端服务登记的名称一致
    #[serde(default = "default_device_name")]
    pub name: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
        }
    }
}

fn default_device_name() -> String {
    "altimon-1".to_string()
}

/// 气压计配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// 日志中使用的传感器 ID
    #[serde(default = "default_sensor_id")]
    pub id: String,

    /// 气压计的 I2C 地址
    #[serde(default = "default_i2c_address")]
    pub i2c_address: u16,

    /// 采样率 (Hz)，必须 > 0
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: f64,

    /// 海平面参考气压 (hPa)
    #[serde(default = "default_sea_level_pressure")]
    pub sea_level_pressure: f64,

    /// 单次读取的上限 (毫秒)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// 连续失败多久后重新初始化数据源 (秒)
    #[serde(default = "default_sensor_retry_seconds")]
    pub sensor_retry_seconds: f64,

    /// 数据源类型
    #[serde(default)]
    pub source: SourceKind,

    /// 数据源专属参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            id: default_sensor_id(),
            i2c_address: default_i2c_address(),
            sample_rate_hz: default_sample_rate_hz(),
            sea_level_pressure: default_sea_level_pressure(),
            read_timeout_ms: default_read_timeout_ms(),
            sensor_retry_seconds: default_sensor_retry_seconds(),
            source: SourceKind::default(),
            params: HashMap::new(),
        }
    }
}

impl SensorConfig {
    /// 采样周期
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.sample_rate_hz)
    }

    /// 读取超时
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

fn default_sensor_id() -> String {
    "bmp280".to_string()
}

fn default_i2c_address() -> u16 {
    0x76
}

fn default_sample_rate_hz() -> f64 {
    5.0
}

fn default_sea_level_pressure() -> f64 {
    1013.25
}

fn default_read_timeout_ms() -> u64 {
    500
}

fn default_sensor_retry_seconds() -> f64 {
    10.0
}

/// 传感器数据源类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// 按高度曲线生成读数的模拟气压计
    #[default]
    Mock,
    /// 从 JSON-lines 文件回放原始读数
    Replay,
}

/// 检测阈值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// 视为显著变化的最小高度差 (米)
    #[serde(default = "default_threshold_meters")]
    pub threshold_meters: f64,

    /// 参考样本往前回溯的时间 (秒)
    #[serde(default = "default_comparison_window_seconds")]
    pub comparison_window_seconds: f64,

    /// 结束录制所需的平稳时间 (秒)
    #[serde(default = "default_stabilization_time_seconds")]
    pub stabilization_time_seconds: f64,

    /// 触发前附加到事件的历史 (秒)
    #[serde(default = "default_lookback_seconds")]
    pub lookback_seconds: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold_meters: default_threshold_meters(),
            comparison_window_seconds: default_comparison_window_seconds(),
            stabilization_time_seconds: default_stabilization_time_seconds(),
            lookback_seconds: default_lookback_seconds(),
        }
    }
}

impl DetectionConfig {
    /// 设备标准的事件前置历史（秒）
    pub const STANDARD_LOOKBACK_SECONDS: f64 = 60.0;

    /// 同时满足参考查找与事件回溯的最小环形缓冲窗口
    pub fn required_buffer_seconds(&self) -> f64 {
        self.lookback_seconds + self.comparison_window_seconds
    }
}

fn default_threshold_meters() -> f64 {
    1.0
}

fn default_comparison_window_seconds() -> f64 {
    3.0
}

fn default_stabilization_time_seconds() -> f64 {
    3.0
}

fn default_lookback_seconds() -> f64 {
    DetectionConfig::STANDARD_LOOKBACK_SECONDS
}

/// 采样历史配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// 环形缓冲保留的时间窗口 (秒)
    #[serde(default = "default_ring_buffer_seconds")]
    pub ring_buffer_seconds: f64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            ring_buffer_seconds: default_ring_buffer_seconds(),
        }
    }
}

fn default_ring_buffer_seconds() -> f64 {
    70.0
}

/// 远端数据库连接参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 接收端主机
    #[serde(default = "default_db_host")]
    pub host: String,

    /// 接收端端口
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// 目标数据库名 (供接收端路由)
    #[serde(default = "default_db_name")]
    pub database: String,

    /// 目标表名 (供接收端路由)
    #[serde(default = "default_db_table")]
    pub table: String,

    /// 重试间隔停止翻倍前的次数
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// 初始重试间隔 (秒)
    #[serde(default = "default_reconnect_delay_seconds")]
    pub reconnect_delay_seconds: f64,

    /// 重试间隔上限 (秒)
    #[serde(default = "default_max_reconnect_delay_seconds")]
    pub max_reconnect_delay_seconds: f64,

    /// TCP 连接超时 (秒)
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: f64,

    /// 等待远端确认的时间 (秒)
    #[serde(default = "default_ack_timeout_seconds")]
    pub ack_timeout_seconds: f64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            database: default_db_name(),
            table: default_db_table(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_seconds: default_reconnect_delay_seconds(),
            max_reconnect_delay_seconds: default_max_reconnect_delay_seconds(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
            ack_timeout_seconds: default_ack_timeout_seconds(),
        }
    }
}

impl DatabaseConfig {
    /// 接收端的 `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 由重连参数得到的重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs_f64(self.reconnect_delay_seconds),
            max_delay: Duration::from_secs_f64(self.max_reconnect_delay_seconds),
            growth_steps: self.reconnect_attempts,
        }
    }
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    3306
}

fn default_db_name() -> String {
    "altitude_data".to_string()
}

fn default_db_table() -> String {
    "altitude_events".to_string()
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_seconds() -> f64 {
    10.0
}

fn default_max_reconnect_delay_seconds() -> f64 {
    60.0
}

fn default_connect_timeout_seconds() -> f64 {
    2.0
}

fn default_ack_timeout_seconds() -> f64 {
    10.0
}

/// 投递重试策略
///
/// 从 `base_delay` 起翻倍 `growth_steps` 次，不超过 `max_delay`，
/// 到达上限后无限重试。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub growth_steps: u32,
}

/// 离线存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 每个排队事件一个文件的目录
    #[serde(default = "default_offline_data_path")]
    pub offline_data_path: PathBuf,

    /// 队列上限；超出时丢弃最旧记录并记录日志
    #[serde(default = "default_max_offline_files")]
    pub max_offline_files: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            offline_data_path: default_offline_data_path(),
            max_offline_files: default_max_offline_files(),
        }
    }
}

fn default_offline_data_path() -> PathBuf {
    PathBuf::from("offline_data")
}

fn default_max_offline_files() -> usize {
    1000
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    #[serde(default = "default_sink_name")]
    pub name: String,

    /// Sink 类型
    #[serde(default)]
    pub sink_type: SinkType,

    /// 到同步 worker 的实时通道容量
    #[serde(default = "default_handoff_capacity")]
    pub handoff_capacity: usize,

    /// 类型专属参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            name: default_sink_name(),
            sink_type: SinkType::default(),
            handoff_capacity: default_handoff_capacity(),
            params: HashMap::new(),
        }
    }
}

fn default_sink_name() -> String {
    "remote".to_string()
}

fn default_handoff_capacity() -> usize {
    16
}

/// Sink 类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 仅日志输出
    Log,
    /// 目录存储
    File,
    /// 带确认的 TCP 接收端
    #[default]
    Network,
}

/// 循环调优参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// 同步 worker 等待实时事件的上限 (毫秒)
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// 采样率报告间隔 (秒)
    #[serde(default = "default_rate_log_interval_seconds")]
    pub rate_log_interval_seconds: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: default_idle_poll_ms(),
            rate_log_interval_seconds: default_rate_log_interval_seconds(),
        }
    }
}

impl RuntimeConfig {
    /// 同步 worker 等待上限
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

fn default_idle_poll_ms() -> u64 {
    1000
}

fn default_rate_log_interval_seconds() -> f64 {
    60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_device_agent() {
        let blueprint = AgentBlueprint::default();
        assert_eq!(blueprint.sensor.sample_rate_hz, 5.0);
        assert_eq!(blueprint.sensor.i2c_address, 0x76);
        assert_eq!(blueprint.detection.threshold_meters, 1.0);
        assert_eq!(blueprint.storage.max_offline_files, 1000);
        assert!(
            blueprint.buffer.ring_buffer_seconds
                >= blueprint.detection.required_buffer_seconds()
        );
    }

    #[test]
    fn retry_policy_from_database_config() {
        let db = DatabaseConfig {
            reconnect_delay_seconds: 2.0,
            max_reconnect_delay_seconds: 30.0,
            reconnect_attempts: 3,
            ..Default::default()
        };
        let policy = db.retry_policy();
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.growth_steps, 3);
        assert_eq!(db.address(), "localhost:3306");
    }

    #[test]
    fn sample_interval_from_rate() {
        let sensor = SensorConfig {
            sample_rate_hz: 4.0,
            ..Default::default()
        };
        assert_eq!(sensor.sample_interval(), Duration::from_millis(250));
    }
}
