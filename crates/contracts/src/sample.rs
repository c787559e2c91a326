//! Sample - Ingestion 的输出
//!
//! 一次带时间戳的气压计读数，附带推导出的高度。

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 传感器数据源返回的原始读数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// 气压 (hPa)
    pub pressure_hpa: f64,

    /// 温度 (°C)
    pub temperature_c: f64,
}

/// 气压计样本
///
/// 创建后不可变；由环形缓冲消费并复制进事件。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unix 时间戳 (秒)
    pub timestamp: f64,

    /// 气压 (hPa)
    pub pressure: f64,

    /// 相对配置的海平面参考的高度 (米)
    pub altitude: f64,

    /// 温度 (°C)
    pub temperature: f64,
}

impl Sample {
    /// 创建样本
    pub fn new(timestamp: f64, pressure: f64, altitude: f64, temperature: f64) -> Self {
        Self {
            timestamp,
            pressure,
            altitude,
            temperature,
        }
    }

    /// 该样本的墙钟时间
    pub fn datetime(&self) -> DateTime<Utc> {
        datetime_from_unix(self.timestamp)
    }
}

/// 墙钟时刻转换为 Unix 秒
pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// 当前墙钟时间 (Unix 秒)
pub fn unix_now() -> f64 {
    unix_seconds(Utc::now())
}

/// Unix 秒转换回墙钟时刻
///
/// 超出范围的值截断到 Unix 纪元。
pub fn datetime_from_unix(seconds: f64) -> DateTime<Utc> {
    let micros = (seconds * 1_000_000.0).round() as i64;
    Utc.timestamp_micros(micros)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}
