//! Mock 气压计
//!
//! 无硬件时用于台架和测试的合成气压数据源。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use contracts::{ContractError, RawReading, SensorSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::altitude::altitude_to_pressure;
use crate::error::{IngestionError, Result};

/// 高度随首次读取后经过时间的变化
#[derive(Debug, Clone, PartialEq)]
pub enum AltitudeProfile {
    /// 固定高度 (米)
    Constant(f64),

    /// 分段常数高度：`(offset_seconds, altitude)` 对，偏移递增
    Steps(Vec<(f64, f64)>),
}

impl AltitudeProfile {
    /// `elapsed` 秒时的高度
    pub fn altitude_at(&self, elapsed: f64) -> f64 {
        match self {
            Self::Constant(altitude) => *altitude,
            Self::Steps(steps) => steps
                .iter()
                .take_while(|(offset, _)| *offset <= elapsed)
                .last()
                .or_else(|| steps.first())
                .map(|(_, altitude)| *altitude)
                .unwrap_or(0.0),
        }
    }

    /// 将 `"0:0,5:2,15:0.1"` 解析为阶梯曲线
    pub fn parse_steps(spec: &str) -> Result<Self> {
        let mut steps = Vec::new();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (offset, altitude) = part.split_once(':').ok_or_else(|| {
                IngestionError::invalid_param("steps", format!("'{part}' is not offset:altitude"))
            })?;
            let offset: f64 = offset.trim().parse().map_err(|e| {
                IngestionError::invalid_param("steps", format!("offset '{offset}': {e}"))
            })?;
            let altitude: f64 = altitude.trim().parse().map_err(|e| {
                IngestionError::invalid_param("steps", format!("altitude '{altitude}': {e}"))
            })?;
            steps.push((offset, altitude));
        }

        if steps.is_empty() {
            return Err(IngestionError::invalid_param("steps", "no steps given"));
        }
        if steps.windows(2).any(|w| w[1].0 < w[0].0) {
            return Err(IngestionError::invalid_param("steps", "offsets must ascend"));
        }
        Ok(Self::Steps(steps))
    }
}

/// Mock 气压计配置
#[derive(Debug, Clone)]
pub struct MockBarometerConfig {
    /// 传感器 ID
    pub sensor_id: String,

    /// 合成读数所用的参考气压 (hPa)
    pub sea_level_pressure: f64,

    /// 高度曲线
    pub profile: AltitudeProfile,

    /// 叠加在高度上的均匀噪声幅度 (米)
    pub noise_m: f64,

    /// 上报温度 (°C)
    pub temperature_c: f64,

    /// 噪声种子
    pub seed: u64,
}

impl Default for MockBarometerConfig {
    fn default() -> Self {
        Self {
            sensor_id: "mock_barometer".to_string(),
            sea_level_pressure: 1013.25,
            profile: AltitudeProfile::Constant(100.0),
            noise_m: 0.0,
            temperature_c: 20.0,
            seed: 0,
        }
    }
}

impl MockBarometerConfig {
    /// 从数据源参数构建
    ///
    /// 识别的键：`altitude`、`steps`、`noise_m`、`temperature_c`、`seed`。
    pub fn from_params(
        sensor_id: &str,
        sea_level_pressure: f64,
        params: &HashMap<String, String>,
    ) -> Result<Self> {
        let profile = match params.get("steps") {
            Some(spec) => AltitudeProfile::parse_steps(spec)?,
            None => AltitudeProfile::Constant(parse_param(params, "altitude", 100.0)?),
        };

        Ok(Self {
            sensor_id: sensor_id.to_string(),
            sea_level_pressure,
            profile,
            noise_m: parse_param(params, "noise_m", 0.0)?,
            temperature_c: parse_param(params, "temperature_c", 20.0)?,
            seed: parse_param(params, "seed", 0)?,
        })
    }
}

fn parse_param<T>(params: &HashMap<String, String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match params.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| IngestionError::invalid_param(key, e.to_string())),
        None => Ok(default),
    }
}

/// Mock 气压计
///
/// 在 tokio 时钟上跟随高度曲线 (暂停时间的测试因此是确定的)，
/// 并可设定接下来若干次读取失败。
pub struct MockBarometer {
    config: MockBarometerConfig,
    started: Option<Instant>,
    rng: StdRng,
    failures_pending: Arc<AtomicU32>,
    reinit_count: Arc<AtomicU32>,
}

impl MockBarometer {
    /// 创建新的 mock 气压计
    pub fn new(config: MockBarometerConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            started: None,
            rng,
            failures_pending: Arc::new(AtomicU32::new(0)),
            reinit_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// 固定高度的气压计
    pub fn constant(sensor_id: &str, sea_level_pressure: f64, altitude: f64) -> Self {
        Self::new(MockBarometerConfig {
            sensor_id: sensor_id.to_string(),
            sea_level_pressure,
            profile: AltitudeProfile::Constant(altitude),
            ..Default::default()
        })
    }

    /// 注入失败的句柄：接下来 `n` 次读取失败
    pub fn failure_injector(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.failures_pending)
    }

    /// 目前为止 `reinitialize` 的调用次数
    pub fn reinit_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.reinit_count)
    }

    fn elapsed(&mut self) -> f64 {
        let started = *self.started.get_or_insert_with(Instant::now);
        started.elapsed().as_secs_f64()
    }

    fn take_injected_failure(&self) -> bool {
        self.failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl SensorSource for MockBarometer {
    fn sensor_id(&self) -> &str {
        &self.config.sensor_id
    }

    async fn read(&mut self) -> std::result::Result<RawReading, ContractError> {
        if self.take_injected_failure() {
            return Err(ContractError::sensor_read(
                &self.config.sensor_id,
                "injected failure",
            ));
        }

        let elapsed = self.elapsed();
        let mut altitude = self.config.profile.altitude_at(elapsed);
        if self.config.noise_m > 0.0 {
            altitude += self
                .rng
                .random_range(-self.config.noise_m..=self.config.noise_m);
        }

        let pressure_hpa = altitude_to_pressure(altitude, self.config.sea_level_pressure);
        trace!(sensor_id = %self.config.sensor_id, elapsed, altitude, pressure_hpa, "mock reading");

        Ok(RawReading {
            pressure_hpa,
            temperature_c: self.config.temperature_c,
        })
    }

    async fn reinitialize(&mut self) -> std::result::Result<(), ContractError> {
        self.reinit_count.fetch_add(1, Ordering::SeqCst);
        debug!(sensor_id = %self.config.sensor_id, "mock barometer re-initialized");
        Ok(())
    }
}
