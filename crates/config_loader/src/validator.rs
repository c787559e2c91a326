//! 配置校验模块
//!
//! 校验规则：
//! - 设备名非空
//! - 采样参数为正 (采样率、海平面气压、读取超时)
//! - 检测阈值为正，回溯不为负
//! - 环形缓冲覆盖回溯 + 比较窗口
//! - 重连间隔为正且不超过上限
//! - 离线存储有上限且路径非空
//! - 所选 Sink 类型的字段完整

use contracts::{AgentBlueprint, ContractError, SinkType, SourceKind};

/// 校验 AgentBlueprint
///
/// 返回遇到的第一个错误，或 Ok(())。
pub fn validate(blueprint: &AgentBlueprint) -> Result<(), ContractError> {
    validate_device(blueprint)?;
    validate_sensor(blueprint)?;
    validate_detection(blueprint)?;
    validate_buffer(blueprint)?;
    validate_database(blueprint)?;
    validate_storage(blueprint)?;
    validate_sink(blueprint)?;
    Ok(())
}

/// NaN、无穷大与非正数一并拒绝
fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn validate_device(blueprint: &AgentBlueprint) -> Result<(), ContractError> {
    if blueprint.device.name.trim().is_empty() {
        return Err(ContractError::config_validation(
            "device.name",
            "device name cannot be empty",
        ));
    }
    Ok(())
}

fn validate_sensor(blueprint: &AgentBlueprint) -> Result<(), ContractError> {
    let sensor = &blueprint.sensor;

    if !is_positive(sensor.sample_rate_hz) {
        return Err(ContractError::config_validation(
            "sensor.sample_rate_hz",
            format!("sample_rate_hz must be > 0, got {}", sensor.sample_rate_hz),
        ));
    }

    if !is_positive(sensor.sea_level_pressure) {
        return Err(ContractError::config_validation(
            "sensor.sea_level_pressure",
            format!(
                "sea_level_pressure must be > 0, got {}",
                sensor.sea_level_pressure
            ),
        ));
    }

    if sensor.read_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "sensor.read_timeout_ms",
            "read_timeout_ms must be > 0",
        ));
    }

    if !is_non_negative(sensor.sensor_retry_seconds) {
        return Err(ContractError::config_validation(
            "sensor.sensor_retry_seconds",
            format!(
                "sensor_retry_seconds must be >= 0, got {}",
                sensor.sensor_retry_seconds
            ),
        ));
    }

    if sensor.source == SourceKind::Replay && !sensor.params.contains_key("path") {
        return Err(ContractError::config_validation(
            "sensor.params.path",
            "replay source requires a 'path' parameter",
        ));
    }

    Ok(())
}

fn validate_detection(blueprint: &AgentBlueprint) -> Result<(), ContractError> {
    let detection = &blueprint.detection;

    let positive = [
        ("detection.threshold_meters", detection.threshold_meters),
        (
            "detection.comparison_window_seconds",
            detection.comparison_window_seconds,
        ),
        (
            "detection.stabilization_time_seconds",
            detection.stabilization_time_seconds,
        ),
    ];
    for (field, value) in positive {
        if !is_positive(value) {
            return Err(ContractError::config_validation(
                field,
                format!("must be > 0, got {value}"),
            ));
        }
    }

    if !is_non_negative(detection.lookback_seconds) {
        return Err(ContractError::config_validation(
            "detection.lookback_seconds",
            format!("must be >= 0, got {}", detection.lookback_seconds),
        ));
    }

    Ok(())
}

/// 缓冲短于回溯 + 比较窗口会悄悄截断事件
fn validate_buffer(blueprint: &AgentBlueprint) -> Result<(), ContractError> {
    let required = blueprint.detection.required_buffer_seconds();
    let actual = blueprint.buffer.ring_buffer_seconds;
    if actual.is_nan() || actual < required {
        return Err(ContractError::config_validation(
            "buffer.ring_buffer_seconds",
            format!(
                "ring_buffer_seconds ({actual}) must be >= lookback_seconds + comparison_window_seconds ({required})"
            ),
        ));
    }
    Ok(())
}

fn validate_database(blueprint: &AgentBlueprint) -> Result<(), ContractError> {
    let db = &blueprint.database;

    if !is_positive(db.reconnect_delay_seconds) {
        return Err(ContractError::config_validation(
            "database.reconnect_delay_seconds",
            format!(
                "reconnect_delay_seconds must be > 0, got {}",
                db.reconnect_delay_seconds
            ),
        ));
    }

    if db.max_reconnect_delay_seconds < db.reconnect_delay_seconds {
        return Err(ContractError::config_validation(
            "database.reconnect_delay_seconds / database.max_reconnect_delay_seconds",
            format!(
                "reconnect_delay_seconds ({}) must be <= max_reconnect_delay_seconds ({})",
                db.reconnect_delay_seconds, db.max_reconnect_delay_seconds
            ),
        ));
    }

    for (field, value) in [
        ("database.connect_timeout_seconds", db.connect_timeout_seconds),
        ("database.ack_timeout_seconds", db.ack_timeout_seconds),
    ] {
        if !is_positive(value) {
            return Err(ContractError::config_validation(
                field,
                format!("must be > 0, got {value}"),
            ));
        }
    }

    if blueprint.sink.sink_type == SinkType::Network && db.host.trim().is_empty() {
        return Err(ContractError::config_validation(
            "database.host",
            "network sink requires a host",
        ));
    }

    Ok(())
}

fn validate_storage(blueprint: &AgentBlueprint) -> Result<(), ContractError> {
    let storage = &blueprint.storage;

    if storage.offline_data_path.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "storage.offline_data_path",
            "offline_data_path cannot be empty",
        ));
    }

    if storage.max_offline_files == 0 {
        return Err(ContractError::config_validation(
            "storage.max_offline_files",
            "max_offline_files must be >= 1",
        ));
    }

    Ok(())
}

fn validate_sink(blueprint: &AgentBlueprint) -> Result<(), ContractError> {
    let sink = &blueprint.sink;

    if sink.name.is_empty() {
        return Err(ContractError::config_validation(
            "sink.name",
            "sink name cannot be empty",
        ));
    }

    if sink.handoff_capacity == 0 {
        return Err(ContractError::config_validation(
            "sink.handoff_capacity",
            "handoff_capacity must be >= 1",
        ));
    }

    match sink.sink_type {
        SinkType::File if !sink.params.contains_key("path") => {
            Err(ContractError::config_validation(
                "sink.params.path",
                "file sink requires a 'path' parameter",
            ))
        }
        SinkType::Network => match sink.params.get("format").map(String::as_str) {
            None | Some("json") | Some("bincode") => Ok(()),
            Some(other) => Err(ContractError::config_validation(
                "sink.params.format",
                format!("unsupported wire format '{other}', expected 'json' or 'bincode'"),
            )),
        },
        _ => Ok(()),
    }
}
