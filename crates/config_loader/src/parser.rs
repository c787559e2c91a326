//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON 格式。

use contracts::{AgentBlueprint, ContractError};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<AgentBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<AgentBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<AgentBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SinkType, SourceKind};

    #[test]
    fn test_parse_toml_sections() {
        let content = r#"
[device]
name = "pi-hangar"

[sensor]
sample_rate_hz = 10.0
i2c_address = 0x77
source = "replay"
params = { path = "readings.jsonl" }

[detection]
threshold_meters = 0.5

[database]
host = "10.0.0.5"
port = 4000

[sink]
sink_type = "file"
params = { path = "/mnt/events" }
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.device.name, "pi-hangar");
        assert_eq!(bp.sensor.sample_rate_hz, 10.0);
        assert_eq!(bp.sensor.i2c_address, 0x77);
        assert_eq!(bp.sensor.source, SourceKind::Replay);
        assert_eq!(bp.sensor.params.get("path").map(String::as_str), Some("readings.jsonl"));
        assert_eq!(bp.detection.threshold_meters, 0.5);
        // 未指定的字段保持默认值
        assert_eq!(bp.detection.comparison_window_seconds, 3.0);
        assert_eq!(bp.database.address(), "10.0.0.5:4000");
        assert_eq!(bp.sink.sink_type, SinkType::File);
    }

    #[test]
    fn test_parse_empty_toml_gives_defaults() {
        let bp = parse_toml("").unwrap();
        assert_eq!(bp.sensor.sample_rate_hz, 5.0);
        assert_eq!(bp.storage.max_offline_files, 1000);
        assert_eq!(bp.sink.sink_type, SinkType::Network);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "device": { "name": "bench" },
            "storage": { "offline_data_path": "/var/lib/altimon", "max_offline_files": 50 },
            "sink": { "name": "stdout", "sink_type": "log" }
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.storage.max_offline_files, 50);
        assert_eq!(bp.sink.sink_type, SinkType::Log);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let result = parse_toml("invalid toml [[[");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_sink_type_rejected() {
        let result = parse_toml("[sink]\nsink_type = \"kafka\"\n");
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
