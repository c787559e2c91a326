//! `validate` command: parse, validate, and list non-fatal warnings.

use anyhow::{Context, Result};
use contracts::{AgentBlueprint, DetectionConfig, SinkType, SourceKind};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;
use crate::error::CliError;

#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    device: String,
    sensor: String,
    sample_rate_hz: f64,
    threshold_meters: f64,
    /// Samples held by the ring buffer at the configured rate
    buffer_samples: u64,
    sink_type: String,
    remote: String,
}

pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    match result.error {
        None => Ok(()),
        Some(message) => Err(CliError::config_validation(message).into()),
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            error: Some(CliError::config_not_found(&args.config).to_string()),
            config_path,
            warnings: None,
            summary: None,
        };
    }

    // Load runs the validator as well
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    device: blueprint.device.name.clone(),
                    sensor: blueprint.sensor.id.clone(),
                    sample_rate_hz: blueprint.sensor.sample_rate_hz,
                    threshold_meters: blueprint.detection.threshold_meters,
                    buffer_samples: (blueprint.buffer.ring_buffer_seconds
                        * blueprint.sensor.sample_rate_hz)
                        .ceil() as u64,
                    sink_type: format!("{:?}", blueprint.sink.sink_type),
                    remote: blueprint.database.address(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Settings that load fine but are unlikely on a deployed device
fn collect_warnings(blueprint: &AgentBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sink.sink_type == SinkType::Log {
        warnings.push("sink.sink_type is 'log' - events are only written to the log".to_string());
    }

    if blueprint.sensor.source == SourceKind::Mock {
        warnings.push("sensor.source is 'mock' - readings are synthetic".to_string());
    }

    let lookback = blueprint.detection.lookback_seconds;
    if lookback != DetectionConfig::STANDARD_LOOKBACK_SECONDS {
        warnings.push(format!(
            "detection.lookback_seconds is {} - events start {} s before the trigger \
             instead of the standard {} s",
            lookback,
            lookback,
            DetectionConfig::STANDARD_LOOKBACK_SECONDS
        ));
    }

    let margin =
        blueprint.buffer.ring_buffer_seconds - blueprint.detection.required_buffer_seconds();
    if margin < 1.0 {
        warnings.push(format!(
            "buffer.ring_buffer_seconds leaves {:.1}s beyond lookback + comparison window - \
             early lookback samples may be evicted before an event is assembled",
            margin
        ));
    }

    if blueprint.database.reconnect_attempts == 0 {
        warnings.push(
            "database.reconnect_attempts is 0 - retry delay stays at reconnect_delay_seconds"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    let Some(summary) = result.summary.as_ref() else {
        println!("✗ {} is invalid", result.config_path);
        if let Some(error) = &result.error {
            println!("  {}", error);
        }
        return;
    };

    println!("✓ {} is valid ({})", result.config_path, summary.version);
    println!(
        "  {} / {} @ {} Hz, threshold {} m, buffer ~{} samples",
        summary.device,
        summary.sensor,
        summary.sample_rate_hz,
        summary.threshold_meters,
        summary.buffer_samples
    );
    println!("  delivery: {} -> {}", summary.sink_type, summary.remote);

    for warning in result.warnings.iter().flatten() {
        println!("  ⚠ {}", warning);
    }
}
