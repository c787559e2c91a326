//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{AgentBlueprint, SinkType};
use std::time::Duration;
use tracing::{info, warn};

use altimon_cli::{Orchestrator, OrchestratorConfig};
use config_loader::ConfigLoader;

use crate::cli::RunArgs;
use crate::error::CliError;

/// Execute the `run` command
pub async fn run_agent(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    // Validate config path
    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    // Load and parse configuration
    let mut blueprint = ConfigLoader::load_from_path(&args.config).map_err(|e| {
        CliError::config_validation(format!("{}: {}", args.config.display(), e))
    })?;

    // Apply CLI overrides
    apply_overrides(&mut blueprint, args)?;
    ConfigLoader::validate(&blueprint)
        .map_err(|e| CliError::config_validation(e.to_string()))?;

    info!(
        device = %blueprint.device.name,
        sensor = %blueprint.sensor.id,
        sample_rate_hz = blueprint.sensor.sample_rate_hz,
        sink = ?blueprint.sink.sink_type,
        remote = %blueprint.database.address(),
        offline_path = %blueprint.storage.offline_data_path.display(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)
            .context("Failed to start metrics exporter")?;
    }

    let orchestrator = Orchestrator::new(OrchestratorConfig {
        blueprint,
        duration: if args.duration == 0 {
            None
        } else {
            Some(Duration::from_secs(args.duration))
        },
    });

    info!("Starting agent...");

    let stats = orchestrator
        .run(setup_shutdown_signal())
        .await
        .context("Agent execution failed")?;

    info!(
        samples = stats.samples_taken,
        events = stats.events_emitted,
        delivered = stats.delivery.delivered,
        queued = stats.final_queue_depth,
        duration_secs = stats.duration.as_secs_f64(),
        rate_hz = format!("{:.2}", stats.actual_rate_hz()),
        "Agent stopped"
    );
    stats.print_summary();

    Ok(())
}

/// Apply `--offline-path` and `--sink-addr` on top of the loaded configuration
fn apply_overrides(blueprint: &mut AgentBlueprint, args: &RunArgs) -> Result<(), CliError> {
    if let Some(ref path) = args.offline_path {
        info!(path = %path.display(), "Overriding offline queue path from CLI");
        blueprint.storage.offline_data_path = path.clone();
    }

    if let Some(ref addr) = args.sink_addr {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| CliError::invalid_override("--sink-addr", "expected host:port"))?;
        if host.is_empty() {
            return Err(CliError::invalid_override("--sink-addr", "host is empty"));
        }
        let port: u16 = port.parse().map_err(|_| {
            CliError::invalid_override("--sink-addr", format!("invalid port '{}'", port))
        })?;

        info!(host = %host, port, "Overriding remote store address from CLI");
        blueprint.database.host = host.to_string();
        blueprint.database.port = port;
        // an explicit sink param would otherwise shadow the override
        blueprint.sink.params.remove("addr");

        if blueprint.sink.sink_type != SinkType::Network {
            warn!(
                sink = ?blueprint.sink.sink_type,
                "--sink-addr has no effect on a non-network sink"
            );
        }
    }

    Ok(())
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("Received shutdown signal, stopping agent...");
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &AgentBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Device: {}", blueprint.device.name);

    let sensor = &blueprint.sensor;
    println!("\nSensor:");
    println!("  Id: {} ({:?})", sensor.id, sensor.source);
    println!("  I2C address: {:#04x}", sensor.i2c_address);
    println!("  Rate: {} Hz", sensor.sample_rate_hz);
    println!("  Sea-level pressure: {} hPa", sensor.sea_level_pressure);

    let detection = &blueprint.detection;
    println!("\nDetection:");
    println!("  Threshold: {} m", detection.threshold_meters);
    println!("  Comparison window: {} s", detection.comparison_window_seconds);
    println!("  Stabilization: {} s", detection.stabilization_time_seconds);
    println!("  Lookback: {} s", detection.lookback_seconds);
    println!("  Ring buffer: {} s", blueprint.buffer.ring_buffer_seconds);

    println!("\nDelivery:");
    println!(
        "  Sink: {} ({:?})",
        blueprint.sink.name, blueprint.sink.sink_type
    );
    println!(
        "  Remote: {} ({}.{})",
        blueprint.database.address(),
        blueprint.database.database,
        blueprint.database.table
    );
    println!(
        "  Offline queue: {} (max {} records)",
        blueprint.storage.offline_data_path.display(),
        blueprint.storage.max_offline_files
    );

    println!();
}
