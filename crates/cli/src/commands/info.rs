//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::AgentBlueprint;
use dispatcher::OfflineQueue;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    device: String,
    sensor: SensorInfo,
    detection: DetectionInfo,
    delivery: DeliveryInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue: Option<QueueInfo>,
}

#[derive(Serialize)]
struct SensorInfo {
    id: String,
    source: String,
    i2c_address: u16,
    sample_rate_hz: f64,
    sea_level_pressure: f64,
}

#[derive(Serialize)]
struct DetectionInfo {
    threshold_meters: f64,
    comparison_window_seconds: f64,
    stabilization_time_seconds: f64,
    lookback_seconds: f64,
    ring_buffer_seconds: f64,
}

#[derive(Serialize)]
struct DeliveryInfo {
    sink_name: String,
    sink_type: String,
    remote: String,
    database: String,
    table: String,
    offline_path: String,
    max_offline_files: usize,
}

#[derive(Serialize)]
struct QueueInfo {
    depth: usize,
    next_sequence: u64,
    unreadable: usize,
    in_flight: usize,
    quarantined: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    oldest: Option<QueuedEventInfo>,
}

#[derive(Serialize)]
struct QueuedEventInfo {
    id: String,
    age_seconds: i64,
    attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let queue = if args.queue {
        inspect_queue(&blueprint)?
    } else {
        None
    };
    let info = build_config_info(&blueprint, queue);

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

/// Read-only look at the offline queue; `None` when its directory does not exist yet
///
/// A running agent may own the directory, so nothing here may modify it.
fn inspect_queue(blueprint: &AgentBlueprint) -> Result<Option<QueueInfo>> {
    let path = &blueprint.storage.offline_data_path;
    let Some(snapshot) = OfflineQueue::inspect(path, &blueprint.device.name)
        .with_context(|| format!("Failed to inspect offline queue at {}", path.display()))?
    else {
        return Ok(None);
    };

    let oldest = snapshot.oldest.map(|record| QueuedEventInfo {
        age_seconds: (chrono::Utc::now() - record.enqueued_at).num_seconds(),
        attempts: record.attempt_count,
        last_error: record.last_error,
        id: record.event.id,
    });

    Ok(Some(QueueInfo {
        depth: snapshot.depth,
        next_sequence: snapshot.next_sequence,
        unreadable: snapshot.unreadable,
        in_flight: snapshot.in_flight,
        quarantined: snapshot.quarantined,
        oldest,
    }))
}

fn build_config_info(blueprint: &AgentBlueprint, queue: Option<QueueInfo>) -> ConfigInfo {
    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        device: blueprint.device.name.clone(),
        sensor: SensorInfo {
            id: blueprint.sensor.id.clone(),
            source: format!("{:?}", blueprint.sensor.source),
            i2c_address: blueprint.sensor.i2c_address,
            sample_rate_hz: blueprint.sensor.sample_rate_hz,
            sea_level_pressure: blueprint.sensor.sea_level_pressure,
        },
        detection: DetectionInfo {
            threshold_meters: blueprint.detection.threshold_meters,
            comparison_window_seconds: blueprint.detection.comparison_window_seconds,
            stabilization_time_seconds: blueprint.detection.stabilization_time_seconds,
            lookback_seconds: blueprint.detection.lookback_seconds,
            ring_buffer_seconds: blueprint.buffer.ring_buffer_seconds,
        },
        delivery: DeliveryInfo {
            sink_name: blueprint.sink.name.clone(),
            sink_type: format!("{:?}", blueprint.sink.sink_type),
            remote: blueprint.database.address(),
            database: blueprint.database.database.clone(),
            table: blueprint.database.table.clone(),
            offline_path: blueprint.storage.offline_data_path.display().to_string(),
            max_offline_files: blueprint.storage.max_offline_files,
        },
        queue,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  altimon Configuration                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📟 Device");
    println!("   ├─ Version: {}", info.version);
    println!("   └─ Name: {}", info.device);

    let sensor = &info.sensor;
    println!("\n🌡  Sensor");
    println!("   ├─ Id: {} ({})", sensor.id, sensor.source);
    println!("   ├─ I2C Address: {:#04x}", sensor.i2c_address);
    println!("   ├─ Rate: {} Hz", sensor.sample_rate_hz);
    println!("   └─ Sea-level Pressure: {} hPa", sensor.sea_level_pressure);

    let detection = &info.detection;
    println!("\n⚙️  Detection");
    println!("   ├─ Threshold: {} m", detection.threshold_meters);
    println!(
        "   ├─ Comparison Window: {} s",
        detection.comparison_window_seconds
    );
    println!(
        "   ├─ Stabilization: {} s",
        detection.stabilization_time_seconds
    );
    println!("   ├─ Lookback: {} s", detection.lookback_seconds);
    println!("   └─ Ring Buffer: {} s", detection.ring_buffer_seconds);

    let delivery = &info.delivery;
    println!("\n📤 Delivery");
    println!(
        "   ├─ Sink: {} ({})",
        delivery.sink_name, delivery.sink_type
    );
    println!(
        "   ├─ Remote: {} ({}.{})",
        delivery.remote, delivery.database, delivery.table
    );
    println!(
        "   └─ Offline Queue: {} (max {})",
        delivery.offline_path, delivery.max_offline_files
    );

    if let Some(ref queue) = info.queue {
        println!("\n📦 Offline Queue");
        println!("   ├─ Depth: {}", queue.depth);
        println!("   ├─ Next Sequence: {}", queue.next_sequence);
        println!(
            "   ├─ Unreadable / In-flight / Quarantined: {} / {} / {}",
            queue.unreadable, queue.in_flight, queue.quarantined
        );
        match &queue.oldest {
            Some(oldest) => {
                println!("   └─ Oldest: {}", oldest.id);
                println!("      ├─ Age: {} s", oldest.age_seconds);
                println!("      ├─ Attempts: {}", oldest.attempts);
                println!(
                    "      └─ Last Error: {}",
                    oldest.last_error.as_deref().unwrap_or("-")
                );
            }
            None => println!("   └─ Oldest: (empty)"),
        }
    }

    println!();
}
