//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// altimon - edge altitude-change telemetry agent
#[derive(Parser, Debug)]
#[command(
    name = "altimon",
    author,
    version,
    about = "Edge altitude-change telemetry agent",
    long_about = "Samples a barometric altitude sensor, detects significant altitude changes,\n\
                  records each change with its lookback history, and delivers the events\n\
                  to a remote store, queueing them on disk while the store is unreachable."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "ALTIMON_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "ALTIMON_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the agent
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration and offline queue information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "config.toml", env = "ALTIMON_CONFIG")]
    pub config: PathBuf,

    /// Stop after this many seconds (0 = run until Ctrl+C / SIGTERM)
    #[arg(long, default_value = "0", env = "ALTIMON_DURATION")]
    pub duration: u64,

    /// Override the offline queue directory from configuration
    #[arg(long, env = "ALTIMON_OFFLINE_PATH")]
    pub offline_path: Option<PathBuf>,

    /// Override the remote store address (host:port) from configuration
    #[arg(long, env = "ALTIMON_SINK_ADDR")]
    pub sink_addr: Option<String>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "ALTIMON_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml", env = "ALTIMON_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "ALTIMON_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Inspect the offline queue (depth, oldest record)
    #[arg(long)]
    pub queue: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
