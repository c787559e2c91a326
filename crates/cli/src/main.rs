//! # altimon CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载、覆盖与验证
//! - Agent 运行与优雅关闭 (Ctrl+C / SIGTERM)
//! - 离线队列检查
//!
//! 退出码：0 成功，1 运行失败，78 配置错误 (EX_CONFIG)。

mod cli;
mod commands;
mod error;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use cli::{Cli, Commands};
use commands::{run_agent, run_info, run_validate};
use error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("altimon: {e:#}");
        return ExitCode::FAILURE;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "altimon starting");

    let result = match &cli.command {
        Commands::Run(args) => run_agent(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = format!("{e:#}"), "Command failed");
            match e.downcast_ref::<CliError>() {
                Some(cli_error) => cli_error.exit_code(),
                None => ExitCode::FAILURE,
            }
        }
    }
}

/// Verbosity flags select the default level; RUST_LOG still wins when set.
/// The metrics endpoint is installed later by `run`, which owns the port flag.
fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let default_log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };

    observability::init_with_config(observability::ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: None,
        default_log_level: default_log_level.to_string(),
    })
}
