//! bluecast daemon - Bluetooth message receiver
//!
//! Listens for a paired phone, and presents every message it sends on the
//! console, through speech, as a desktop popup and in a daily log file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bluecast_broadcaster::{CommandOutput, CommandRunner, ScriptedRunner, SystemRunner};
use bluecast_daemon::{service, DaemonConfig};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "bluecast-daemon", version, about = "Bluetooth message receiver")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Log external commands instead of running them
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the receiver until SIGINT/SIGTERM (default)
    Run,
    /// Send a test message through every enabled output, then exit
    TestOutputs,
    /// Report adapter availability and details
    CheckAdapter,
}

fn runner_for(dry_run: bool, device: &str) -> Arc<dyn CommandRunner> {
    if dry_run {
        let up = format!("{}:\tType: Primary\n\tUP RUNNING\n", device);
        Arc::new(ScriptedRunner::new().respond("hciconfig", CommandOutput::ok(up)))
    } else {
        Arc::new(SystemRunner)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    info!("📡 Starting bluecast daemon v{}", env!("CARGO_PKG_VERSION"));

    let mut config = DaemonConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    info!("📋 Configuration loaded from {}", config.config_path.display());

    let log_dir = config.resolve_log_dir()?;
    info!("📝 Logging messages to {}", log_dir.display());

    let runner = runner_for(cli.dry_run, &config.transport.hci_device);
    if cli.dry_run {
        info!("Dry run: external commands are logged, not executed");
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            service::run_service(&config, runner)
                .await
                .context("Bluetooth receiver failed")?;
            info!("👋 bluecast daemon stopped");
        }
        Command::TestOutputs => service::test_outputs(&config, runner).await,
        Command::CheckAdapter => {
            if !service::check_adapter(&config, runner).await {
                anyhow::bail!("Bluetooth adapter {} is not available", config.transport.hci_device);
            }
        }
    }

    Ok(())
}
