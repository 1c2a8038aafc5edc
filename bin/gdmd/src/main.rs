//! ---
//! gdm_section: "01-core-functionality"
//! gdm_subsection: "binary"
//! gdm_type: "source"
//! gdm_scope: "code"
//! gdm_description: "Binary entrypoint for the GDM daemon."
//! gdm_version: "v0.1.0"
//! gdm_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gdm_bus::{production_bus, SyntheticBus, SyntheticProfile, ValueBus};
use gdm_common::config::{AppConfig, Mode};
use gdm_common::logging::init_tracing;
use gdm_core::DerateMonitor;
use tokio::sync::watch;
use tracing::info;

/// Seed for the synthetic bus so simulation runs are reproducible.
const SIM_SEED: u64 = 0xD1E5E1;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Generator derating monitor daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the derating monitor")]
    Run,
    #[command(about = "Validate configuration, print the effective values, and exit")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/gdmd.toml"));
    candidates.push(PathBuf::from("/etc/gdm/gdmd.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&loaded.config)?);
            println!("configuration OK ({})", loaded.source.display());
            Ok(())
        }
        Commands::Run => run_daemon(loaded.config, loaded.source).await,
    }
}

async fn run_daemon(config: AppConfig, source: PathBuf) -> Result<()> {
    init_tracing("gdmd", &config.logging)?;
    info!(config_path = %source.display(), mode = ?config.mode, "configuration loaded");

    let bus: Arc<dyn ValueBus> = match config.mode {
        Mode::Simulation => {
            let profile = SyntheticProfile {
                outdoor_start: config.derate.temp_reference - 2.0,
                generator_start: config.derate.temp_reference + 20.0,
                altitude: config.derate.altitude_reference + 50.0,
                ..SyntheticProfile::default()
            };
            info!(seed = SIM_SEED, "simulation mode: driving the loop from the synthetic bus");
            Arc::new(SyntheticBus::new(SIM_SEED, config.bus.clone(), profile))
        }
        Mode::Production => production_bus().context(
            "production bus transport unavailable; deploy the gateway bus adapter \
             or run with mode = \"simulation\"",
        )?,
    };
    info!(backend = bus.name(), "gateway bus attached");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = DerateMonitor::new(&config, bus, shutdown_rx);
    let task = tokio::spawn(monitor.run());

    wait_for_shutdown().await?;
    info!("termination signal received; stopping monitor");
    let _ = shutdown_tx.send(true);
    task.await
        .context("monitor task panicked")?
        .context("monitor loop failed")?;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
