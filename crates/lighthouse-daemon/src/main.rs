//! Lighthouse - Main entry point
//!
//! Scans the local network, keeps a persistent record of every device seen,
//! and serves the current presence view over HTTP.

mod api;
mod commands;
mod config;
mod server;
mod state;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lighthouse_core::DeviceStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lighthouse")]
#[command(about = "Network device discovery tool")]
#[command(long_about = "Scan your local network and track devices.

Quick start:
  1. See your networks:  lighthouse networks
  2. Run a scan:         lighthouse scan
  3. Open the dashboard: lighthouse serve")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "lighthouse.toml")]
    config: PathBuf,

    /// Path to the device database (overrides the configuration file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a network for devices (auto-detects the primary network if omitted)
    Scan {
        /// Network in CIDR form, e.g. 192.168.1.0/24
        network: Option<String>,
    },

    /// List discovered devices
    List,

    /// List detected networks
    Networks,

    /// Start the web dashboard and REST API
    Serve {
        /// Bind address for web server
        #[arg(short, long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = cli.log_level.to_lowercase();
        EnvFilter::new(format!(
            "lighthouse_core={level},lighthouse_discovery={level},lighthouse_daemon={level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        let message = format!("{:#}", e);
        tracing::error!(error = %message, "Command failed");
        std::process::exit(commands::exit_code(&e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Lighthouse v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = config::load_config(&cli.config)?;
    if let Some(db) = &cli.db {
        config.storage.path = db.display().to_string();
    }

    // The store is the one resource whose failure is fatal
    let store = Arc::new(
        DeviceStore::open(&config.storage.path)
            .with_context(|| format!("Failed to open database {}", config.storage.path))?,
    );

    let result = dispatch(cli, config, store.clone()).await;

    match Arc::try_unwrap(store) {
        Ok(store) => {
            if let Err(e) = store.close() {
                warn!(error = %e, "Failed to close device store cleanly");
            }
        }
        Err(_) => warn!("Device store still in use at shutdown, closing on drop"),
    }

    result
}

async fn dispatch(cli: Cli, mut config: config::Config, store: Arc<DeviceStore>) -> Result<()> {
    if let Commands::Serve { bind: Some(bind) } = &cli.command {
        config.daemon.bind = bind.clone();
    }

    let state = state::AppState::new(config, store);
    let presence = state.presence.clone();

    match cli.command {
        Commands::Scan { network } => {
            commands::cmd_scan(&presence, network.as_deref(), cli.format).await
        }
        Commands::List => commands::cmd_list(&presence, cli.format),
        Commands::Networks => commands::cmd_networks(&presence, cli.format),
        Commands::Serve { .. } => {
            let bind = state.config.daemon.bind.clone();
            println!("Starting Lighthouse web server...");
            println!("Open your browser: http://{}", bind);
            println!();
            server::run(state, &bind, server::shutdown_signal()).await
        }
    }
}
