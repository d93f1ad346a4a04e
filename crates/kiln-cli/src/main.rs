//! kiln - fleet monitor for Bambu printers.
//!
//! Discovers printers on the local network, follows their telemetry, and
//! relays print lifecycle notifications to Slack.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod config;
mod logs;
mod monitor;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(version, about = "Monitor Bambu printers and notify Slack", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the configuration file (default: $XDG_CONFIG_HOME/kiln.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor printers on the local network
    Monitor {
        /// Directory for per-printer report logs (disabled when unset)
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Monitor { log_dir } => monitor::run(config, log_dir).await,
    }
}
