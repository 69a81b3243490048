//! Real-time trading-safety gate and automated exit engine for newly
//! launched Solana tokens.
//!
//! # WARNING
//! This crate's exit engine can sign and send real swaps when
//! `exit.auto_execute` is on. Only point it at a wallet you can afford
//! to lose funds from.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use token_gate::cli::commands;
use token_gate::config::Config;

#[derive(Parser)]
#[command(name = "token-gate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a candidate through the Gate Orchestrator and print the decision
    Evaluate {
        /// Path to a JSON file holding one Candidate
        candidate: PathBuf,
    },

    /// Run one Auto-Exit Engine scan over open positions
    ScanExits,

    /// Show the loaded configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("token_gate=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Evaluate { candidate } => commands::evaluate(&config, &candidate).await,
        Commands::ScanExits => commands::scan_exits(&config).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
