//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod config_cmd;
mod plan;
mod pool;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use domain_throttle::ThrottleConfig;

#[derive(Parser)]
#[command(name = "throttle")]
#[command(about = "Per-domain politeness throttling for worker pools")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Minimum spacing between requests to one domain, in milliseconds
    #[arg(long, global = true)]
    backoff_ms: Option<u64>,

    /// Idle time before a domain's state is purged, in milliseconds
    #[arg(long, global = true)]
    retention_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Show the wait each request would get if all were issued at once
    Plan {
        /// File with one URL or hostname per line (default: stdin)
        file: Option<PathBuf>,
    },

    /// Pace requests through a worker pool and report when each is released
    Run {
        /// File with one URL or hostname per line (default: stdin)
        file: Option<PathBuf>,
        /// Number of concurrent workers (default: 8)
        #[arg(short, long, default_value = "8")]
        workers: usize,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Load config from the explicit path or auto-discovery, then apply CLI flags.
async fn load_config(cli: &Cli) -> anyhow::Result<ThrottleConfig> {
    let mut config = match cli.config {
        Some(ref path) => ThrottleConfig::load_from_path(path).await?,
        None => ThrottleConfig::load().await?,
    };

    if let Some(ms) = cli.backoff_ms {
        config.backoff_interval_ms = ms;
    }
    if let Some(ms) = cli.retention_ms {
        config.retention_window_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli).await?;

    match cli.command {
        Commands::Plan { file } => plan::cmd_plan(&config, file.as_deref()),
        Commands::Run { file, workers } => pool::cmd_run(&config, file.as_deref(), workers).await,
        Commands::Config => config_cmd::cmd_config_show(&config),
    }
}
