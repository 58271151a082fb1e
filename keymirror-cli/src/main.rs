//! keymirror: mirror resource manifests into a key-value store and back.
//!
//! # Usage
//!
//! ```text
//! keymirror [--config <path>] run
//! keymirror [--config <path>] inspect <namespace/name> [--json]
//! keymirror [--config <path>] config
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::inspect::InspectArgs;
use keymirror_daemon::DaemonConfig;

#[derive(Parser, Debug)]
#[command(
    name = "keymirror",
    version,
    about = "Keep resource manifests and a key-value store in sync",
    long_about = None,
)]
struct Cli {
    /// Config file (default: ~/.keymirror/config.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sync daemon in the foreground until ctrl-c.
    Run,

    /// Print the store-side fields of one resource.
    Inspect(InspectArgs),

    /// Print the effective configuration.
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = DaemonConfig::load(cli.config.as_deref()).context("failed to load config")?;
    match cli.command {
        Commands::Run => commands::run::run(config),
        Commands::Inspect(args) => args.run(&config),
        Commands::Config => commands::config::run(&config),
    }
}
