//! Configuration CLI
//!
//! Inspect the effective configuration, explain where values come from and
//! persist edits into the user or system layer.

mod cli;
mod commands;
mod error;

use std::path::Path;

use clap::Parser;
use colored::Colorize;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cli::{Cli, Commands};
use error::{CliError, Result};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `show --json` stays machine readable.
    if cli.verbose {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_target(true)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| CliError::user(format!("failed to set tracing subscriber: {e}")))?;
        tracing::debug!("Verbose mode enabled");
    } else if matches!(cli.command, Some(Commands::Watch { .. })) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| CliError::user(format!("failed to set tracing subscriber: {e}")))?;
    }

    match cli.command {
        Some(cmd) => execute_command(cmd, cli.settings.as_deref()).await,
        None => {
            println!("{} Layered configuration CLI", "conf".green().bold());
            println!();
            println!("Run {} for available commands.", "conf --help".cyan());
            Ok(())
        }
    }
}

async fn execute_command(cmd: Commands, settings_path: Option<&Path>) -> Result<()> {
    let settings = commands::load_settings(settings_path)?;
    match cmd {
        Commands::Show { json } => commands::run_show(settings, json).await,
        Commands::Get { path } => commands::run_get(settings, &path).await,
        Commands::Explain { path } => commands::run_explain(settings, &path).await,
        Commands::Layers { json } => commands::run_layers(settings, json).await,
        Commands::Set {
            path,
            value,
            system,
        } => commands::run_set(&settings, &path, &value, system),
        Commands::Watch { prefix } => commands::run_watch(settings, &prefix).await,
    }
}
