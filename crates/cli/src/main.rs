//! sitecheck CLI - Main Entry Point
//!
//! Exit codes: 0 when everything passed, 1 when any page or link failed,
//! 2 on configuration and contract errors.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use sitecheck_cli::commands::{components, links, run};
use sitecheck_cli::config::Settings;
use sitecheck_cli::output::{print_error, OutputFormat};

/// sitecheck - UI component and link validation for live pages
#[derive(Parser)]
#[command(name = "sitecheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file (defaults to ./sitecheck.toml when present)
    #[arg(long, global = true, env = "SITECHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check pages against an expectation catalog
    Run(run::RunArgs),

    /// List registered component kinds
    Components(components::ComponentsArgs),

    /// Validate standalone URLs
    Links(links::LinksArgs),
}

async fn dispatch(cli: Cli) -> anyhow::Result<bool> {
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => run::execute(args, settings, cli.format).await,
        Commands::Links(args) => links::execute(args, settings, cli.format).await,
        Commands::Components(args) => {
            components::execute(args, cli.format)?;
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}
