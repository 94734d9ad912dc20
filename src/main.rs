mod alerts;
mod config;
mod database;
mod health;
mod monitoring;
mod pool;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sitewatch", version)]
#[command(about = "Probe configured monitors once and dispatch alerts")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let config = match config::Config::from_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "could not load configuration");
            return ExitCode::FAILURE;
        }
    };

    if cli.print_config {
        println!("{config}");
        return ExitCode::SUCCESS;
    }

    match runner::run(&config).await {
        Ok(()) => {
            info!("monitoring tick completed");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "monitoring tick failed");
            ExitCode::FAILURE
        }
    }
}
