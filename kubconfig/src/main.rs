//! kubconfig - Temporary cluster access for kubectl users
//!
//! Fetches a kubeconfig, mints a short-lived service account token against
//! it and cleans the service account up again when the session ends.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;
mod config;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("kubconfig=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load()?;

    // Execute command
    match cli.command {
        Commands::Init(args) => commands::init::execute(args, &config).await,
        Commands::List => commands::list::execute(&config).await,
        Commands::Activate(args) => commands::activate::execute(args, &config).await,
        Commands::Deactivate => commands::deactivate::execute(&config).await,
        Commands::Status => commands::status::execute(&config).await,
        Commands::Current => commands::current::execute(&config).await,
        Commands::Clear => commands::clear::execute(&config).await,
        Commands::Cleanup { older_than } => commands::cleanup::execute(older_than, &config).await,
        Commands::Verify => commands::verify::execute(&config).await,
        Commands::Version => {
            println!("kubconfig {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
