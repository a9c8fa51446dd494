//! CLI entry point - the composition root.
//!
//! The only place where configuration sources, logging and the runtime
//! components are wired together.

mod handlers;
mod parser;
mod presentation;

use anyhow::{Context, Result};
use clap::Parser;
use loralab_core::ServiceConfig;
use tracing_subscriber::EnvFilter;

use crate::parser::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = ServiceConfig::from_env().context("Invalid LORALAB_* configuration")?;
    cli.overrides.apply(&mut config);
    config.validate().context("Invalid command-line configuration")?;

    match &cli.command {
        Command::Run(args) => handlers::run(config, args).await,
        Command::Resolve => handlers::resolve(&config),
        Command::Config => handlers::show_config(&config),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
