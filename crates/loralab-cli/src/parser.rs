//! Command-line definition.

use clap::{Args, Parser, Subcommand};
use loralab_core::{RunMode, ServiceConfig};

/// Supervise the LoRA Lab compute service from a terminal.
///
/// Configuration comes from `LORALAB_*` environment variables (a `.env` file
/// in the working directory is loaded first); flags override both.
#[derive(Parser, Debug)]
#[command(name = "loralab-supervisor")]
#[command(about = "Start, monitor and restart the LoRA Lab compute service")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the compute service and supervise it until Ctrl-C
    Run(RunArgs),
    /// Print how the compute service would be launched
    Resolve,
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Print events as JSON lines
    #[arg(long, env = "LORALAB_EVENTS_JSON")]
    pub json: bool,

    /// Exit with an error once the service has failed for good
    #[arg(long)]
    pub exit_on_failure: bool,
}

/// Flags overriding the environment configuration.
#[derive(Args, Debug, Default)]
pub struct ConfigOverrides {
    /// Run mode: development or packaged
    #[arg(long, global = true)]
    pub mode: Option<RunMode>,

    /// First port to try
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Number of consecutive ports to try
    #[arg(long, global = true)]
    pub port_range: Option<u16>,

    /// Consecutive crashes tolerated before giving up
    #[arg(long, global = true)]
    pub max_restarts: Option<u32>,

    /// Time allowed from launch to the first healthy probe
    #[arg(long, global = true)]
    pub startup_timeout_ms: Option<u64>,

    /// Time between the graceful and the forceful termination request
    #[arg(long, global = true)]
    pub shutdown_grace_ms: Option<u64>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut ServiceConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(port) = self.port {
            config.preferred_port = port;
        }
        if let Some(range) = self.port_range {
            config.port_scan_range = range;
        }
        if let Some(max) = self.max_restarts {
            config.max_restart_attempts = max;
        }
        if let Some(ms) = self.startup_timeout_ms {
            config.startup_timeout_ms = ms;
        }
        if let Some(ms) = self.shutdown_grace_ms {
            config.shutdown_grace_ms = ms;
        }
    }
}
