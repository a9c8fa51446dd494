//! Command handlers.

use anyhow::{Context, Result, bail};
use futures_util::StreamExt;
use loralab_core::{ExecutableResolver, ServiceConfig, ServiceState, SupervisorEvent};
use loralab_runtime::{PathResolver, ServiceSupervisor};
use tracing::{info, warn};

use crate::parser::RunArgs;
use crate::presentation::format_event;

/// Supervise the service until Ctrl-C, then shut it down.
pub async fn run(config: ServiceConfig, args: &RunArgs) -> Result<()> {
    let supervisor = ServiceSupervisor::with_defaults(config)
        .context("Failed to set up the service supervisor")?;

    let events = supervisor.events();
    tokio::pin!(events);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    supervisor
        .start()
        .await
        .context("Failed to start the compute service")?;

    let mut failed = None;
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Interrupted, stopping the compute service");
                break;
            }
            event = events.next() => {
                let Some(event) = event else { break };
                print_event(&event, args.json)?;

                if let SupervisorEvent::StatusChanged(status) = &event
                    && status.state == ServiceState::Failed
                    && args.exit_on_failure
                {
                    failed = status.last_error.clone();
                    break;
                }
            }
        }
    }

    let status = supervisor
        .shutdown()
        .await
        .context("The compute service did not stop cleanly")?;
    info!(state = %status.state, "Supervisor finished");

    if let Some(reason) = failed {
        bail!("The compute service failed: {reason}");
    }
    Ok(())
}

fn print_event(event: &SupervisorEvent, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string(event).context("Failed to serialize event")?
        );
    } else {
        println!("{}", format_event(event));
    }
    Ok(())
}

/// Print the resolved invocation for the configured mode.
pub fn resolve(config: &ServiceConfig) -> Result<()> {
    let resolver = PathResolver::from_env().context("Failed to locate the service roots")?;
    let invocation = resolver
        .resolve(config.mode, config.platform)
        .with_context(|| format!("Failed to resolve the compute service ({} mode)", config.mode))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&invocation).context("Failed to serialize invocation")?
    );
    Ok(())
}

/// Print the effective configuration.
pub fn show_config(config: &ServiceConfig) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(config).context("Failed to serialize configuration")?
    );
    Ok(())
}
