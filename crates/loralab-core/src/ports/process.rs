//! Process spawning port.
//!
//! A spawned process reports back exclusively through the callback handed to
//! [`ProcessSpawner::spawn`]. Registering it at spawn time means no output
//! line and no exit can happen before someone is listening.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{LogLine, ProcessExit};
use crate::ports::resolver::Invocation;

/// Fully resolved launch request for one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_directory: PathBuf,
    pub env: Vec<(String, String)>,
    /// Port the service was told to bind.
    pub port: u16,
}

impl LaunchSpec {
    /// Bind an invocation to a port: `--host 127.0.0.1 --port N` plus `LORALAB_PORT=N`.
    pub fn for_port(invocation: Invocation, port: u16) -> Self {
        let mut args = invocation.args;
        args.extend([
            "--host".to_string(),
            "127.0.0.1".to_string(),
            "--port".to_string(),
            port.to_string(),
        ]);

        let mut env = invocation.env;
        env.push(("LORALAB_PORT".to_string(), port.to_string()));

        Self {
            program: invocation.program,
            args,
            working_directory: invocation.working_directory,
            env,
            port,
        }
    }
}

/// Notification from a running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// One line of stdout or stderr.
    Output(LogLine),
    /// The process exited. Delivered exactly once, after which nothing else follows.
    Exited(ProcessExit),
}

/// Receiver of [`ProcessEvent`]s. Called from background tasks.
pub type ProcessEventCallback = Arc<dyn Fn(ProcessEvent) + Send + Sync>;

/// Termination request strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationSignal {
    /// Cooperative request (SIGTERM). Falls back to a kill where unsupported.
    Graceful,
    /// Immediate kill (SIGKILL / TerminateProcess).
    Forceful,
}

/// Handle to one live OS process.
///
/// Holds no escalation policy: the caller decides when a graceful request
/// becomes a forceful one.
pub trait ManagedProcess: Send + Sync {
    fn pid(&self) -> u32;

    fn started_at(&self) -> DateTime<Utc>;

    /// Exit information once the process has exited.
    fn exit(&self) -> Option<ProcessExit>;

    /// Send a termination signal. A no-op if the process already exited.
    fn terminate(&self, signal: TerminationSignal) -> io::Result<()>;
}

/// Launches processes.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(
        &self,
        spec: &LaunchSpec,
        on_event: ProcessEventCallback,
    ) -> io::Result<Box<dyn ManagedProcess>>;
}
