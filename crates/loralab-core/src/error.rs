//! Error taxonomy for the backend supervisor.
//!
//! Operational failures never escape the supervisor's command methods; they
//! end up in [`ServiceStatus`](crate::ServiceStatus) as an [`ErrorCategory`]
//! plus a message. Only misuse surfaces as a [`CommandError`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::ServiceState;

/// Failure classes reported to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    /// Executable missing, unreadable or not launchable. Not retried.
    Resolution,
    /// No free port in the configured range. Not retried.
    PortExhaustion,
    /// Process spawned but never became healthy. Retried.
    StartupTimeout,
    /// Process exited without being asked to. Retried.
    UnexpectedExit,
    /// Graceful termination was ignored and a forceful kill was needed.
    ShutdownTimeout,
}

impl ErrorCategory {
    /// Whether the supervisor retries this class on its own.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::StartupTimeout | Self::UnexpectedExit)
    }

    pub const fn summary(self) -> &'static str {
        match self {
            Self::Resolution => "The compute service could not be located",
            Self::PortExhaustion => "No free port for the compute service",
            Self::StartupTimeout => "The compute service did not become ready in time",
            Self::UnexpectedExit => "The compute service exited unexpectedly",
            Self::ShutdownTimeout => "The compute service ignored the shutdown request",
        }
    }
}

/// Why the compute service executable could not be resolved.
///
/// Messages are user-facing and carry the remediation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// Development mode: no usable Python interpreter.
    #[error(
        "Python interpreter not found (searched: {}). Install Python 3.10+ or set LORALAB_PYTHON to its path.",
        display_paths(.searched)
    )]
    InterpreterMissing { searched: Vec<PathBuf> },

    /// Development mode: the service entry point is missing from the checkout.
    #[error(
        "Compute service entry point not found at {path}. Make sure the source checkout is complete."
    )]
    EntryPointMissing { path: PathBuf },

    /// Packaged mode: the bundled service executable is missing.
    #[error(
        "Compute service executable not found at {path}. The installation appears to be corrupted; please reinstall the application."
    )]
    InstallationCorrupted { path: PathBuf },

    /// The executable exists but cannot be made executable.
    #[error("Permission denied for {path}: {reason}. Check the file permissions or reinstall.")]
    PermissionDenied { path: PathBuf, reason: String },

    /// The operating system refused to launch the resolved executable.
    #[error("Failed to launch {path}: {reason}")]
    SpawnFailed { path: PathBuf, reason: String },

    /// Resolver roots could not be determined.
    #[error("Failed to resolve compute service location: {0}")]
    Layout(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "PATH".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every port in the scan range is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "No available port in range {first}-{last}. Free up a port or close other running instances."
)]
pub struct PortExhausted {
    pub first: u16,
    pub last: u16,
}

/// Supervisor command rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The command is not valid in the current state (programming error).
    #[error("Cannot {command} while the service is {state}")]
    InvalidState {
        command: &'static str,
        state: ServiceState,
    },

    /// The supervisor task has shut down.
    #[error("Service supervisor is no longer running")]
    Closed,

    /// The command was accepted but the expected state never arrived.
    #[error("Timed out waiting for the service to {command} after {waited_ms}ms")]
    TimedOut {
        command: &'static str,
        waited_ms: u64,
    },
}
