//! Observable supervisor state.
//!
//! The supervisor is the only writer of [`ServiceStatus`]; everything else
//! receives cloned snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCategory;

/// Lifecycle state of the compute service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// No process; initial state of every run.
    Stopped,
    /// Process spawned, waiting for the first healthy probe.
    Starting,
    /// Process alive and answering health probes.
    Running,
    /// Process alive but failing health probes.
    Unhealthy,
    /// Waiting out the backoff before relaunching after a crash.
    Restarting,
    /// Termination requested, waiting for the process to exit.
    Stopping,
    /// Gave up; only an explicit start leaves this state.
    Failed,
}

impl ServiceState {
    /// States in which the status may carry a port.
    pub const fn holds_port(self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Running | Self::Unhealthy | Self::Restarting
        )
    }

    /// States from which `start()` is accepted.
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Unhealthy => "unhealthy",
            Self::Restarting => "restarting",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the supervised service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub state: ServiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Consecutive crashes since the last confirmed healthy start.
    pub restart_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
}

impl ServiceStatus {
    /// Fresh status at application launch.
    pub const fn stopped() -> Self {
        Self {
            state: ServiceState::Stopped,
            port: None,
            pid: None,
            started_at: None,
            restart_attempts: 0,
            last_error: None,
            error_category: None,
        }
    }

    /// Base URL of the compute service, when it has a port.
    pub fn base_url(&self) -> Option<String> {
        self.port.map(|port| format!("http://127.0.0.1:{port}"))
    }

    pub const fn is_running(&self) -> bool {
        matches!(self.state, ServiceState::Running)
    }

    pub fn set_error(&mut self, category: ErrorCategory, message: impl Into<String>) {
        self.error_category = Some(category);
        self.last_error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error_category = None;
        self.last_error = None;
    }

    /// Drop everything tied to a process that is gone.
    pub fn clear_process(&mut self) {
        self.pid = None;
        self.started_at = None;
    }
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self::stopped()
    }
}
