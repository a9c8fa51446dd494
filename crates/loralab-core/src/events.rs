//! Supervisor event stream.
//!
//! Every observable change goes through this one event type so consumers
//! subscribe once and see status, output and crashes in the order the
//! supervisor produced them.
//!
//! # Wire Format
//!
//! ```json
//! { "type": "statusChanged", "state": "running", "port": 8000, "restartAttempts": 0 }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCategory;
use crate::status::ServiceStatus;

/// Output stream a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// One line of captured service output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub stream: OutputStream,
    pub line: String,
    pub timestamp: DateTime<Utc>,
}

impl LogLine {
    /// Create a log line stamped with the current time.
    pub fn new(stream: OutputStream, line: impl Into<String>) -> Self {
        Self {
            stream,
            line: line.into(),
            timestamp: Utc::now(),
        }
    }
}

/// How a process ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessExit {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal name (Unix only).
    pub signal: Option<String>,
}

impl ProcessExit {
    pub const fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signal(name: impl Into<String>) -> Self {
        Self {
            code: None,
            signal: Some(name.into()),
        }
    }

    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Short human description, e.g. `exit code 1` or `signal SIGKILL`.
    pub fn describe(&self) -> String {
        match (&self.code, &self.signal) {
            (Some(code), _) => format!("exit code {code}"),
            (None, Some(signal)) => format!("signal {signal}"),
            (None, None) => "unknown exit status".to_string(),
        }
    }
}

/// Event published by the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SupervisorEvent {
    /// Emitted on every state transition with the new status.
    StatusChanged(ServiceStatus),

    /// A line of service output was captured.
    LogLine(LogLine),

    /// The service died while it was running or starting.
    #[serde(rename_all = "camelCase")]
    Crashed {
        exit: ProcessExit,
        category: ErrorCategory,
        /// Consecutive crashes including this one.
        restart_attempts: u32,
        /// Whether another launch is scheduled.
        will_restart: bool,
        /// Last captured output line before the crash.
        last_line: Option<String>,
    },
}

impl SupervisorEvent {
    /// Status carried by the event, if it is a status change.
    pub const fn status(&self) -> Option<&ServiceStatus> {
        match self {
            Self::StatusChanged(status) => Some(status),
            _ => None,
        }
    }
}
