//! Human-readable event lines.

use loralab_core::{ServiceStatus, SupervisorEvent};

pub fn format_event(event: &SupervisorEvent) -> String {
    match event {
        SupervisorEvent::StatusChanged(status) => format_status(status),
        SupervisorEvent::LogLine(line) => format!("[{}] {}", line.stream.as_str(), line.line),
        SupervisorEvent::Crashed {
            exit,
            restart_attempts,
            will_restart,
            ..
        } => {
            let next = if *will_restart {
                "restarting"
            } else {
                "giving up"
            };
            format!(
                "[crash] {} (attempt {restart_attempts}, {next})",
                exit.describe()
            )
        }
    }
}

fn format_status(status: &ServiceStatus) -> String {
    let mut line = format!("[status] {}", status.state);
    if let Some(port) = status.port {
        line.push_str(&format!(" port={port}"));
    }
    if let Some(pid) = status.pid {
        line.push_str(&format!(" pid={pid}"));
    }
    if status.restart_attempts > 0 {
        line.push_str(&format!(" attempts={}", status.restart_attempts));
    }
    if let Some(error) = &status.last_error {
        line.push_str(&format!(" error={error:?}"));
    }
    line
}
