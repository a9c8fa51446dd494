//! Platform signal plumbing for compute service processes.
//!
//! # Platform behavior
//! - Unix: graceful termination is SIGTERM via nix; forceful is SIGKILL
//! - Windows: no cooperative signal exists, both requests kill the process

use std::io;
use std::process::ExitStatus;

use loralab_core::ProcessExit;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Send SIGTERM to `pid`.
///
/// Returns `Ok(false)` if the process is already gone.
#[cfg(unix)]
pub fn send_sigterm(pid: u32) -> io::Result<bool> {
    let raw = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}")))?;

    match signal::kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(io::Error::other(e)),
    }
}

/// Convert an OS exit status into the domain representation.
pub fn exit_from_status(status: ExitStatus) -> ProcessExit {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(raw) = status.signal() {
            let name = Signal::try_from(raw)
                .map_or_else(|_| format!("SIG{raw}"), |s| s.as_str().to_string());
            return ProcessExit::signal(name);
        }
    }

    status
        .code()
        .map_or_else(ProcessExit::default, ProcessExit::code)
}
