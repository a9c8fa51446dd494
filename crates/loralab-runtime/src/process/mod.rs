//! Compute service process management.
//!
//! # Structure
//!
//! - `ProcessHandle` - One live OS process: PID, start time, exit, termination
//! - `TokioProcessSpawner` - `ProcessSpawner` port implementation
//! - Stream readers forwarding stdout/stderr line by line
//! - Platform signal helpers (SIGTERM on Unix, kill elsewhere)

mod handle;
mod signal;
mod stream;

pub use handle::{ProcessHandle, TokioProcessSpawner};
pub use signal::exit_from_status;
