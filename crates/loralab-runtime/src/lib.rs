//! OS-level runtime for the LoRA Lab backend supervisor.
//!
//! Implements the `loralab-core` ports against the real system and hosts the
//! [`ServiceSupervisor`] actor that drives them:
//!
//! - `paths` - Locating the compute service (development checkout or installed bundle)
//! - `ports` - Sequential local port allocation
//! - `process` - Spawning, output capture and termination of the service process
//! - `health` - HTTP health probes
//! - `supervisor` - Lifecycle state machine, restarts and the event stream
#![deny(unsafe_code)]

mod health;
mod logs;
pub mod paths;
pub mod ports;
pub mod process;
mod signatures;
pub mod supervisor;

// Re-export health probing
pub use health::{HEALTH_PATH, HttpHealthProber, health_url};

// Re-export recent output buffer
pub use logs::{DEFAULT_LOG_CAPACITY, LogRing};

// Re-export the default resolver
pub use paths::{PathResolver, ServiceLayout};

// Re-export port allocation
pub use ports::{TcpPortAllocator, allocate_port, is_port_available};

// Re-export process management
pub use process::{ProcessHandle, TokioProcessSpawner};

pub use signatures::FailureSignature;

// Re-export the supervisor
pub use supervisor::{ServiceSupervisor, SupervisorComponents, SupervisorInitError};
