//! Core domain types and port definitions for the LoRA Lab backend supervisor.
//!
//! This crate describes *what* the supervisor manages (configuration, status,
//! events, error taxonomy) and the traits it uses to reach the outside world.
//! It has no process, filesystem or network code; see `loralab-runtime` for
//! the implementations.

pub mod config;
pub mod error;
pub mod events;
pub mod ports;
pub mod status;

pub use config::{ConfigError, Platform, RunMode, ServiceConfig};
pub use error::{CommandError, ErrorCategory, PortExhausted, ResolutionError};
pub use events::{LogLine, OutputStream, ProcessExit, SupervisorEvent};
pub use ports::{
    ExecutableResolver, HealthProber, HealthReport, Invocation, LaunchSpec, ManagedProcess,
    PortAllocator, ProcessEvent, ProcessEventCallback, ProcessSpawner, TerminationSignal,
};
pub use status::{ServiceState, ServiceStatus};
