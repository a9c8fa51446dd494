//! Port definitions (trait abstractions) for the supervisor's collaborators.
//!
//! The supervisor only talks to the outside world through these traits.
//! Runtime implementations live in `loralab-runtime`; tests substitute fakes.
//!
//! # Design Rules
//!
//! - No tokio/reqwest/nix types in any signature
//! - Intent-based methods: "resolve", "allocate", "spawn", "probe"
//! - Dev/prod divergence is only visible to the resolver

pub mod health;
pub mod port_allocator;
pub mod process;
pub mod resolver;

pub use health::{HealthProber, HealthReport};
pub use port_allocator::PortAllocator;
pub use process::{
    LaunchSpec, ManagedProcess, ProcessEvent, ProcessEventCallback, ProcessSpawner,
    TerminationSignal,
};
pub use resolver::{ExecutableResolver, Invocation};
