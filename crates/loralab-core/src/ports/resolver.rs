//! Executable resolver port.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{Platform, RunMode};
use crate::error::ResolutionError;

/// How to invoke the compute service, independent of the port it will use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    /// Executable to launch (interpreter or bundled binary).
    pub program: PathBuf,
    /// Arguments preceding the supervisor-provided ones.
    pub args: Vec<String>,
    pub working_directory: PathBuf,
    /// Extra environment for the process.
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_directory: working_directory.into(),
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Resolves where the compute service executable lives.
///
/// This is the single place where development and packaged layouts differ.
/// Implementations may touch the filesystem but must not launch anything.
pub trait ExecutableResolver: Send + Sync {
    fn resolve(&self, mode: RunMode, platform: Platform) -> Result<Invocation, ResolutionError>;
}
