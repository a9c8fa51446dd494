//! Known failure signatures in compute service output.
//!
//! Matching is case-insensitive and line based. A match never changes the
//! crash policy by itself, except for [`FailureSignature::PortInUse`] while
//! starting, which the supervisor answers with a relaunch on the next port.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Recognised failure cause found in one output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureSignature {
    /// The service could not bind its port.
    PortInUse,
    /// A Python dependency is missing from the environment.
    MissingModule,
    /// The accelerator ran out of memory.
    OutOfMemory,
    /// The OS refused access to a file or device.
    PermissionDenied,
}

static PORT_IN_USE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)address already in use|eaddrinuse|errno 98|errno 48|only one usage of each socket address",
    )
    .ok()
});

static MISSING_MODULE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)modulenotfounderror|no module named").ok());

static OUT_OF_MEMORY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)cuda out of memory|outofmemoryerror|mps backend out of memory").ok()
});

static PERMISSION_DENIED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)permission denied|permissionerror").ok());

impl FailureSignature {
    const ALL: [Self; 4] = [
        Self::PortInUse,
        Self::MissingModule,
        Self::OutOfMemory,
        Self::PermissionDenied,
    ];

    /// First signature matching `line`, if any.
    pub fn classify(line: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|sig| sig.matches(line))
    }

    pub fn matches(self, line: &str) -> bool {
        let pattern = match self {
            Self::PortInUse => &PORT_IN_USE,
            Self::MissingModule => &MISSING_MODULE,
            Self::OutOfMemory => &OUT_OF_MEMORY,
            Self::PermissionDenied => &PERMISSION_DENIED,
        };
        pattern.as_ref().is_some_and(|re| re.is_match(line))
    }

    /// User-facing hint added to the failure message.
    pub const fn hint(self) -> &'static str {
        match self {
            Self::PortInUse => "The service port is already in use by another program",
            Self::MissingModule => {
                "A Python dependency is missing; reinstall the backend requirements"
            }
            Self::OutOfMemory => {
                "The GPU ran out of memory; close other GPU programs or lower the batch size"
            }
            Self::PermissionDenied => "The service was denied access to a file or device",
        }
    }
}

impl fmt::Display for FailureSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hint())
    }
}
