//! Health prober port.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of a single health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HealthReport {
    /// The status endpoint answered with success.
    Healthy,
    /// Anything else: error status, refused, reset or timed out.
    Unhealthy { reason: String },
}

impl HealthReport {
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self::Unhealthy {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Issues one health request against the compute service.
///
/// Scheduling is the caller's job; implementations perform exactly one
/// request per call and must return within `timeout`.
#[async_trait]
pub trait HealthProber: Send + Sync {
    async fn probe(&self, port: u16, timeout: Duration) -> HealthReport;
}
