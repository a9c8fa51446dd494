//! Supervisor configuration types and validation.
//!
//! `ServiceConfig` is built once per application run and never mutated
//! afterwards. Values come from compiled defaults, optionally overlaid with
//! `LORALAB_*` environment variables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default first port tried for the compute service.
pub const DEFAULT_PREFERRED_PORT: u16 = 8000;

/// Default number of consecutive ports probed starting at the preferred port.
pub const DEFAULT_PORT_SCAN_RANGE: u16 = 10;

/// Environment variable forcing the run mode (`development` or `packaged`).
pub const MODE_ENV: &str = "LORALAB_MODE";

/// How the application (and therefore the compute service) is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Running from a source checkout; the service runs under a Python interpreter.
    Development,
    /// Running from an installed distribution with a pre-built service executable.
    Packaged,
}

impl RunMode {
    /// Detect the run mode for this process.
    ///
    /// Resolution order:
    /// 1. `LORALAB_MODE` environment variable
    /// 2. Debug builds run in development mode, release builds are packaged
    pub fn detect() -> Self {
        std::env::var(MODE_ENV)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(if cfg!(debug_assertions) {
                Self::Development
            } else {
                Self::Packaged
            })
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Packaged => "packaged",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "packaged" | "prod" | "production" => Ok(Self::Packaged),
            other => Err(ConfigError::InvalidValue {
                key: MODE_ENV.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Operating system family the compute service runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    #[serde(rename = "macos")]
    MacOs,
    Linux,
}

impl Platform {
    /// Platform this binary was compiled for.
    pub const fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Suffix appended to executable file names.
    pub const fn exe_suffix(self) -> &'static str {
        match self {
            Self::Windows => ".exe",
            Self::MacOs | Self::Linux => "",
        }
    }

    /// Whether files need an execute permission bit to be launched.
    pub const fn has_exec_bit(self) -> bool {
        !matches!(self, Self::Windows)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub mode: RunMode,
    pub platform: Platform,
    /// First port tried when allocating the service port.
    pub preferred_port: u16,
    /// Number of consecutive ports probed, starting at `preferred_port`.
    pub port_scan_range: u16,
    /// Consecutive crashes tolerated before giving up.
    pub max_restart_attempts: u32,
    /// Base backoff; attempt `k` waits `k * restart_backoff_ms`.
    pub restart_backoff_ms: u64,
    pub health_check_interval_ms: u64,
    pub health_check_timeout_ms: u64,
    /// Time between the graceful signal and the forceful kill.
    pub shutdown_grace_ms: u64,
    /// Maximum time from spawn to the first healthy probe.
    pub startup_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::detect(),
            platform: Platform::current(),
            preferred_port: DEFAULT_PREFERRED_PORT,
            port_scan_range: DEFAULT_PORT_SCAN_RANGE,
            max_restart_attempts: 3,
            restart_backoff_ms: 2_000,
            health_check_interval_ms: 1_000,
            health_check_timeout_ms: 800,
            shutdown_grace_ms: 5_000,
            startup_timeout_ms: 90_000,
        }
    }
}

impl ServiceConfig {
    /// Defaults overlaid with `LORALAB_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from an arbitrary key lookup.
    ///
    /// Unknown keys are ignored; a present but unparsable value is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(MODE_ENV) {
            config.mode = raw.parse()?;
        }
        overlay(&lookup, "LORALAB_PREFERRED_PORT", &mut config.preferred_port)?;
        overlay(&lookup, "LORALAB_PORT_SCAN_RANGE", &mut config.port_scan_range)?;
        overlay(
            &lookup,
            "LORALAB_MAX_RESTART_ATTEMPTS",
            &mut config.max_restart_attempts,
        )?;
        overlay(&lookup, "LORALAB_RESTART_BACKOFF_MS", &mut config.restart_backoff_ms)?;
        overlay(
            &lookup,
            "LORALAB_HEALTH_INTERVAL_MS",
            &mut config.health_check_interval_ms,
        )?;
        overlay(
            &lookup,
            "LORALAB_HEALTH_TIMEOUT_MS",
            &mut config.health_check_timeout_ms,
        )?;
        overlay(&lookup, "LORALAB_SHUTDOWN_GRACE_MS", &mut config.shutdown_grace_ms)?;
        overlay(&lookup, "LORALAB_STARTUP_TIMEOUT_MS", &mut config.startup_timeout_ms)?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preferred_port < 1024 {
            return Err(ConfigError::PrivilegedPort(self.preferred_port));
        }
        if self.port_scan_range == 0 {
            return Err(ConfigError::EmptyPortRange);
        }
        if u32::from(self.preferred_port) + u32::from(self.port_scan_range) - 1
            > u32::from(u16::MAX)
        {
            return Err(ConfigError::PortRangeOverflow {
                preferred: self.preferred_port,
                range: self.port_scan_range,
            });
        }
        if self.health_check_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("healthCheckIntervalMs"));
        }
        if self.health_check_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("healthCheckTimeoutMs"));
        }
        if self.startup_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("startupTimeoutMs"));
        }
        Ok(())
    }

    /// Last port of the scan range (inclusive).
    pub fn last_port(&self) -> u16 {
        self.preferred_port
            .saturating_add(self.port_scan_range.saturating_sub(1))
    }

    /// Wait before restart attempt `attempt` (1-based). Linear in `attempt`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.restart_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    pub const fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub const fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

fn overlay<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("Port should be >= 1024 (privileged ports require root), got {0}")]
    PrivilegedPort(u16),

    #[error("Port scan range must contain at least one port")]
    EmptyPortRange,

    #[error("Port range starting at {preferred} with {range} ports exceeds 65535")]
    PortRangeOverflow { preferred: u16, range: u16 },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}
