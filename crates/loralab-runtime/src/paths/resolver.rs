//! Compute service executable resolution.
//!
//! This is the one place where development and packaged runs diverge. The
//! supervisor asks for an [`Invocation`] and never looks at the run mode
//! itself.

use std::path::{Path, PathBuf};

use loralab_core::{ExecutableResolver, Invocation, Platform, ResolutionError, RunMode};
use tracing::{debug, info, warn};

use super::interpreter::InterpreterSearch;
use super::layout::{PACKAGED_BINARY_STEM, ServiceLayout};

/// [`ExecutableResolver`] backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct PathResolver {
    layout: ServiceLayout,
    interpreter: InterpreterSearch,
}

impl PathResolver {
    pub const fn new(layout: ServiceLayout, interpreter: InterpreterSearch) -> Self {
        Self {
            layout,
            interpreter,
        }
    }

    /// Resolver with roots and interpreter override taken from the environment.
    pub fn from_env() -> Result<Self, ResolutionError> {
        Ok(Self::new(ServiceLayout::detect()?, InterpreterSearch::from_env()))
    }

    pub const fn layout(&self) -> &ServiceLayout {
        &self.layout
    }

    fn resolve_development(&self, platform: Platform) -> Result<Invocation, ResolutionError> {
        let interpreter = self.interpreter.find(&self.layout.source_root, platform)?;

        let entry_point = self.layout.entry_point();
        if !entry_point.is_file() {
            return Err(ResolutionError::EntryPointMissing { path: entry_point });
        }

        debug!(
            interpreter = %interpreter.display(),
            entry_point = %entry_point.display(),
            "Resolved development invocation"
        );

        Ok(
            Invocation::new(interpreter, self.layout.source_backend_dir())
                .arg(entry_point.to_string_lossy())
                .env("PYTHONUNBUFFERED", "1"),
        )
    }

    fn resolve_packaged(&self, platform: Platform) -> Result<Invocation, ResolutionError> {
        let backend_dir = self.layout.packaged_backend_dir();
        let binary = packaged_binary_path(&backend_dir, platform);

        if !binary.is_file() {
            return Err(ResolutionError::InstallationCorrupted { path: binary });
        }

        if platform.has_exec_bit() {
            ensure_executable(&binary)?;
        }

        debug!(binary = %binary.display(), "Resolved packaged invocation");
        Ok(Invocation::new(binary, backend_dir))
    }
}

impl ExecutableResolver for PathResolver {
    fn resolve(&self, mode: RunMode, platform: Platform) -> Result<Invocation, ResolutionError> {
        match mode {
            RunMode::Development => self.resolve_development(platform),
            RunMode::Packaged => self.resolve_packaged(platform),
        }
    }
}

/// Platform-specific name of the bundled executable.
pub fn packaged_binary_path(backend_dir: &Path, platform: Platform) -> PathBuf {
    backend_dir.join(format!("{PACKAGED_BINARY_STEM}{}", platform.exe_suffix()))
}

/// Make sure `path` has an execute bit, adding one if it is missing.
///
/// Installers and auto-updates occasionally drop the bit when they replace
/// the binary between launches.
#[cfg(unix)]
fn ensure_executable(path: &Path) -> Result<(), ResolutionError> {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|e| ResolutionError::PermissionDenied {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mode = metadata.permissions().mode();
    if mode & 0o111 != 0 {
        return Ok(());
    }

    warn!(path = %path.display(), mode = format!("{mode:o}"), "Executable bit missing, fixing");
    fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o755)).map_err(|e| {
        ResolutionError::PermissionDenied {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    info!(path = %path.display(), "Restored execute permission");
    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn ensure_executable(_path: &Path) -> Result<(), ResolutionError> {
    Ok(())
}
