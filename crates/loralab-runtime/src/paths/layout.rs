//! Root directories the resolver works from.
//!
//! Detects where the compute service lives for each run mode:
//! the source checkout in development, the installed resources when packaged.

use std::env;
use std::path::{Path, PathBuf};

use loralab_core::ResolutionError;

/// Overrides the source checkout root used in development mode.
pub const SOURCE_ROOT_ENV: &str = "LORALAB_SOURCE_ROOT";

/// Overrides the resources directory used in packaged mode.
pub const RESOURCE_DIR_ENV: &str = "LORALAB_RESOURCE_DIR";

/// Directory holding the compute service, relative to either root.
pub const BACKEND_DIR: &str = "backend";

/// Entry-point script of the compute service, relative to the backend directory.
pub const ENTRY_POINT: &str = "main.py";

/// File stem of the bundled compute service executable.
pub const PACKAGED_BINARY_STEM: &str = "loralab-backend";

/// Filesystem roots for both run modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLayout {
    /// Root of the source checkout (development).
    pub source_root: PathBuf,
    /// Directory with bundled resources (packaged).
    pub resource_dir: PathBuf,
}

impl ServiceLayout {
    pub fn new(source_root: impl Into<PathBuf>, resource_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            resource_dir: resource_dir.into(),
        }
    }

    /// Detect both roots for this process.
    ///
    /// Resolution order for the source root:
    /// 1. `LORALAB_SOURCE_ROOT` environment variable
    /// 2. Workspace directory recorded at build time
    ///
    /// Resolution order for the resource directory:
    /// 1. `LORALAB_RESOURCE_DIR` environment variable
    /// 2. `../Resources` when running inside a macOS app bundle
    /// 3. Directory containing the running executable
    pub fn detect() -> Result<Self, ResolutionError> {
        let source_root = env::var_os(SOURCE_ROOT_ENV).map_or_else(
            || PathBuf::from(env!("LORALAB_WORKSPACE_ROOT")),
            PathBuf::from,
        );

        let resource_dir = match env::var_os(RESOURCE_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => {
                let exe = env::current_exe().map_err(|e| {
                    ResolutionError::Layout(format!("cannot locate running executable: {e}"))
                })?;
                let exe_dir = exe.parent().ok_or_else(|| {
                    ResolutionError::Layout(format!("{} has no parent directory", exe.display()))
                })?;
                bundle_resources(exe_dir).unwrap_or_else(|| exe_dir.to_path_buf())
            }
        };

        Ok(Self {
            source_root,
            resource_dir,
        })
    }

    /// Backend directory inside the source checkout.
    pub fn source_backend_dir(&self) -> PathBuf {
        self.source_root.join(BACKEND_DIR)
    }

    /// Entry-point script inside the source checkout.
    pub fn entry_point(&self) -> PathBuf {
        self.source_backend_dir().join(ENTRY_POINT)
    }

    /// Backend directory inside the installed resources.
    pub fn packaged_backend_dir(&self) -> PathBuf {
        self.resource_dir.join(BACKEND_DIR)
    }
}

/// `Foo.app/Contents/MacOS` -> `Foo.app/Contents/Resources`.
fn bundle_resources(exe_dir: &Path) -> Option<PathBuf> {
    if !cfg!(target_os = "macos") || !exe_dir.ends_with("Contents/MacOS") {
        return None;
    }
    let resources = exe_dir.parent()?.join("Resources");
    resources.is_dir().then_some(resources)
}
