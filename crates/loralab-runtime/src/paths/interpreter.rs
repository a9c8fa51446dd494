//! Python interpreter discovery for development mode.
//!
//! Search policy, first hit wins:
//! 1. `LORALAB_PYTHON` explicit override (must point at an existing file)
//! 2. Well-known locations: project virtualenvs, then per-platform installs
//! 3. `PATH` lookup of `python3`, then `python`

use std::path::{Path, PathBuf};

use loralab_core::{Platform, ResolutionError};
use tracing::debug;

/// Explicit interpreter override.
pub const PYTHON_ENV: &str = "LORALAB_PYTHON";

/// Interpreter search configuration.
#[derive(Debug, Clone)]
pub struct InterpreterSearch {
    /// Value of the explicit override, if any.
    pub override_path: Option<PathBuf>,
    /// Consult per-platform system and user install locations.
    pub system_locations: bool,
    /// Fall back to a `PATH` lookup.
    pub path_lookup: bool,
}

impl Default for InterpreterSearch {
    fn default() -> Self {
        Self::from_env()
    }
}

impl InterpreterSearch {
    /// Full search policy with the override taken from `LORALAB_PYTHON`.
    pub fn from_env() -> Self {
        Self {
            override_path: std::env::var_os(PYTHON_ENV).map(PathBuf::from),
            system_locations: true,
            path_lookup: true,
        }
    }

    /// Only the override and the project's own virtualenvs.
    pub const fn project_only(override_path: Option<PathBuf>) -> Self {
        Self {
            override_path,
            system_locations: false,
            path_lookup: false,
        }
    }

    /// Locate an interpreter for a checkout rooted at `source_root`.
    pub fn find(&self, source_root: &Path, platform: Platform) -> Result<PathBuf, ResolutionError> {
        if let Some(ref path) = self.override_path {
            debug!(path = %path.display(), "Using interpreter override");
            return if path.is_file() {
                Ok(path.clone())
            } else {
                Err(ResolutionError::InterpreterMissing {
                    searched: vec![path.clone()],
                })
            };
        }

        let mut candidates = venv_candidates(source_root, platform);
        if self.system_locations {
            candidates.extend(system_candidates(platform, dirs::home_dir().as_deref()));
        }

        if let Some(found) = candidates.iter().find(|c| is_launchable(c)) {
            debug!(path = %found.display(), "Found interpreter at well-known location");
            return Ok(found.clone());
        }

        if self.path_lookup {
            for name in ["python3", "python"] {
                if let Ok(found) = which::which(name) {
                    debug!(path = %found.display(), "Found interpreter on PATH");
                    return Ok(found);
                }
            }
        }

        Err(ResolutionError::InterpreterMissing {
            searched: candidates,
        })
    }
}

/// Virtualenvs created inside the checkout.
fn venv_candidates(source_root: &Path, platform: Platform) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for venv in [".venv", "venv"] {
        for base in [source_root.to_path_buf(), source_root.join("backend")] {
            let venv_dir = base.join(venv);
            match platform {
                Platform::Windows => out.push(venv_dir.join("Scripts").join("python.exe")),
                Platform::MacOs | Platform::Linux => {
                    out.push(venv_dir.join("bin").join("python3"));
                    out.push(venv_dir.join("bin").join("python"));
                }
            }
        }
    }
    out
}

/// System-wide and per-user install locations.
fn system_candidates(platform: Platform, home: Option<&Path>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();

    match platform {
        Platform::Windows => {
            if let Some(local) = dirs::data_local_dir() {
                for version in ["313", "312", "311", "310"] {
                    out.push(
                        local
                            .join("Programs")
                            .join("Python")
                            .join(format!("Python{version}"))
                            .join("python.exe"),
                    );
                }
            }
            for version in ["313", "312", "311", "310"] {
                out.push(PathBuf::from(format!(r"C:\Python{version}\python.exe")));
            }
            if let Some(home) = home {
                out.push(home.join("miniconda3").join("python.exe"));
                out.push(home.join("anaconda3").join("python.exe"));
            }
        }
        Platform::MacOs => {
            out.push(PathBuf::from("/opt/homebrew/bin/python3"));
            out.push(PathBuf::from("/usr/local/bin/python3"));
            out.push(PathBuf::from(
                "/Library/Frameworks/Python.framework/Versions/Current/bin/python3",
            ));
            push_user_locations(&mut out, home);
            out.push(PathBuf::from("/usr/bin/python3"));
        }
        Platform::Linux => {
            out.push(PathBuf::from("/usr/local/bin/python3"));
            push_user_locations(&mut out, home);
            out.push(PathBuf::from("/usr/bin/python3"));
        }
    }

    out
}

fn push_user_locations(out: &mut Vec<PathBuf>, home: Option<&Path>) {
    if let Some(home) = home {
        out.push(home.join(".pyenv").join("shims").join("python3"));
        out.push(home.join("miniconda3").join("bin").join("python3"));
        out.push(home.join("anaconda3").join("bin").join("python3"));
    }
}

/// Exists, is a file and (on Unix) has an execute bit.
fn is_launchable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_executable(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    #[test]
    fn test_override_wins() {
        let temp = TempDir::new().unwrap();
        let custom = temp.path().join("custom-python");
        make_executable(&custom);

        let search = InterpreterSearch::project_only(Some(custom.clone()));
        assert_eq!(search.find(temp.path(), Platform::current()).unwrap(), custom);
    }

    #[test]
    fn test_missing_override_is_reported() {
        let temp = TempDir::new().unwrap();
        let search = InterpreterSearch::project_only(Some(temp.path().join("nope")));

        let err = search.find(temp.path(), Platform::current()).unwrap_err();
        assert!(matches!(err, ResolutionError::InterpreterMissing { ref searched } if searched.len() == 1));
    }

    #[test]
    #[cfg(unix)]
    fn test_project_venv_found() {
        let temp = TempDir::new().unwrap();
        let venv_python = temp.path().join(".venv").join("bin").join("python3");
        make_executable(&venv_python);

        let search = InterpreterSearch::project_only(None);
        assert_eq!(search.find(temp.path(), Platform::Linux).unwrap(), venv_python);
    }

    #[test]
    fn test_nothing_found_lists_candidates() {
        let temp = TempDir::new().unwrap();
        let search = InterpreterSearch::project_only(None);

        match search.find(temp.path(), Platform::Linux) {
            Err(ResolutionError::InterpreterMissing { searched }) => {
                assert!(searched.iter().any(|p| p.ends_with(".venv/bin/python3")));
            }
            other => panic!("expected InterpreterMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_windows_candidates_use_scripts_dir() {
        let candidates = venv_candidates(Path::new("/src"), Platform::Windows);
        assert!(candidates.iter().all(|p| p.ends_with("Scripts/python.exe")));
    }
}
