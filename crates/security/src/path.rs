//! Path validation: sandbox confinement and the sensitive-location deny-list.
//!
//! Paths are resolved against the working directory, normalized lexically,
//! and canonicalized when they (or their parent) exist so a symlink cannot
//! point a confined tool outside its roots.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathValidationError {
    #[error("path outside sandbox")]
    OutsideSandbox { path: PathBuf },

    #[error("path contains sensitive system files")]
    SensitivePath { path: PathBuf },
}

/// Files that are never readable or writable, sandbox or not.
const SENSITIVE_FILES: &[&str] = &["/etc/shadow", "/etc/master.passwd"];

/// Directories under `$HOME` holding credentials.
const SENSITIVE_HOME_DIRS: &[&str] = &[
    ".ssh",
    ".gnupg",
    ".aws",
    ".config/gcloud",
    ".docker",
    ".kube",
];

/// Join a relative path onto `work_dir` and normalize the result.
pub fn resolve_path(work_dir: &Path, path: &str) -> PathBuf {
    let expanded = expand_tilde(path);
    let candidate = Path::new(&expanded);
    if candidate.is_absolute() {
        normalize(candidate)
    } else {
        normalize(&work_dir.join(candidate))
    }
}

/// Lexically remove `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve symlinks where possible; fall back to the normalized path for
/// files that do not exist yet.
fn canonical(path: &Path) -> PathBuf {
    let normalized = normalize(path);
    if let Ok(real) = normalized.canonicalize() {
        return real;
    }
    if let (Some(parent), Some(name)) = (normalized.parent(), normalized.file_name())
        && let Ok(real_parent) = parent.canonicalize()
    {
        return real_parent.join(name);
    }
    normalized
}

/// Whether `path` lies within one of `roots`.
///
/// A path matches a root when it equals the root or sits below it on a
/// component boundary, so `/work2` is not inside `/work`.
pub fn is_path_allowed(path: &Path, roots: &[PathBuf]) -> bool {
    let target = canonical(path);
    roots.iter().any(|root| target.starts_with(canonical(root)))
}

/// Check a resolved path against the confinement roots.
pub fn check_sandbox(path: &Path, roots: &[PathBuf]) -> Result<(), PathValidationError> {
    if is_path_allowed(path, roots) {
        Ok(())
    } else {
        Err(PathValidationError::OutsideSandbox {
            path: path.to_path_buf(),
        })
    }
}

/// Whether `path` names a credential store or password file.
pub fn is_sensitive_path(path: &Path, home: Option<&Path>) -> bool {
    let normalized = normalize(path);
    let candidates = [normalized.clone(), canonical(&normalized)];

    for candidate in &candidates {
        if SENSITIVE_FILES.iter().any(|f| candidate == Path::new(f)) {
            return true;
        }
        if let Some(home) = home {
            let home = normalize(home);
            if SENSITIVE_HOME_DIRS
                .iter()
                .any(|dir| candidate.starts_with(home.join(dir)))
            {
                return true;
            }
        }
    }
    false
}

/// Check a resolved path against the sensitive-location deny-list.
pub fn check_sensitive(path: &Path) -> Result<(), PathValidationError> {
    let home = home_dir().map(PathBuf::from);
    if is_sensitive_path(path, home.as_deref()) {
        Err(PathValidationError::SensitivePath {
            path: path.to_path_buf(),
        })
    } else {
        Ok(())
    }
}

/// Expand ~ to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

pub fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok()
    }
}
