use std::env;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Reasons a caller-supplied path cannot be used inside the workspace.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkspacePathError {
    #[error("path is empty")]
    Empty,
    #[error("path '{0}' is absolute; it must be relative to the workspace")]
    Absolute(String),
    #[error("path '{0}' must not contain '..'")]
    ParentTraversal(String),
}

/// Joins a workspace-relative path onto `workspace`, rejecting absolute paths and any
/// parent-directory traversal.
///
/// # Example
/// ```rust
/// use std::path::Path;
/// use stepline_util::path_processing::resolve_workspace_relative;
///
/// let resolved = resolve_workspace_relative(Path::new("/work"), "out/results.json").unwrap();
/// assert_eq!(resolved, Path::new("/work/out/results.json"));
/// assert!(resolve_workspace_relative(Path::new("/work"), "../escape.json").is_err());
/// ```
pub fn resolve_workspace_relative(workspace: &Path, raw: &str) -> Result<PathBuf, WorkspacePathError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(WorkspacePathError::Empty);
    }
    let candidate = Path::new(trimmed);
    if candidate.is_absolute() || trimmed.starts_with('/') || trimmed.starts_with('\\') {
        return Err(WorkspacePathError::Absolute(trimmed.to_string()));
    }
    if trimmed.contains("..") || candidate.components().any(|component| matches!(component, Component::ParentDir)) {
        return Err(WorkspacePathError::ParentTraversal(trimmed.to_string()));
    }
    Ok(workspace.join(candidate))
}

/// Locates an executable the way a shell would.
///
/// Names containing a path separator are checked directly; bare names are searched for
/// in each directory of `PATH`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable_file(candidate).then(|| candidate.to_path_buf());
    }
    let search_path = env::var_os("PATH")?;
    env::split_paths(&search_path)
        .map(|directory| directory.join(name))
        .find(|path| is_executable_file(path))
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}
