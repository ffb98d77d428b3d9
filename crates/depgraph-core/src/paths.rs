use crate::version::SCHEMA_VERSION;
use std::path::{Component, Path, PathBuf};

/// Solution manifest filename.
pub const SOLUTION_FILE_NAME: &str = "depgraph.json";

/// Find the solution root by walking up from `cwd` looking for `depgraph.json`.
///
/// Returns the first directory containing the manifest, or `None` if none is found.
#[must_use]
pub fn solution_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join(SOLUTION_FILE_NAME).is_file() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Get the default global packages folder.
///
/// Uses platform-appropriate locations with versioning:
/// - Linux: `$XDG_DATA_HOME/depgraph/v{N}/packages` or `~/.local/share/depgraph/v{N}/packages`
/// - macOS: `~/Library/Application Support/depgraph/v{N}/packages`
/// - Windows: `%LOCALAPPDATA%\depgraph\v{N}\packages`
#[must_use]
pub fn default_packages_dir() -> PathBuf {
    let base = dirs_next::data_local_dir().map_or_else(
        || {
            dirs_next::home_dir().map_or_else(
                || PathBuf::from(".depgraph"),
                |p| p.join(".depgraph"),
            )
        },
        |p| p.join("depgraph"),
    );

    base.join(format!("v{SCHEMA_VERSION}")).join("packages")
}

/// Resolve `path` against `base` when relative, then drop `.` and `..` lexically.
///
/// The filesystem is not consulted, so paths that do not exist yet (lock
/// files, package folders) normalize the same way as existing ones.
#[must_use]
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_lexically(path)
    } else {
        normalize_lexically(&base.join(path))
    }
}

/// Remove `.` components and fold `..` into the preceding component.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
