//! Process-wide restore settings.

use super::source::PackageSource;
use crate::error::Error;
use crate::paths::{absolutize, default_packages_dir, SOLUTION_FILE_NAME};
use serde::{Deserialize, Serialize};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Overrides the global packages folder.
pub const PACKAGES_ENV: &str = "DEPGRAPH_PACKAGES";

/// Overrides the fallback folders (platform path-list syntax).
pub const FALLBACK_FOLDERS_ENV: &str = "DEPGRAPH_FALLBACK_FOLDERS";

/// Supplies settings that projects inherit when they do not declare their own.
pub trait SettingsProvider: Send + Sync {
    fn global_packages_folder(&self) -> Option<PathBuf>;

    /// Fallback folders in lookup order.
    fn fallback_folders(&self) -> Vec<PathBuf>;

    fn sources(&self) -> Vec<PackageSource>;

    /// Upper bound on concurrently restored projects.
    fn max_parallelism(&self) -> Option<usize> {
        None
    }
}

/// Settings that supply nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSettings;

impl SettingsProvider for NullSettings {
    fn global_packages_folder(&self) -> Option<PathBuf> {
        None
    }

    fn fallback_folders(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    fn sources(&self) -> Vec<PackageSource> {
        Vec::new()
    }
}

/// Settings loaded from `depgraph.json` with environment overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_packages_folder: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_folders: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<PackageSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallelism: Option<usize>,
}

impl Settings {
    /// Load settings from `<root>/depgraph.json` (if present) and apply
    /// environment overrides.
    pub fn load(root: &Path) -> Result<Self, Error> {
        Self::read(&root.join(SOLUTION_FILE_NAME))
    }

    /// Load settings from a solution file and apply environment overrides.
    ///
    /// A missing file yields the defaults. Relative paths in the file are
    /// resolved against the file's directory.
    pub fn read(path: &Path) -> Result<Self, Error> {
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        let mut settings = match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str::<Self>(&content)
                .map_err(|source| Error::SettingsParse {
                    path: path.to_path_buf(),
                    source,
                })?
                .resolved_against(root),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(Error::SettingsRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        settings.apply_env();
        Ok(settings)
    }

    /// Make relative paths absolute against `root`.
    #[must_use]
    pub fn resolved_against(mut self, root: &Path) -> Self {
        self.global_packages_folder = self
            .global_packages_folder
            .map(|p| absolutize(root, &p));
        self.fallback_folders = self
            .fallback_folders
            .iter()
            .map(|p| absolutize(root, p))
            .collect();
        for source in &mut self.sources {
            if source.is_local() {
                source.source = absolutize(root, Path::new(&source.source))
                    .to_string_lossy()
                    .into_owned();
            }
        }
        self
    }

    /// Apply `DEPGRAPH_PACKAGES` and `DEPGRAPH_FALLBACK_FOLDERS`.
    ///
    /// Relative values are taken against the process working directory.
    pub fn apply_env(&mut self) {
        let cwd = env::current_dir().unwrap_or_default();
        self.apply_overrides(
            &cwd,
            env::var_os(PACKAGES_ENV),
            env::var_os(FALLBACK_FOLDERS_ENV),
        );
    }

    fn apply_overrides(&mut self, cwd: &Path, packages: Option<OsString>, fallback: Option<OsString>) {
        if let Some(packages) = packages.filter(|p| !p.is_empty()) {
            self.global_packages_folder = Some(absolutize(cwd, Path::new(&packages)));
        }
        if let Some(fallback) = fallback {
            self.fallback_folders = env::split_paths(&fallback)
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| absolutize(cwd, &p))
                .collect();
        }
    }
}

impl SettingsProvider for Settings {
    fn global_packages_folder(&self) -> Option<PathBuf> {
        Some(
            self.global_packages_folder
                .clone()
                .unwrap_or_else(default_packages_dir),
        )
    }

    fn fallback_folders(&self) -> Vec<PathBuf> {
        self.fallback_folders.clone()
    }

    fn sources(&self) -> Vec<PackageSource> {
        self.sources.clone()
    }

    fn max_parallelism(&self) -> Option<usize> {
        self.max_parallelism
    }
}
