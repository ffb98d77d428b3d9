//! Project metadata read through a narrow adapter interface.
//!
//! Hosts describe their projects by implementing [`ProjectAdapter`].
//! [`ProjectMetadata`] is the plain snapshot the graph builder works from,
//! and also implements the adapter so projects can be loaded from JSON.

use super::framework::TargetFramework;
use super::source::PackageSource;
use super::version::VersionRange;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How an existing lock file is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockFileMode {
    /// Rewrite the lock file whenever the resolution changes.
    #[default]
    Update,
    /// The lock file must exist and match the resolution.
    Locked,
}

/// A package reference declared by a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectReference {
    pub id: String,
    #[serde(default)]
    pub range: VersionRange,
    /// Frameworks this reference applies to. Empty means all of them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frameworks: Vec<TargetFramework>,
}

impl ProjectReference {
    #[must_use]
    pub fn new(id: impl Into<String>, range: VersionRange) -> Self {
        Self {
            id: id.into(),
            range,
            frameworks: Vec::new(),
        }
    }

    /// Restrict the reference to one more framework.
    #[must_use]
    pub fn for_framework(mut self, framework: TargetFramework) -> Self {
        self.frameworks.push(framework);
        self
    }

    #[must_use]
    pub fn applies_to(&self, framework: &TargetFramework) -> bool {
        self.frameworks.is_empty() || self.frameworks.contains(framework)
    }
}

/// Restore settings declared on a project. Missing values are inherited
/// from the settings provider when the graph is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRestoreSettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<PackageSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_folders: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages_path: Option<PathBuf>,
    #[serde(default)]
    pub lock_file_mode: LockFileMode,
}

/// Read-only view of one project.
///
/// Implementations must return a consistent snapshot for the duration of a
/// graph build and be safe to call repeatedly.
pub trait ProjectAdapter: Send + Sync {
    /// Stable project identifier.
    fn project_id(&self) -> &str;

    /// Path to the project file.
    fn project_path(&self) -> &Path;

    fn references(&self) -> Vec<ProjectReference>;

    /// Identifiers of projects this project references.
    fn project_references(&self) -> Vec<String>;

    fn target_frameworks(&self) -> Vec<TargetFramework>;

    fn runtime_identifiers(&self) -> Vec<String> {
        Vec::new()
    }

    fn restore_settings(&self) -> ProjectRestoreSettings;

    /// Explicit lock file location, if the project overrides the default.
    fn lock_file_path(&self) -> Option<PathBuf>;
}

impl<T: ProjectAdapter + ?Sized> ProjectAdapter for &T {
    fn project_id(&self) -> &str {
        (**self).project_id()
    }

    fn project_path(&self) -> &Path {
        (**self).project_path()
    }

    fn references(&self) -> Vec<ProjectReference> {
        (**self).references()
    }

    fn project_references(&self) -> Vec<String> {
        (**self).project_references()
    }

    fn target_frameworks(&self) -> Vec<TargetFramework> {
        (**self).target_frameworks()
    }

    fn runtime_identifiers(&self) -> Vec<String> {
        (**self).runtime_identifiers()
    }

    fn restore_settings(&self) -> ProjectRestoreSettings {
        (**self).restore_settings()
    }

    fn lock_file_path(&self) -> Option<PathBuf> {
        (**self).lock_file_path()
    }
}

/// Plain snapshot of a project's restore inputs.
///
/// Relative paths are interpreted against the project file's directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub id: String,
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default)]
    pub frameworks: Vec<TargetFramework>,
    #[serde(default)]
    pub references: Vec<ProjectReference>,
    #[serde(default)]
    pub project_references: Vec<String>,
    #[serde(default)]
    pub runtime_identifiers: Vec<String>,
    #[serde(flatten)]
    pub restore: ProjectRestoreSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_file: Option<PathBuf>,
}

impl ProjectMetadata {
    /// Create an empty project description.
    #[must_use]
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            frameworks: Vec::new(),
            references: Vec::new(),
            project_references: Vec::new(),
            runtime_identifiers: Vec::new(),
            restore: ProjectRestoreSettings::default(),
            lock_file: None,
        }
    }

    #[must_use]
    pub fn with_framework(mut self, framework: TargetFramework) -> Self {
        self.frameworks.push(framework);
        self
    }

    #[must_use]
    pub fn with_reference(mut self, reference: ProjectReference) -> Self {
        self.references.push(reference);
        self
    }

    #[must_use]
    pub fn with_project_reference(mut self, id: impl Into<String>) -> Self {
        self.project_references.push(id.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: PackageSource) -> Self {
        self.restore.sources.push(source);
        self
    }

    #[must_use]
    pub fn with_packages_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.restore.packages_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_lock_file_mode(mut self, mode: LockFileMode) -> Self {
        self.restore.lock_file_mode = mode;
        self
    }

    /// Load a project description from a JSON file.
    ///
    /// The returned metadata's `path` is the file's absolute location.
    pub fn read_from(path: &Path) -> Result<Self, Error> {
        let content = fs::read_to_string(path).map_err(|source| Error::ProjectRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut metadata: Self =
            serde_json::from_str(&content).map_err(|source| Error::ProjectParse {
                path: path.to_path_buf(),
                source,
            })?;
        metadata.path = std::path::absolute(path)?;
        Ok(metadata)
    }
}

impl ProjectAdapter for ProjectMetadata {
    fn project_id(&self) -> &str {
        &self.id
    }

    fn project_path(&self) -> &Path {
        &self.path
    }

    fn references(&self) -> Vec<ProjectReference> {
        self.references.clone()
    }

    fn project_references(&self) -> Vec<String> {
        self.project_references.clone()
    }

    fn target_frameworks(&self) -> Vec<TargetFramework> {
        self.frameworks.clone()
    }

    fn runtime_identifiers(&self) -> Vec<String> {
        self.runtime_identifiers.clone()
    }

    fn restore_settings(&self) -> ProjectRestoreSettings {
        self.restore.clone()
    }

    fn lock_file_path(&self) -> Option<PathBuf> {
        self.lock_file.clone()
    }
}

/// Snapshot an adapter into plain metadata.
#[must_use]
pub fn read_metadata(adapter: &dyn ProjectAdapter) -> ProjectMetadata {
    ProjectMetadata {
        id: adapter.project_id().to_string(),
        path: adapter.project_path().to_path_buf(),
        frameworks: adapter.target_frameworks(),
        references: adapter.references(),
        project_references: adapter.project_references(),
        runtime_identifiers: adapter.runtime_identifiers(),
        restore: adapter.restore_settings(),
        lock_file: adapter.lock_file_path(),
    }
}
