//! Solution files: the list of projects restored together.
//!
//! A solution is a `depgraph.json` holding relative project file paths
//! alongside the process-wide [`Settings`]:
//!
//! ```json
//! {
//!   "projects": ["app/app.json", "lib/lib.json"],
//!   "sources": ["feed"],
//!   "globalPackagesFolder": "packages"
//! }
//! ```

use super::error::GraphBuildError;
use super::metadata::ProjectMetadata;
use super::settings::Settings;
use super::spec::{build_spec, GraphSpec};
use crate::error::Error;
use crate::paths::{absolutize, solution_root, SOLUTION_FILE_NAME};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SolutionFile {
    #[serde(default)]
    projects: Vec<PathBuf>,
}

/// A loaded solution.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Directory containing the solution file.
    pub root: PathBuf,
    /// The solution file itself.
    pub path: PathBuf,
    pub projects: Vec<ProjectMetadata>,
    pub settings: Settings,
}

impl Solution {
    /// Load a solution from a file, or from `depgraph.json` inside a directory.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let path = std::path::absolute(path)?;
        let path = if path.is_dir() {
            path.join(SOLUTION_FILE_NAME)
        } else {
            path
        };
        let root = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let content = fs::read_to_string(&path).map_err(|source| Error::SolutionRead {
            path: path.clone(),
            source,
        })?;
        let file: SolutionFile =
            serde_json::from_str(&content).map_err(|source| Error::SolutionParse {
                path: path.clone(),
                source,
            })?;

        let projects = file
            .projects
            .iter()
            .map(|p| ProjectMetadata::read_from(&absolutize(&root, p)))
            .collect::<Result<Vec<_>, _>>()?;
        let settings = Settings::read(&path)?;

        debug!(
            solution = %path.display(),
            projects = projects.len(),
            "Loaded solution"
        );
        Ok(Self {
            root,
            path,
            projects,
            settings,
        })
    }

    /// Find the nearest `depgraph.json` at or above `cwd` and load it.
    pub fn discover(cwd: &Path) -> Result<Self, Error> {
        let root = solution_root(cwd).ok_or_else(|| Error::SolutionNotFound {
            start: cwd.to_path_buf(),
        })?;
        Self::load(&root.join(SOLUTION_FILE_NAME))
    }

    /// Build the graph spec for every project in the solution.
    pub fn build_spec(&self) -> Result<GraphSpec, GraphBuildError> {
        build_spec(&self.projects, &self.settings)
    }
}
