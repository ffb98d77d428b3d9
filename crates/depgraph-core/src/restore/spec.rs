//! Solution-wide dependency graph spec.
//!
//! [`build_spec`] snapshots every project adapter, validates the result and
//! normalizes it into a [`GraphSpec`]: one [`ProjectNode`] per project with
//! package ids lowercased, paths made absolute and missing settings
//! inherited from the [`SettingsProvider`].

use super::error::GraphBuildError;
use super::framework::TargetFramework;
use super::metadata::{read_metadata, LockFileMode, ProjectAdapter, ProjectReference};
use super::settings::{Settings, SettingsProvider};
use super::source::PackageSource;
use crate::paths::absolutize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default lock file name, placed next to the project file.
pub const LOCK_FILE_NAME: &str = "packages.lock.json";

/// Effective restore settings for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRestoreSettings {
    pub sources: Vec<PackageSource>,
    /// Probe order is significant.
    pub fallback_folders: Vec<PathBuf>,
    pub packages_path: Option<PathBuf>,
    pub lock_file: PathBuf,
    pub lock_file_mode: LockFileMode,
}

/// One project in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectNode {
    pub id: String,
    pub path: PathBuf,
    pub references: Vec<ProjectReference>,
    /// Canonical ids of referenced projects.
    pub project_references: Vec<String>,
    pub frameworks: Vec<TargetFramework>,
    pub runtime_identifiers: Vec<String>,
    pub restore: NodeRestoreSettings,
}

impl ProjectNode {
    /// Lowercased id used for lookups.
    #[must_use]
    pub fn key(&self) -> String {
        self.id.to_ascii_lowercase()
    }

    /// Package references that apply to `framework`.
    pub fn references_for<'a>(
        &'a self,
        framework: &'a TargetFramework,
    ) -> impl Iterator<Item = &'a ProjectReference> + 'a {
        self.references
            .iter()
            .filter(move |r| r.applies_to(framework))
    }
}

/// Every project of a solution plus the global settings and the ordered list
/// of projects to restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSpec {
    pub nodes: Vec<ProjectNode>,
    pub settings: Settings,
    /// Ids of the nodes to restore, in order.
    pub restore: Vec<String>,
}

impl GraphSpec {
    /// A graph with no projects.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find a node by id (case-insensitive).
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&ProjectNode> {
        self.nodes.iter().find(|n| n.id.eq_ignore_ascii_case(id))
    }

    /// Nodes in restore order. Unknown ids are skipped.
    pub fn restore_nodes(&self) -> impl Iterator<Item = &ProjectNode> {
        self.restore.iter().filter_map(|id| self.node(id))
    }

    /// Narrow the restore list to `ids`, keeping every node in the graph.
    pub fn restore_only<I, S>(mut self, ids: I) -> Result<Self, GraphBuildError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut restore = Vec::new();
        for id in ids {
            let node = self
                .node(id.as_ref())
                .ok_or_else(|| GraphBuildError::UnknownRestoreTarget(id.as_ref().to_string()))?;
            if !restore.contains(&node.id) {
                restore.push(node.id.clone());
            }
        }
        self.restore = restore;
        Ok(self)
    }

    /// Every project `id` references directly or transitively, sorted by id.
    #[must_use]
    pub fn closure(&self, id: &str) -> Vec<&ProjectNode> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        let mut out = Vec::new();

        if let Some(root) = self.node(id) {
            seen.insert(root.key());
            queue.extend(root.project_references.iter());
        }
        while let Some(next) = queue.pop_front() {
            let Some(node) = self.node(next) else {
                continue;
            };
            if seen.insert(node.key()) {
                queue.extend(node.project_references.iter());
                out.push(node);
            }
        }

        out.sort_by(|a, b| a.key().cmp(&b.key()));
        out
    }

    /// Check the graph invariants `build_spec` establishes.
    ///
    /// Graphs deserialized or assembled by hand go through the same checks.
    pub fn validate(&self) -> Result<(), GraphBuildError> {
        let mut ids: HashMap<String, &str> = HashMap::new();
        let mut locks: HashMap<&Path, &str> = HashMap::new();

        for node in &self.nodes {
            check_node(
                &node.id,
                &node.path,
                &node.frameworks,
                &node.references,
            )?;
            if ids.insert(node.key(), node.id.as_str()).is_some() {
                return Err(GraphBuildError::DuplicateProject(node.id.clone()));
            }
            if let Some(first) = locks.insert(node.restore.lock_file.as_path(), node.id.as_str()) {
                return Err(GraphBuildError::DuplicateLockFile {
                    first: first.to_string(),
                    second: node.id.clone(),
                    path: node.restore.lock_file.clone(),
                });
            }
        }

        for node in &self.nodes {
            for target in &node.project_references {
                if !ids.contains_key(&target.to_ascii_lowercase()) {
                    return Err(GraphBuildError::DanglingReference {
                        project: node.id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        for id in &self.restore {
            if !ids.contains_key(&id.to_ascii_lowercase()) {
                return Err(GraphBuildError::UnknownRestoreTarget(id.clone()));
            }
        }

        detect_cycle(&self.nodes)
    }
}

fn check_node(
    id: &str,
    path: &Path,
    frameworks: &[TargetFramework],
    references: &[ProjectReference],
) -> Result<(), GraphBuildError> {
    if id.trim().is_empty() {
        return Err(GraphBuildError::EmptyProjectId {
            path: path.to_path_buf(),
        });
    }
    if frameworks.is_empty() {
        return Err(GraphBuildError::MissingFrameworks {
            project: id.to_string(),
        });
    }
    if references.iter().any(|r| r.id.trim().is_empty()) {
        return Err(GraphBuildError::EmptyPackageId {
            project: id.to_string(),
        });
    }
    Ok(())
}

/// Build the graph spec for a set of projects.
///
/// Every project is restored, in input order. The adapters are only read.
pub fn build_spec<A: ProjectAdapter>(
    projects: &[A],
    settings: &dyn SettingsProvider,
) -> Result<GraphSpec, GraphBuildError> {
    let cwd = std::env::current_dir().unwrap_or_default();
    let global = Settings {
        global_packages_folder: settings.global_packages_folder(),
        fallback_folders: settings.fallback_folders(),
        sources: settings.sources(),
        max_parallelism: settings.max_parallelism(),
    };

    let mut canonical: HashMap<String, String> = HashMap::new();
    let mut snapshots = Vec::with_capacity(projects.len());
    for project in projects {
        let metadata = read_metadata(project);
        check_node(
            &metadata.id,
            &metadata.path,
            &metadata.frameworks,
            &metadata.references,
        )?;
        let id = metadata.id.trim().to_string();
        if canonical
            .insert(id.to_ascii_lowercase(), id.clone())
            .is_some()
        {
            return Err(GraphBuildError::DuplicateProject(id));
        }
        snapshots.push((id, metadata));
    }

    let mut locks: HashMap<PathBuf, String> = HashMap::new();
    let mut nodes = Vec::with_capacity(snapshots.len());
    for (id, metadata) in snapshots {
        let path = absolutize(&cwd, &metadata.path);
        let dir = path.parent().map_or_else(|| path.clone(), Path::to_path_buf);

        let lock_file = metadata
            .lock_file
            .as_deref()
            .map_or_else(|| dir.join(LOCK_FILE_NAME), |p| absolutize(&dir, p));
        if let Some(first) = locks.insert(lock_file.clone(), id.clone()) {
            return Err(GraphBuildError::DuplicateLockFile {
                first,
                second: id,
                path: lock_file,
            });
        }

        let mut project_references = Vec::new();
        for target in &metadata.project_references {
            let resolved = canonical
                .get(&target.trim().to_ascii_lowercase())
                .ok_or_else(|| GraphBuildError::DanglingReference {
                    project: id.clone(),
                    target: target.clone(),
                })?;
            if !project_references.contains(resolved) {
                project_references.push(resolved.clone());
            }
        }

        let declared = metadata.restore;
        let sources = if declared.sources.is_empty() {
            global.sources.clone()
        } else {
            declared.sources
        };
        let fallback_folders = if declared.fallback_folders.is_empty() {
            global.fallback_folders.clone()
        } else {
            declared.fallback_folders
        };
        let packages_path = declared
            .packages_path
            .or_else(|| global.global_packages_folder.clone());

        let restore = NodeRestoreSettings {
            sources: sources
                .into_iter()
                .map(|s| absolutize_source(&dir, s))
                .collect(),
            fallback_folders: fallback_folders
                .iter()
                .map(|p| absolutize(&dir, p))
                .collect(),
            packages_path: packages_path.map(|p| absolutize(&dir, &p)),
            lock_file,
            lock_file_mode: declared.lock_file_mode,
        };

        let references = metadata
            .references
            .into_iter()
            .map(|r| ProjectReference {
                id: r.id.trim().to_ascii_lowercase(),
                ..r
            })
            .collect();

        debug!(project = %id, path = %path.display(), "Added project to graph");
        nodes.push(ProjectNode {
            id,
            path,
            references,
            project_references,
            frameworks: dedup(metadata.frameworks),
            runtime_identifiers: dedup(metadata.runtime_identifiers),
            restore,
        });
    }

    detect_cycle(&nodes)?;

    let restore = nodes.iter().map(|n| n.id.clone()).collect();
    Ok(GraphSpec {
        nodes,
        settings: global,
        restore,
    })
}

fn absolutize_source(dir: &Path, mut source: PackageSource) -> PackageSource {
    if source.is_local() {
        source.source = absolutize(dir, Path::new(&source.source))
            .to_string_lossy()
            .into_owned();
    }
    source
}

fn dedup<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search over project edges, reporting the first cycle found.
fn detect_cycle(nodes: &[ProjectNode]) -> Result<(), GraphBuildError> {
    let by_key: BTreeMap<String, &ProjectNode> = nodes.iter().map(|n| (n.key(), n)).collect();
    let mut marks: HashMap<String, Mark> = HashMap::new();

    for start in by_key.keys() {
        if marks.contains_key(start) {
            continue;
        }

        // (node key, next edge index)
        let mut stack: Vec<(String, usize)> = vec![(start.clone(), 0)];
        marks.insert(start.clone(), Mark::Visiting);

        while let Some((key, edge)) = stack.last().cloned() {
            let Some(node) = by_key.get(&key) else {
                stack.pop();
                continue;
            };
            let Some(target) = node.project_references.get(edge) else {
                marks.insert(key, Mark::Done);
                stack.pop();
                continue;
            };
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            let target = target.to_ascii_lowercase();
            match marks.get(&target) {
                Some(Mark::Done) => {}
                Some(Mark::Visiting) => {
                    let from = stack.iter().position(|(k, _)| *k == target).unwrap_or(0);
                    let mut path: Vec<&str> = stack[from..]
                        .iter()
                        .filter_map(|(k, _)| by_key.get(k).map(|n| n.id.as_str()))
                        .collect();
                    if let Some(n) = by_key.get(&target) {
                        path.push(n.id.as_str());
                    }
                    return Err(GraphBuildError::Cycle(path.join(" -> ")));
                }
                None => {
                    marks.insert(target.clone(), Mark::Visiting);
                    stack.push((target, 0));
                }
            }
        }
    }

    Ok(())
}
