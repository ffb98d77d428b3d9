//! Version resolution for one project and framework.
//!
//! Resolution is a fixed-point walk. Each round gathers the constraints
//! contributed by the project's references (and those of referenced
//! projects, at their nearest framework) plus the dependencies of the
//! versions currently selected, then selects one version per package id.
//! The walk ends when a round selects exactly what the previous one did.
//!
//! Selection policy: intersect every range for an id, ignore prereleases
//! unless a range bound is itself a prerelease, then take the lowest
//! satisfying version when the combined range has a lower bound and the
//! highest otherwise.

use super::context::CacheContext;
use super::error::ResolutionError;
use super::framework::TargetFramework;
use super::provider_cache::RestoreProviders;
use super::source::{PackageDependency, PackageInfo};
use super::spec::{GraphSpec, ProjectNode};
use super::version::VersionRange;
use futures::stream::{self, StreamExt};
use semver::Version;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Maximum concurrent metadata fetches per resolution round.
const MAX_CONCURRENT_FETCHES: usize = 16;

/// Rounds after which resolution is declared divergent.
const MAX_ROUNDS: usize = 64;

/// A range contributed to a package id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Lowercase package id.
    pub id: String,
    pub range: VersionRange,
    /// Declared by the project being restored.
    pub direct: bool,
}

/// One resolved package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub id: String,
    pub version: Version,
    pub direct: bool,
    /// Combined range the project itself requested (direct references only).
    pub requested: Option<VersionRange>,
    pub dependencies: Vec<PackageDependency>,
}

/// Resolution of one framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub framework: TargetFramework,
    /// Lowercase package id -> resolved package.
    pub packages: BTreeMap<String, ResolvedPackage>,
}

/// Collect the package requirements for `node` under `framework`.
///
/// References of referenced projects are included at each project's nearest
/// compatible framework and marked non-direct.
pub fn collect_requirements(
    graph: &GraphSpec,
    node: &ProjectNode,
    framework: &TargetFramework,
) -> Result<Vec<Requirement>, ResolutionError> {
    let mut out: Vec<Requirement> = node
        .references_for(framework)
        .map(|r| Requirement {
            id: r.id.to_ascii_lowercase(),
            range: r.range.clone(),
            direct: true,
        })
        .collect();

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut queue: VecDeque<(&ProjectNode, TargetFramework)> = VecDeque::new();
    queue.push_back((node, framework.clone()));

    while let Some((current, current_framework)) = queue.pop_front() {
        for target in &current.project_references {
            let Some(referenced) = graph.node(target) else {
                continue;
            };
            let nearest = TargetFramework::nearest(&current_framework, &referenced.frameworks)
                .ok_or_else(|| ResolutionError::ProjectIncompatible {
                    project: referenced.id.clone(),
                    framework: current_framework.to_string(),
                })?
                .clone();

            if !seen.insert((referenced.key(), nearest.moniker().to_string())) {
                continue;
            }
            out.extend(referenced.references_for(&nearest).map(|r| Requirement {
                id: r.id.to_ascii_lowercase(),
                range: r.range.clone(),
                direct: false,
            }));
            queue.push_back((referenced, nearest));
        }
    }

    Ok(out)
}

/// Pick one version of `id` satisfying every range in `ranges`.
pub fn select_version<'a>(
    id: &str,
    ranges: &[&VersionRange],
    available: &'a [PackageInfo],
) -> Result<&'a PackageInfo, ResolutionError> {
    if available.is_empty() {
        return Err(ResolutionError::PackageNotFound { id: id.to_string() });
    }

    let combined = ranges
        .iter()
        .try_fold(VersionRange::any(), |acc, r| acc.intersect(r))
        .ok_or_else(|| ResolutionError::Conflict {
            id: id.to_string(),
            ranges: ranges
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" and "),
        })?;
    let allow_prerelease = ranges.iter().any(|r| r.allows_prerelease());

    let mut candidates = available.iter().filter(|p| {
        combined.satisfies(&p.version) && (allow_prerelease || p.version.pre.is_empty())
    });
    let chosen = if combined.has_lower_bound() {
        candidates.min_by(|a, b| a.version.cmp(&b.version))
    } else {
        candidates.max_by(|a, b| a.version.cmp(&b.version))
    };

    chosen.ok_or_else(|| ResolutionError::NoMatchingVersion {
        id: id.to_string(),
        range: combined.to_string(),
        available: available.len(),
    })
}

/// Versions of `id` across all providers, local providers first. When two
/// providers offer the same version the first one wins.
///
/// A source that failed to construct fails the lookup, since its versions
/// would be missing from the answer.
async fn fetch_versions(
    id: &str,
    providers: &RestoreProviders,
    context: &CacheContext,
) -> Result<Vec<PackageInfo>, ResolutionError> {
    if let Some(failure) = providers.failures.first() {
        return Err(failure.clone().into());
    }

    let mut merged: BTreeMap<Version, PackageInfo> = BTreeMap::new();
    for provider in providers.all() {
        let found = context
            .find_package(provider, id)
            .await
            .map_err(|e| ResolutionError::SourceFailed {
                source_name: provider.name().to_string(),
                message: e.to_string(),
            })?;
        for info in found.iter() {
            merged
                .entry(info.version.clone())
                .or_insert_with(|| info.clone());
        }
    }
    Ok(merged.into_values().collect())
}

/// Resolve `node` for one framework.
pub async fn resolve_target(
    graph: &GraphSpec,
    node: &ProjectNode,
    framework: &TargetFramework,
    providers: &RestoreProviders,
    context: &CacheContext,
    cancel: &CancellationToken,
) -> Result<ResolvedTarget, ResolutionError> {
    let roots = collect_requirements(graph, node, framework)?;
    let mut available: HashMap<String, Arc<Vec<PackageInfo>>> = HashMap::new();
    let mut selected: BTreeMap<String, PackageInfo> = BTreeMap::new();
    let mut unresolved: Option<ResolutionError> = None;

    for round in 1..=MAX_ROUNDS {
        if cancel.is_cancelled() {
            return Err(ResolutionError::Cancelled);
        }

        // Constraints from the roots plus every selected package reachable from them.
        let mut constraints: BTreeMap<String, Vec<&VersionRange>> = BTreeMap::new();
        for req in &roots {
            constraints.entry(req.id.clone()).or_default().push(&req.range);
        }
        let mut queue: VecDeque<String> = constraints.keys().cloned().collect();
        let mut expanded: HashSet<String> = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if !expanded.insert(id.clone()) {
                continue;
            }
            let Some(package) = selected.get(&id) else {
                continue;
            };
            for dep in &package.dependencies {
                let dep_id = dep.id.to_ascii_lowercase();
                constraints.entry(dep_id.clone()).or_default().push(&dep.range);
                queue.push_back(dep_id);
            }
        }

        let missing: Vec<String> = constraints
            .keys()
            .filter(|id| !available.contains_key(*id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            trace!(project = %node.id, round, fetch = missing.len(), "Fetching package metadata");
            let fetched: Vec<Result<(String, Vec<PackageInfo>), ResolutionError>> = tokio::select! {
                () = cancel.cancelled() => return Err(ResolutionError::Cancelled),
                results = stream::iter(missing)
                    .map(|id| async move {
                        let versions = fetch_versions(&id, providers, context).await?;
                        Ok::<_, ResolutionError>((id, versions))
                    })
                    .buffer_unordered(MAX_CONCURRENT_FETCHES)
                    .collect::<Vec<_>>() => results,
            };
            for result in fetched {
                let (id, versions) = result?;
                available.insert(id, Arc::new(versions));
            }
        }

        // Constraints that fail here may come from a selection that the
        // next round replaces, so failures only count once the walk settles.
        let mut next: BTreeMap<String, PackageInfo> = BTreeMap::new();
        let mut failures: Vec<ResolutionError> = Vec::new();
        for (id, ranges) in &constraints {
            let versions = available.get(id).map_or(&[][..], |v| v.as_slice());
            match select_version(id, ranges, versions) {
                Ok(chosen) => {
                    next.insert(id.clone(), chosen.clone());
                }
                Err(e) => {
                    trace!(project = %node.id, round, id = %id, "{e}");
                    if let Some(current) = selected.get(id) {
                        next.insert(id.clone(), current.clone());
                    }
                    failures.push(e);
                }
            }
        }

        let stable = next.len() == selected.len()
            && next
                .iter()
                .all(|(id, p)| selected.get(id).is_some_and(|s| s.version == p.version));
        unresolved = failures.into_iter().next();
        if stable {
            if let Some(e) = unresolved {
                return Err(e);
            }
            debug!(project = %node.id, framework = %framework, rounds = round, packages = next.len(), "Resolved");
            return Ok(finish(framework, &roots, next));
        }
        selected = next;
    }

    Err(unresolved.unwrap_or(ResolutionError::Diverged { rounds: MAX_ROUNDS }))
}

fn finish(
    framework: &TargetFramework,
    roots: &[Requirement],
    selected: BTreeMap<String, PackageInfo>,
) -> ResolvedTarget {
    let packages = selected
        .into_iter()
        .map(|(id, info)| {
            let direct: Vec<&VersionRange> = roots
                .iter()
                .filter(|r| r.direct && r.id == id)
                .map(|r| &r.range)
                .collect();
            let requested = if direct.is_empty() {
                None
            } else {
                direct
                    .iter()
                    .try_fold(VersionRange::any(), |acc, r| acc.intersect(r))
            };
            let package = ResolvedPackage {
                id: id.clone(),
                version: info.version,
                direct: !direct.is_empty(),
                requested,
                dependencies: info.dependencies,
            };
            (id, package)
        })
        .collect();

    ResolvedTarget {
        framework: framework.clone(),
        packages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restore::error::codes;
    use crate::restore::metadata::{ProjectMetadata, ProjectReference};
    use crate::restore::settings::NullSettings;
    use crate::restore::source::{InMemoryProvider, PackageProvider};
    use crate::restore::spec::build_spec;
    use crate::restore::version::parse_version;

    fn tf(s: &str) -> TargetFramework {
        TargetFramework::parse(s).unwrap()
    }

    fn v(s: &str) -> Version {
        parse_version(s).unwrap()
    }

    fn range(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    fn pkg(id: &str, version: &str) -> PackageInfo {
        PackageInfo::new(id, v(version))
    }

    fn providers(provider: InMemoryProvider) -> RestoreProviders {
        let remote: Vec<Arc<dyn PackageProvider>> = vec![Arc::new(provider)];
        RestoreProviders {
            local: Vec::new(),
            remote,
            failures: Vec::new(),
        }
    }

    fn feed() -> InMemoryProvider {
        InMemoryProvider::new("feed")
            .with_package(pkg("packageA", "1.0.0"))
            .with_package(pkg("packageA", "2.0.0"))
            .with_package(pkg("packageA", "3.0.0-beta.1"))
            .with_package(pkg("packageB", "1.0.0"))
            .with_package(pkg("packageB", "1.5.0"))
            .with_package(
                pkg("packageC", "1.0.0").with_dependency("packageB", range("[1.5, )")),
            )
    }

    async fn resolve(
        projects: &[ProjectMetadata],
        id: &str,
        provider: InMemoryProvider,
    ) -> Result<ResolvedTarget, ResolutionError> {
        let graph = build_spec(projects, &NullSettings).unwrap();
        let node = graph.node(id).unwrap();
        let framework = node.frameworks[0].clone();
        let context = CacheContext::new(Arc::new(NullSettings));
        resolve_target(
            &graph,
            node,
            &framework,
            &providers(provider),
            &context,
            &CancellationToken::new(),
        )
        .await
    }

    fn app(references: &[(&str, &str)]) -> ProjectMetadata {
        let mut project = ProjectMetadata::new("app", "/repo/app/app.json").with_framework(tf("net46"));
        for (id, r) in references {
            project = project.with_reference(ProjectReference::new(*id, range(r)));
        }
        project
    }

    #[test]
    fn test_select_highest_without_lower_bound() {
        let available = vec![pkg("a", "1.0.0"), pkg("a", "2.0.0"), pkg("a", "3.0.0-beta.1")];
        let any = VersionRange::any();
        assert_eq!(select_version("a", &[&any], &available).unwrap().version, v("2.0.0"));
    }

    #[test]
    fn test_select_lowest_with_lower_bound() {
        let available = vec![pkg("a", "2.0.0"), pkg("a", "1.0.0"), pkg("a", "1.5.0")];
        let r = range("1.2");
        assert_eq!(select_version("a", &[&r], &available).unwrap().version, v("1.5.0"));
    }

    #[test]
    fn test_select_prerelease_only_when_requested() {
        let available = vec![pkg("a", "1.0.0"), pkg("a", "3.0.0-beta.1")];
        let r = range("3.0.0-beta.1");
        assert_eq!(
            select_version("a", &[&r], &available).unwrap().version,
            v("3.0.0-beta.1")
        );
    }

    #[test]
    fn test_select_errors() {
        let r = range("[5.0, )");
        let err = select_version("a", &[&r], &[]).unwrap_err();
        assert_eq!(err.code(), codes::RESTORE_PACKAGE_NOT_FOUND);

        let available = vec![pkg("a", "1.0.0")];
        let err = select_version("a", &[&r], &available).unwrap_err();
        assert_eq!(err.code(), codes::RESTORE_NO_MATCHING_VERSION);

        let low = range("[1.0, 2.0)");
        let high = range("[3.0, )");
        let err = select_version("a", &[&low, &high], &available).unwrap_err();
        assert_eq!(err.code(), codes::RESTORE_VERSION_CONFLICT);
    }

    #[tokio::test]
    async fn test_unconstrained_reference_picks_highest_stable() {
        let target = resolve(&[app(&[("packageA", "*")])], "app", feed())
            .await
            .unwrap();
        let a = &target.packages["packagea"];
        assert_eq!(a.version, v("2.0.0"));
        assert!(a.direct);
    }

    #[tokio::test]
    async fn test_transitive_dependencies_are_resolved() {
        let target = resolve(&[app(&[("packageC", "1.0")])], "app", feed())
            .await
            .unwrap();

        assert_eq!(target.packages["packagec"].version, v("1.0.0"));
        let b = &target.packages["packageb"];
        assert_eq!(b.version, v("1.5.0"));
        assert!(!b.direct);
        assert!(b.requested.is_none());
    }

    #[tokio::test]
    async fn test_direct_and_transitive_ranges_intersect() {
        let target = resolve(
            &[app(&[("packageC", "1.0"), ("packageB", "[1.0, 2.0)")])],
            "app",
            feed(),
        )
        .await
        .unwrap();
        assert_eq!(target.packages["packageb"].version, v("1.5.0"));
    }

    fn diamond_feed() -> InMemoryProvider {
        InMemoryProvider::new("feed")
            .with_package(pkg("x", "1.0.0"))
            .with_package(pkg("x", "2.0.0").with_dependency("y", range("[1.0]")))
            .with_package(pkg("y", "1.0.0").with_dependency("z", range("[1.0]")))
            .with_package(pkg("y", "2.0.0").with_dependency("z", range("[2.0]")))
            .with_package(pkg("z", "1.0.0"))
            .with_package(pkg("z", "2.0.0"))
    }

    #[tokio::test]
    async fn test_conflict_from_replaced_selection_settles() {
        // y@2 asks for z 2.0 in round two, but x@2 moves y to 1.0 in the same round
        let target = resolve(
            &[app(&[("x", "*"), ("y", "*"), ("z", "[1.0]")])],
            "app",
            diamond_feed(),
        )
        .await
        .unwrap();

        assert_eq!(target.packages["x"].version, v("2.0.0"));
        assert_eq!(target.packages["y"].version, v("1.0.0"));
        assert_eq!(target.packages["z"].version, v("1.0.0"));
    }

    #[tokio::test]
    async fn test_conflict_at_fixed_point_is_reported() {
        let err = resolve(&[app(&[("y", "[2.0]"), ("z", "[1.0]")])], "app", diamond_feed())
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::RESTORE_VERSION_CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_package() {
        let err = resolve(&[app(&[("ghost", "*")])], "app", feed())
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::RESTORE_PACKAGE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_project_references_contribute_requirements() {
        let root = app(&[]).with_project_reference("lib");
        let lib = ProjectMetadata::new("lib", "/repo/lib/lib.json")
            .with_framework(tf("net45"))
            .with_reference(ProjectReference::new("packageB", range("1.0")));

        let target = resolve(&[root, lib], "app", feed()).await.unwrap();
        let b = &target.packages["packageb"];
        assert_eq!(b.version, v("1.0.0"));
        assert!(!b.direct);
    }

    #[tokio::test]
    async fn test_incompatible_project_reference() {
        let root = app(&[]).with_project_reference("lib");
        let lib = ProjectMetadata::new("lib", "/repo/lib/lib.json").with_framework(tf("net48"));

        let err = resolve(&[root, lib], "app", feed()).await.unwrap_err();
        assert_eq!(err.code(), codes::RESTORE_PROJECT_INCOMPATIBLE);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let graph = build_spec(&[app(&[("packageA", "*")])], &NullSettings).unwrap();
        let node = graph.node("app").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = resolve_target(
            &graph,
            node,
            &tf("net46"),
            &providers(feed()),
            &CacheContext::new(Arc::new(NullSettings)),
            &cancel,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), codes::RESTORE_CANCELLED);
    }
}
