//! Restore orchestration.
//!
//! [`restore_async`] plans which projects need work, resolves each of them
//! per target framework with providers from the [`ProviderCache`], writes
//! lock files atomically and returns one [`RestoreSummary`] per project in
//! restore order.

use super::context::CacheContext;
use super::error::{codes, RestoreError, ResolutionError};
use super::fingerprint::{compute_fingerprint, read_prior_fingerprint, should_skip, RestoreFingerprint};
use super::lockfile::{codes as lock_codes, LockedPackage, Lockfile};
use super::metadata::LockFileMode;
use super::progress::{notify, ProgressFn, RestoreProgress};
use super::provider_cache::{ProviderCache, SourcesKey};
use super::resolve::{resolve_target, ResolvedTarget};
use super::source::PackageSource;
use super::spec::{GraphSpec, ProjectNode};
use super::summary::{FrameworkResult, RestoreMessage, RestoreSummary, RestoreTotals};
use futures::stream::{self, StreamExt};
use std::num::NonZeroUsize;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Planned work for one node.
struct Planned {
    node: ProjectNode,
    skip: bool,
}

/// Restore every node on the graph's restore list.
///
/// `sources`, when non-empty, replaces each node's configured sources.
/// With `force` set no node is skipped by no-op detection.
///
/// Per-project failures are reported in that project's summary. The call
/// itself fails only on cancellation or when the graph breaks its
/// invariants.
pub async fn restore_async(
    graph: &GraphSpec,
    cache: &ProviderCache,
    context: &CacheContext,
    sources: &[PackageSource],
    force: bool,
    progress: Option<&ProgressFn<'_>>,
    cancel: &CancellationToken,
) -> Result<Vec<RestoreSummary>, RestoreError> {
    graph.validate()?;
    if cancel.is_cancelled() {
        return Err(RestoreError::Cancelled);
    }

    let nodes: Vec<ProjectNode> = graph
        .restore_nodes()
        .map(|node| effective_node(node, sources))
        .collect();
    notify(progress, &RestoreProgress::Started {
        projects: nodes.len(),
    });

    let plan: Vec<Planned> = nodes
        .into_iter()
        .map(|node| {
            let skip = !force && {
                let prior = read_prior_fingerprint(&node.restore.lock_file);
                should_skip(graph, &node, prior.as_ref())
            };
            Planned { node, skip }
        })
        .collect();
    let skip_count = plan.iter().filter(|p| p.skip).count();
    let restore_count = plan.len() - skip_count;
    info!(restore = restore_count, skip = skip_count, "Planned restore");
    notify(progress, &RestoreProgress::Planned {
        restore: restore_count,
        skip: skip_count,
    });

    let parallelism = context
        .max_parallelism()
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, NonZeroUsize::get))
        .min(restore_count)
        .max(1);
    debug!(parallelism, "Restoring projects");

    let results: Vec<Result<RestoreSummary, RestoreError>> = tokio::select! {
        () = cancel.cancelled() => return Err(RestoreError::Cancelled),
        results = stream::iter(plan)
            .map(|planned| async move {
                if planned.skip {
                    debug!(project = %planned.node.id, "No-op restore");
                    notify(progress, &RestoreProgress::ProjectSkipped {
                        project: planned.node.id.clone(),
                    });
                    return Ok(RestoreSummary::no_op(&planned.node.id, &planned.node.path));
                }
                restore_node(graph, &planned.node, cache, context, progress, cancel).await
            })
            .buffered(parallelism)
            .collect::<Vec<_>>() => results,
    };

    let summaries = results.into_iter().collect::<Result<Vec<_>, _>>()?;

    let totals = RestoreTotals::from_summaries(&summaries);
    info!(
        restored = totals.restored,
        skipped = totals.skipped,
        failed = totals.failed,
        "Restore finished"
    );
    notify(progress, &RestoreProgress::Finished {
        restored: totals.restored,
        skipped: totals.skipped,
        failed: totals.failed,
    });
    Ok(summaries)
}

/// Apply call-level source overrides.
fn effective_node(node: &ProjectNode, sources: &[PackageSource]) -> ProjectNode {
    let mut node = node.clone();
    if !sources.is_empty() {
        node.restore.sources = sources.to_vec();
    }
    node
}

/// Accumulates one node's outcome.
struct NodeRun<'a> {
    node: &'a ProjectNode,
    context: &'a CacheContext,
    errors: Vec<RestoreMessage>,
    warnings: Vec<RestoreMessage>,
}

impl NodeRun<'_> {
    fn error(&mut self, code: &str, message: impl Into<String>) {
        let message = RestoreMessage::error(code, message).for_project(&self.node.id);
        self.context.logger().log(message.clone());
        self.errors.push(message);
    }

    fn warning(&mut self, code: &str, message: impl Into<String>) {
        let message = RestoreMessage::warning(code, message).for_project(&self.node.id);
        self.context.logger().log(message.clone());
        self.warnings.push(message);
    }
}

async fn restore_node(
    graph: &GraphSpec,
    node: &ProjectNode,
    cache: &ProviderCache,
    context: &CacheContext,
    progress: Option<&ProgressFn<'_>>,
    cancel: &CancellationToken,
) -> Result<RestoreSummary, RestoreError> {
    let start = Instant::now();
    notify(progress, &RestoreProgress::ProjectStarted {
        project: node.id.clone(),
    });

    let mut run = NodeRun {
        node,
        context,
        errors: Vec::new(),
        warnings: Vec::new(),
    };
    let mut frameworks = Vec::new();
    let mut lock_file_written = false;

    match compute_fingerprint(graph, node) {
        Err(e) => run.error(codes::RESTORE_FINGERPRINT_FAILED, e.to_string()),
        Ok(fingerprint) => {
            let key = SourcesKey::for_node(node);
            let providers = tokio::select! {
                () = cancel.cancelled() => return Err(RestoreError::Cancelled),
                providers = cache.get_or_create(&key) => providers,
            };

            // Construction failures surface only when a lookup needs the source
            let mut resolved = Vec::new();
            for framework in &node.frameworks {
                match resolve_target(graph, node, framework, &providers, context, cancel).await {
                    Ok(target) => {
                        check_approximate_matches(&mut run, &target);
                        frameworks.push(framework_result(&target, true));
                        resolved.push(target);
                    }
                    Err(ResolutionError::Cancelled) => return Err(RestoreError::Cancelled),
                    Err(e) => {
                        run.error(e.code(), e.to_string());
                        frameworks.push(FrameworkResult {
                            framework: framework.moniker().to_string(),
                            success: false,
                            ..FrameworkResult::default()
                        });
                    }
                }
            }

            if run.errors.is_empty() {
                let lockfile = build_lockfile(node, fingerprint, &resolved);
                lock_file_written = commit_lockfile(&mut run, &lockfile, cancel)?;
            }
        }
    }

    let success = run.errors.is_empty();
    notify(progress, &RestoreProgress::ProjectFinished {
        project: node.id.clone(),
        success,
    });
    debug!(project = %node.id, success, lock_file_written, "Restored project");

    Ok(RestoreSummary {
        project_id: node.id.clone(),
        project_path: node.path.clone(),
        success,
        no_op: false,
        lock_file_written,
        errors: run.errors,
        warnings: run.warnings,
        elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        frameworks,
    })
}

/// Warn when a direct reference's inclusive lower bound was not available
/// and a higher version was picked instead.
fn check_approximate_matches(run: &mut NodeRun<'_>, target: &ResolvedTarget) {
    for package in target.packages.values().filter(|p| p.direct) {
        let Some(requested) = &package.requested else {
            continue;
        };
        let Some(min) = requested.min() else {
            continue;
        };
        if requested.satisfies(min) && package.version != *min {
            run.warning(
                codes::RESTORE_APPROXIMATE_MATCH,
                format!(
                    "'{}' {} was not found; resolved {} instead ({})",
                    package.id,
                    min,
                    package.version,
                    target.framework
                ),
            );
        }
    }
}

fn framework_result(target: &ResolvedTarget, success: bool) -> FrameworkResult {
    FrameworkResult {
        framework: target.framework.moniker().to_string(),
        success,
        packages: target
            .packages
            .iter()
            .map(|(id, p)| (id.clone(), p.version.to_string()))
            .collect(),
    }
}

fn build_lockfile(
    node: &ProjectNode,
    fingerprint: RestoreFingerprint,
    resolved: &[ResolvedTarget],
) -> Lockfile {
    let mut lockfile = Lockfile::new(&node.id, fingerprint);
    for target in resolved {
        let framework = target.framework.moniker();
        lockfile.add_target(framework);
        for (id, package) in &target.packages {
            let version = package.version.to_string();
            let mut entry = match &package.requested {
                Some(requested) if package.direct => {
                    LockedPackage::direct(version, requested.to_string())
                }
                _ => LockedPackage::transitive(version),
            };
            for dep in &package.dependencies {
                entry.add_dependency(dep.id.to_ascii_lowercase(), dep.range.to_string());
            }
            lockfile.add_package(framework, id, entry);
        }
    }
    lockfile
}

/// Write `lockfile` unless the file on disk already matches.
///
/// Returns whether the file was written.
fn commit_lockfile(
    run: &mut NodeRun<'_>,
    lockfile: &Lockfile,
    cancel: &CancellationToken,
) -> Result<bool, RestoreError> {
    let node = run.node;
    let path = &node.restore.lock_file;
    let existing = Lockfile::read_from(path);

    if node.restore.lock_file_mode == LockFileMode::Locked {
        match &existing {
            Err(e) if e.code() == lock_codes::LOCK_NOT_FOUND => {
                run.error(
                    lock_codes::LOCK_MISSING,
                    format!("Locked mode requires {}", path.display()),
                );
                return Ok(false);
            }
            Ok(current) if !current.same_resolution(lockfile) => {
                run.error(
                    lock_codes::LOCK_MISMATCH,
                    format!("Resolution differs from {}", path.display()),
                );
                return Ok(false);
            }
            _ => {}
        }
    }

    if existing.as_ref().is_ok_and(|current| current == lockfile) {
        return Ok(false);
    }

    if cancel.is_cancelled() {
        return Err(RestoreError::Cancelled);
    }
    match lockfile.write_to(path) {
        Ok(()) => Ok(true),
        Err(e) => {
            run.error(e.code(), e.message());
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restore::framework::TargetFramework;
    use crate::restore::metadata::{ProjectMetadata, ProjectReference};
    use crate::restore::settings::NullSettings;
    use crate::restore::source::{InMemoryProvider, PackageInfo, StaticProviderFactory};
    use crate::restore::spec::build_spec;
    use crate::restore::version::{parse_version, VersionRange};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn tf(s: &str) -> TargetFramework {
        TargetFramework::parse(s).unwrap()
    }

    fn feed() -> Arc<InMemoryProvider> {
        Arc::new(
            InMemoryProvider::new("feed")
                .with_package(PackageInfo::new("packageA", parse_version("1.0.0").unwrap()))
                .with_package(PackageInfo::new("packageA", parse_version("2.0.0").unwrap()))
                .with_package(PackageInfo::new("packageB", parse_version("1.5.0").unwrap())),
        )
    }

    fn cache() -> ProviderCache {
        ProviderCache::new(Arc::new(
            StaticProviderFactory::new().with_provider("feed", feed()),
        ))
    }

    fn project(dir: &Path, id: &str, reference: (&str, &str)) -> ProjectMetadata {
        ProjectMetadata::new(id, dir.join(id).join(format!("{id}.json")))
            .with_framework(tf("net46"))
            .with_source(PackageSource::named("feed", "feed"))
            .with_reference(ProjectReference::new(
                reference.0,
                VersionRange::parse(reference.1).unwrap(),
            ))
    }

    fn context() -> CacheContext {
        CacheContext::new(Arc::new(NullSettings))
    }

    #[tokio::test]
    async fn test_empty_graph() {
        let summaries = restore_async(
            &GraphSpec::empty(),
            &cache(),
            &context(),
            &[],
            false,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(summaries.is_empty());
    }

    #[tokio::test]
    async fn test_restore_writes_lock_then_noops() {
        let dir = tempdir().unwrap();
        let graph = build_spec(&[project(dir.path(), "app", ("packageA", "*"))], &NullSettings).unwrap();
        let cache = cache();
        let cancel = CancellationToken::new();

        let ctx = context();
        let first = restore_async(&graph, &cache, &ctx, &[], false, None, &cancel)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert!(first[0].success);
        assert!(!first[0].no_op);
        assert!(first[0].lock_file_written);
        assert_eq!(first[0].resolved_version("net46", "packageA"), Some("2.0.0"));
        assert_eq!(ctx.logger().errors(), 0);
        assert_eq!(ctx.logger().warnings(), 0);

        let lock_path = &graph.nodes[0].restore.lock_file;
        let lockfile = Lockfile::read_from(lock_path).unwrap();
        assert_eq!(
            lockfile.get_package("net46", "packagea").unwrap().version,
            "2.0.0"
        );

        let second = restore_async(&graph, &cache, &context(), &[], false, None, &cancel)
            .await
            .unwrap();
        assert!(second[0].no_op);
        assert!(second[0].success);
        assert!(!second[0].lock_file_written);
        assert_eq!(cache.construction_count(), 1);
    }

    #[tokio::test]
    async fn test_force_restores_without_rewriting_identical_lock() {
        let dir = tempdir().unwrap();
        let graph = build_spec(&[project(dir.path(), "app", ("packageA", "*"))], &NullSettings).unwrap();
        let cache = cache();
        let cancel = CancellationToken::new();

        restore_async(&graph, &cache, &context(), &[], false, None, &cancel)
            .await
            .unwrap();
        let forced = restore_async(&graph, &cache, &context(), &[], true, None, &cancel)
            .await
            .unwrap();

        assert!(!forced[0].no_op);
        assert!(forced[0].success);
        assert!(!forced[0].lock_file_written);
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let dir = tempdir().unwrap();
        let x = project(dir.path(), "x", ("packageA", "[5.0, )"));
        let y = project(dir.path(), "y", ("packageA", "1.0"));
        let graph = build_spec(&[x, y], &NullSettings).unwrap();
        let ctx = context();

        let summaries = restore_async(
            &graph,
            &cache(),
            &ctx,
            &[],
            false,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].project_id, "x");
        assert!(!summaries[0].success);
        assert_eq!(summaries[0].errors[0].code, codes::RESTORE_NO_MATCHING_VERSION);
        assert!(!summaries[0].lock_file_written);
        assert!(!graph.nodes[0].restore.lock_file.exists());

        assert_eq!(summaries[1].project_id, "y");
        assert!(summaries[1].success);
        assert_eq!(summaries[1].resolved_version("net46", "packagea"), Some("1.0.0"));
        assert_eq!(ctx.logger().errors(), 1);
    }

    #[tokio::test]
    async fn test_call_sources_override_node_sources() {
        let dir = tempdir().unwrap();
        let app = project(dir.path(), "app", ("packageA", "*"));
        let graph = build_spec(&[app], &NullSettings).unwrap();

        let summaries = restore_async(
            &graph,
            &cache(),
            &context(),
            &[PackageSource::new("unknown-feed")],
            false,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(!summaries[0].success);
        assert_eq!(summaries[0].errors[0].code, codes::RESTORE_SOURCE_UNREACHABLE);
    }

    #[tokio::test]
    async fn test_unused_unsupported_source_is_silent() {
        let dir = tempdir().unwrap();
        let app = ProjectMetadata::new("app", dir.path().join("app/app.json"))
            .with_framework(tf("net46"))
            .with_source(PackageSource::new("https://www.nuget.org/api/v2/"));
        let graph = build_spec(&[app], &NullSettings).unwrap();
        let cache = ProviderCache::default();
        let ctx = context();

        let summaries = restore_async(
            &graph,
            &cache,
            &ctx,
            &[],
            false,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(summaries[0].success, "errors: {:?}", summaries[0].errors);
        assert!(summaries[0].errors.is_empty());
        assert!(summaries[0].lock_file_written);
        assert_eq!(ctx.logger().errors(), 0);
        assert_eq!(ctx.logger().warnings(), 0);
    }

    #[tokio::test]
    async fn test_locked_mode() {
        let dir = tempdir().unwrap();
        let app = project(dir.path(), "app", ("packageA", "*")).with_lock_file_mode(LockFileMode::Locked);
        let graph = build_spec(&[app], &NullSettings).unwrap();
        let cancel = CancellationToken::new();

        let missing = restore_async(&graph, &cache(), &context(), &[], false, None, &cancel)
            .await
            .unwrap();
        assert!(!missing[0].success);
        assert_eq!(missing[0].errors[0].code, lock_codes::LOCK_MISSING);

        let node = &graph.nodes[0];
        let mut stale = Lockfile::new("app", RestoreFingerprint::new("old"));
        stale.add_package("net46", "packagea", LockedPackage::direct("1.0.0", "*"));
        stale.write_to(&node.restore.lock_file).unwrap();

        let mismatch = restore_async(&graph, &cache(), &context(), &[], false, None, &cancel)
            .await
            .unwrap();
        assert!(!mismatch[0].success);
        assert_eq!(mismatch[0].errors[0].code, lock_codes::LOCK_MISMATCH);
        assert_eq!(
            Lockfile::read_from(&node.restore.lock_file).unwrap(),
            stale
        );
    }

    #[tokio::test]
    async fn test_approximate_match_warning() {
        let dir = tempdir().unwrap();
        let app = project(dir.path(), "app", ("packageB", "1.0"));
        let graph = build_spec(&[app], &NullSettings).unwrap();

        let summaries = restore_async(
            &graph,
            &cache(),
            &context(),
            &[],
            false,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(summaries[0].success);
        assert_eq!(summaries[0].warnings.len(), 1);
        assert_eq!(summaries[0].warnings[0].code, codes::RESTORE_APPROXIMATE_MATCH);
    }

    #[tokio::test]
    async fn test_progress_events() {
        let dir = tempdir().unwrap();
        let graph = build_spec(&[project(dir.path(), "app", ("packageA", "*"))], &NullSettings).unwrap();
        let events = Mutex::new(Vec::new());
        let sink = |event: &RestoreProgress| events.lock().unwrap().push(event.clone());

        restore_async(
            &graph,
            &cache(),
            &context(),
            &[],
            false,
            Some(&sink),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let events = events.into_inner().unwrap();
        assert_eq!(events.first(), Some(&RestoreProgress::Started { projects: 1 }));
        assert!(events.contains(&RestoreProgress::ProjectFinished {
            project: "app".into(),
            success: true,
        }));
        assert_eq!(
            events.last(),
            Some(&RestoreProgress::Finished {
                restored: 1,
                skipped: 0,
                failed: 0,
            })
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempdir().unwrap();
        let graph = build_spec(&[project(dir.path(), "app", ("packageA", "*"))], &NullSettings).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = restore_async(&graph, &cache(), &context(), &[], false, None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RestoreError::Cancelled));
        assert!(!graph.nodes[0].restore.lock_file.exists());
    }

    #[tokio::test]
    async fn test_invalid_graph_is_fatal() {
        let dir = tempdir().unwrap();
        let mut graph = build_spec(&[project(dir.path(), "app", ("packageA", "*"))], &NullSettings).unwrap();
        graph.nodes[0].project_references.push("ghost".into());

        let err = restore_async(
            &graph,
            &cache(),
            &context(),
            &[],
            false,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), codes::RESTORE_PROJECT_REF_DANGLING);
    }
}
