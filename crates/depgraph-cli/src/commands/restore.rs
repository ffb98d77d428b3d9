use super::load_solution;
use depgraph_core::paths::absolutize;
use depgraph_core::restore::{
    restore_async, CacheContext, PackageSource, ProgressFn, ProviderCache, RestoreError,
    RestoreProgress, RestoreSummary, RestoreTotals,
};
use depgraph_core::Config;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Schema version for `restore --json` output.
pub const RESTORE_SCHEMA_VERSION: u32 = 1;

/// Exit code when at least one project failed or the call was aborted.
const EXIT_FAILED: i32 = 1;

#[derive(Debug)]
pub struct RestoreArgs {
    pub solution: Option<PathBuf>,
    pub force: bool,
    pub sources: Vec<String>,
    pub projects: Vec<String>,
}

#[derive(Serialize)]
struct RestoreResult<'a> {
    schema_version: u32,
    ok: bool,
    totals: RestoreTotals,
    projects: &'a [RestoreSummary],
}

#[derive(Serialize)]
struct RestoreErrorResult {
    schema_version: u32,
    ok: bool,
    error: ErrorJson,
}

#[derive(Serialize)]
struct ErrorJson {
    code: &'static str,
    message: String,
}

/// Run the restore command.
pub fn run(config: &Config, args: &RestoreArgs, json: bool) -> Result<()> {
    let solution = load_solution(&config.cwd, args.solution.as_deref())?;
    let mut graph = solution.build_spec().into_diagnostic()?;
    if !args.projects.is_empty() {
        graph = graph.restore_only(&args.projects).into_diagnostic()?;
    }

    let sources = call_sources(&config.cwd, &args.sources);
    let mut context = CacheContext::new(Arc::new(solution.settings.clone()));
    if let Some(max) = config.max_parallelism {
        context = context.with_max_parallelism(max);
    }
    let cache = ProviderCache::default();
    let cancel = CancellationToken::new();

    let progress = |event: &RestoreProgress| match event {
        RestoreProgress::ProjectStarted { project } => info!(project = %project, "Restoring"),
        RestoreProgress::ProjectSkipped { project } => {
            info!(project = %project, "Up to date");
        }
        other => debug!(?other, "Restore progress"),
    };
    let progress: &ProgressFn<'_> = &progress;

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let result = runtime.block_on(async {
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };
        let result = restore_async(
            &graph,
            &cache,
            &context,
            &sources,
            args.force,
            Some(progress),
            &cancel,
        )
        .await;
        watcher.abort();
        result
    });

    match result {
        Ok(summaries) => {
            let totals = RestoreTotals::from_summaries(&summaries);
            if json {
                print_json(&RestoreResult {
                    schema_version: RESTORE_SCHEMA_VERSION,
                    ok: totals.failed == 0,
                    totals,
                    projects: &summaries,
                })?;
            } else {
                print_human(&summaries, &totals)?;
            }
            if totals.failed > 0 {
                std::process::exit(EXIT_FAILED);
            }
            Ok(())
        }
        Err(e) => {
            report_error(&e, json)?;
            std::process::exit(EXIT_FAILED);
        }
    }
}

/// Command-line sources; relative local paths are taken from `cwd`.
fn call_sources(cwd: &Path, sources: &[String]) -> Vec<PackageSource> {
    sources
        .iter()
        .map(|s| {
            let mut source = PackageSource::new(s.clone());
            if source.is_local() {
                source.source = absolutize(cwd, Path::new(s))
                    .to_string_lossy()
                    .into_owned();
            }
            source
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}

fn report_error(error: &RestoreError, json: bool) -> Result<()> {
    if json {
        print_json(&RestoreErrorResult {
            schema_version: RESTORE_SCHEMA_VERSION,
            ok: false,
            error: ErrorJson {
                code: error.code(),
                message: error.to_string(),
            },
        })
    } else {
        eprintln!("error[{}]: {error}", error.code());
        Ok(())
    }
}

fn print_human(summaries: &[RestoreSummary], totals: &RestoreTotals) -> Result<()> {
    let mut out = io::stdout().lock();

    for summary in summaries {
        let status = if summary.no_op {
            "up to date"
        } else if summary.success {
            "restored"
        } else {
            "failed"
        };
        let packages: usize = summary.frameworks.iter().map(|f| f.packages.len()).sum();
        writeln!(
            out,
            "{:<10} {} ({} packages, {}ms)",
            status, summary.project_id, packages, summary.elapsed_ms
        )
        .into_diagnostic()?;

        for message in summary.errors.iter().chain(summary.warnings.iter()) {
            writeln!(out, "  {:?} {}: {}", message.level, message.code, message.message)
                .into_diagnostic()?;
        }
    }

    writeln!(
        out,
        "\n{} restored, {} up to date, {} failed, {} errors, {} warnings",
        totals.restored, totals.skipped, totals.failed, totals.errors, totals.warnings
    )
    .into_diagnostic()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_call_sources_resolves_local_paths() {
        let sources = call_sources(
            Path::new("/work"),
            &["feed".to_string(), "https://feed.example.org/v3".to_string()],
        );
        assert_eq!(sources[0].source, "/work/feed");
        assert_eq!(sources[0].name, "feed");
        assert_eq!(sources[1].source, "https://feed.example.org/v3");
    }
}
