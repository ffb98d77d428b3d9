//! Restore outcomes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Severity of a restore message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Warning,
    Error,
}

/// A message attached to a project's restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreMessage {
    pub level: MessageLevel,
    /// Stable error code.
    pub code: String,
    pub message: String,
    /// Project the message belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

impl RestoreMessage {
    #[must_use]
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            code: code.to_string(),
            message: message.into(),
            project: None,
        }
    }

    #[must_use]
    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            code: code.to_string(),
            message: message.into(),
            project: None,
        }
    }

    #[must_use]
    pub fn for_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }
}

/// Resolution result for one target framework.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkResult {
    pub framework: String,
    pub success: bool,
    /// Package id -> resolved version.
    pub packages: BTreeMap<String, String>,
}

/// Outcome of restoring one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub project_id: String,
    pub project_path: PathBuf,
    pub success: bool,
    /// Skipped because nothing changed since the last restore.
    pub no_op: bool,
    pub lock_file_written: bool,
    pub errors: Vec<RestoreMessage>,
    pub warnings: Vec<RestoreMessage>,
    pub elapsed_ms: u64,
    pub frameworks: Vec<FrameworkResult>,
}

impl RestoreSummary {
    /// Summary for a project skipped by no-op detection.
    #[must_use]
    pub fn no_op(project_id: impl Into<String>, project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_id: project_id.into(),
            project_path: project_path.into(),
            success: true,
            no_op: true,
            lock_file_written: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            elapsed_ms: 0,
            frameworks: Vec::new(),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// Resolved version of `id` under `framework`.
    #[must_use]
    pub fn resolved_version(&self, framework: &str, id: &str) -> Option<&str> {
        self.frameworks
            .iter()
            .find(|f| f.framework == framework)
            .and_then(|f| f.packages.get(&id.to_ascii_lowercase()))
            .map(String::as_str)
    }
}

/// Aggregate counts over a restore call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreTotals {
    pub restored: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
}

impl RestoreTotals {
    #[must_use]
    pub fn from_summaries(summaries: &[RestoreSummary]) -> Self {
        let mut totals = Self::default();
        for summary in summaries {
            if summary.no_op {
                totals.skipped += 1;
            } else if summary.success {
                totals.restored += 1;
            } else {
                totals.failed += 1;
            }
            totals.errors += summary.errors.len();
            totals.warnings += summary.warnings.len();
        }
        totals
    }

    /// A fully successful restore has no failures, errors or warnings.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.errors == 0 && self.warnings == 0
    }
}
