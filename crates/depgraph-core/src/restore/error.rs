//! Restore error types.
//!
//! Session-scoped errors ([`GraphBuildError`], [`RestoreError`]) propagate to
//! the caller. Node-scoped errors ([`ResolutionError`],
//! [`ProviderConstructionError`]) end up in that node's summary.

use std::path::PathBuf;
use thiserror::Error;

/// Stable restore error codes.
pub mod codes {
    // Graph spec construction
    pub const RESTORE_PROJECT_NO_FRAMEWORKS: &str = "RESTORE_PROJECT_NO_FRAMEWORKS";
    pub const RESTORE_PROJECT_ID_EMPTY: &str = "RESTORE_PROJECT_ID_EMPTY";
    pub const RESTORE_PROJECT_DUPLICATE: &str = "RESTORE_PROJECT_DUPLICATE";
    pub const RESTORE_LOCK_PATH_DUPLICATE: &str = "RESTORE_LOCK_PATH_DUPLICATE";
    pub const RESTORE_PACKAGE_ID_EMPTY: &str = "RESTORE_PACKAGE_ID_EMPTY";
    pub const RESTORE_PROJECT_REF_DANGLING: &str = "RESTORE_PROJECT_REF_DANGLING";
    pub const RESTORE_PROJECT_REF_CYCLE: &str = "RESTORE_PROJECT_REF_CYCLE";
    pub const RESTORE_TARGET_UNKNOWN: &str = "RESTORE_TARGET_UNKNOWN";

    // Resolution
    pub const RESTORE_PACKAGE_NOT_FOUND: &str = "RESTORE_PACKAGE_NOT_FOUND";
    pub const RESTORE_NO_MATCHING_VERSION: &str = "RESTORE_NO_MATCHING_VERSION";
    pub const RESTORE_VERSION_CONFLICT: &str = "RESTORE_VERSION_CONFLICT";
    pub const RESTORE_PROJECT_INCOMPATIBLE: &str = "RESTORE_PROJECT_INCOMPATIBLE";
    pub const RESTORE_SOURCE_FAILED: &str = "RESTORE_SOURCE_FAILED";
    pub const RESTORE_RESOLUTION_DIVERGED: &str = "RESTORE_RESOLUTION_DIVERGED";
    pub const RESTORE_FINGERPRINT_FAILED: &str = "RESTORE_FINGERPRINT_FAILED";
    pub const RESTORE_APPROXIMATE_MATCH: &str = "RESTORE_APPROXIMATE_MATCH";

    // Providers
    pub const RESTORE_SOURCE_UNREACHABLE: &str = "RESTORE_SOURCE_UNREACHABLE";
    pub const RESTORE_SOURCE_UNSUPPORTED: &str = "RESTORE_SOURCE_UNSUPPORTED";

    // Session
    pub const RESTORE_CANCELLED: &str = "RESTORE_CANCELLED";
}

/// Malformed or inconsistent project metadata. Fatal to the whole restore.
#[derive(Debug, Error)]
pub enum GraphBuildError {
    #[error("Project '{project}' declares no target frameworks")]
    MissingFrameworks { project: String },

    #[error("Project at {path} has an empty identifier")]
    EmptyProjectId { path: PathBuf },

    #[error("Duplicate project identifier '{0}'")]
    DuplicateProject(String),

    #[error("Projects '{first}' and '{second}' share lock file {path}")]
    DuplicateLockFile {
        first: String,
        second: String,
        path: PathBuf,
    },

    #[error("Project '{project}' has a package reference with an empty id")]
    EmptyPackageId { project: String },

    #[error("Project '{project}' references unknown project '{target}'")]
    DanglingReference { project: String, target: String },

    #[error("Project reference cycle: {0}")]
    Cycle(String),

    #[error("Restore target '{0}' is not a project in the graph")]
    UnknownRestoreTarget(String),
}

impl GraphBuildError {
    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFrameworks { .. } => codes::RESTORE_PROJECT_NO_FRAMEWORKS,
            Self::EmptyProjectId { .. } => codes::RESTORE_PROJECT_ID_EMPTY,
            Self::DuplicateProject(_) => codes::RESTORE_PROJECT_DUPLICATE,
            Self::DuplicateLockFile { .. } => codes::RESTORE_LOCK_PATH_DUPLICATE,
            Self::EmptyPackageId { .. } => codes::RESTORE_PACKAGE_ID_EMPTY,
            Self::DanglingReference { .. } => codes::RESTORE_PROJECT_REF_DANGLING,
            Self::Cycle(_) => codes::RESTORE_PROJECT_REF_CYCLE,
            Self::UnknownRestoreTarget(_) => codes::RESTORE_TARGET_UNKNOWN,
        }
    }
}

/// Failure to compute a consistent version assignment for one project.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Unable to find package '{id}' in any source")]
    PackageNotFound { id: String },

    #[error("No version of '{id}' satisfies {range} ({available} versions available)")]
    NoMatchingVersion {
        id: String,
        range: String,
        available: usize,
    },

    #[error("Conflicting requirements for '{id}': {ranges}")]
    Conflict { id: String, ranges: String },

    #[error("Referenced project '{project}' has no framework compatible with {framework}")]
    ProjectIncompatible { project: String, framework: String },

    #[error("Source '{source_name}' failed: {message}")]
    SourceFailed {
        source_name: String,
        message: String,
    },

    /// A configured source failed to construct and a lookup needed it.
    #[error(transparent)]
    SourceUnavailable(#[from] ProviderConstructionError),

    #[error("Resolution did not settle after {rounds} rounds")]
    Diverged { rounds: usize },

    #[error("Failed to fingerprint restore inputs: {0}")]
    Fingerprint(String),

    #[error("Resolution was cancelled")]
    Cancelled,
}

impl ResolutionError {
    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PackageNotFound { .. } => codes::RESTORE_PACKAGE_NOT_FOUND,
            Self::NoMatchingVersion { .. } => codes::RESTORE_NO_MATCHING_VERSION,
            Self::Conflict { .. } => codes::RESTORE_VERSION_CONFLICT,
            Self::ProjectIncompatible { .. } => codes::RESTORE_PROJECT_INCOMPATIBLE,
            Self::SourceFailed { .. } => codes::RESTORE_SOURCE_FAILED,
            Self::SourceUnavailable(e) => e.code(),
            Self::Diverged { .. } => codes::RESTORE_RESOLUTION_DIVERGED,
            Self::Fingerprint(_) => codes::RESTORE_FINGERPRINT_FAILED,
            Self::Cancelled => codes::RESTORE_CANCELLED,
        }
    }
}

/// A package source could not be turned into a provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderConstructionError {
    #[error("Source '{source_name}' is unreachable: {reason}")]
    Unreachable { source_name: String, reason: String },

    #[error("Source '{source_name}' uses unsupported scheme '{scheme}'")]
    Unsupported { source_name: String, scheme: String },
}

impl ProviderConstructionError {
    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => codes::RESTORE_SOURCE_UNREACHABLE,
            Self::Unsupported { .. } => codes::RESTORE_SOURCE_UNSUPPORTED,
        }
    }
}

/// Errors that abort a whole restore call.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error(transparent)]
    Graph(#[from] GraphBuildError),

    #[error("Restore was cancelled")]
    Cancelled,
}

impl RestoreError {
    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Graph(e) => e.code(),
            Self::Cancelled => codes::RESTORE_CANCELLED,
        }
    }
}
