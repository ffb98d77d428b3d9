//! Dependency graph restore.
//!
//! Provides:
//! - Project metadata read through a narrow adapter interface
//! - The solution-wide graph spec builder
//! - A process-wide provider cache with single construction per key
//! - Fingerprint-based no-op detection
//! - The restore orchestrator and its per-session cache context
//! - Deterministic per-project lock files

pub mod context;
pub mod error;
pub mod fingerprint;
pub mod framework;
pub mod lockfile;
pub mod metadata;
pub mod orchestrator;
pub mod progress;
pub mod provider_cache;
pub mod resolve;
pub mod settings;
pub mod solution;
pub mod source;
pub mod spec;
pub mod summary;
pub mod version;

pub use context::{CacheContext, RestoreLogger};
pub use error::{
    codes, GraphBuildError, ProviderConstructionError, ResolutionError, RestoreError,
};
pub use fingerprint::{
    compute_fingerprint, read_prior_fingerprint, should_skip, FingerprintError,
    RestoreFingerprint, FINGERPRINT_FORMAT_VERSION,
};
pub use framework::{FrameworkError, TargetFramework};
pub use lockfile::{
    codes as lockfile_codes, LockKind, LockedPackage, Lockfile, LockfileError,
    LOCK_SCHEMA_VERSION,
};
pub use metadata::{
    read_metadata, LockFileMode, ProjectAdapter, ProjectMetadata, ProjectReference,
    ProjectRestoreSettings,
};
pub use orchestrator::restore_async;
pub use progress::{ProgressFn, RestoreProgress};
pub use provider_cache::{ProviderCache, RestoreProviders, SourcesKey};
pub use resolve::{ResolvedPackage, ResolvedTarget};
pub use settings::{NullSettings, Settings, SettingsProvider, FALLBACK_FOLDERS_ENV, PACKAGES_ENV};
pub use solution::Solution;
pub use source::{
    FeedProviderFactory, InMemoryProvider, LocalFolderProvider, PackageDependency, PackageInfo,
    PackageProvider, PackageSource, ProviderError, ProviderFactory, StaticProviderFactory,
};
pub use spec::{build_spec, GraphSpec, NodeRestoreSettings, ProjectNode, LOCK_FILE_NAME};
pub use summary::{FrameworkResult, MessageLevel, RestoreMessage, RestoreSummary, RestoreTotals};
pub use version::{parse_version, VersionError, VersionRange};
