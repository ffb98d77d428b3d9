//! Per-project lock file.
//!
//! The lock file records the resolved package versions for every target
//! framework of a project, plus the fingerprint of the inputs that produced
//! them. The next restore compares that fingerprint to decide whether it
//! can skip the project.
//!
//! ## Schema Version
//!
//! - Schema version 1: initial format
//!
//! ## File Format
//!
//! ```json
//! {
//!   "lockfile_version": 1,
//!   "project": "app",
//!   "fingerprint": "5f1c...",
//!   "targets": {
//!     "net46": {
//!       "packagea": { "version": "2.0.0", "kind": "direct", "requested": "*" }
//!     }
//!   }
//! }
//! ```
//!
//! Maps are `BTreeMap`s and no timestamps are recorded, so identical input
//! always serializes to identical bytes.

use super::fingerprint::RestoreFingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Schema version for the lock file format.
pub const LOCK_SCHEMA_VERSION: u32 = 1;

/// Lock file error codes.
pub mod codes {
    /// Lock file not found at the expected path.
    pub const LOCK_NOT_FOUND: &str = "LOCK_NOT_FOUND";
    /// Lock file has invalid JSON.
    pub const LOCK_INVALID_JSON: &str = "LOCK_INVALID_JSON";
    /// Lock file schema version mismatch.
    pub const LOCK_VERSION_MISMATCH: &str = "LOCK_VERSION_MISMATCH";
    /// Lock file write failed.
    pub const LOCK_WRITE_FAILED: &str = "LOCK_WRITE_FAILED";
    /// Locked mode: the lock file is missing.
    pub const LOCK_MISSING: &str = "LOCK_MISSING";
    /// Locked mode: the resolution differs from the lock file.
    pub const LOCK_MISMATCH: &str = "LOCK_MISMATCH";
}

/// Why a package is in the lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    /// Referenced by the project itself.
    Direct,
    /// Pulled in by another package or by a referenced project.
    Transitive,
}

/// A locked package entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    /// Resolved version.
    pub version: String,
    pub kind: LockKind,
    /// Range requested by the project (direct references only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<String>,
    /// Dependencies of this package (id -> range).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
}

impl LockedPackage {
    #[must_use]
    pub fn direct(version: impl Into<String>, requested: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            kind: LockKind::Direct,
            requested: Some(requested.into()),
            dependencies: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn transitive(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            kind: LockKind::Transitive,
            requested: None,
            dependencies: BTreeMap::new(),
        }
    }

    /// Add a dependency.
    pub fn add_dependency(&mut self, id: impl Into<String>, range: impl Into<String>) {
        self.dependencies.insert(id.into(), range.into());
    }
}

/// The complete lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    /// Schema version for the lock file format.
    pub lockfile_version: u32,
    /// Project identifier.
    pub project: String,
    /// Fingerprint of the inputs this resolution was computed from.
    pub fingerprint: RestoreFingerprint,
    /// Framework moniker -> package id -> locked package.
    #[serde(default)]
    pub targets: BTreeMap<String, BTreeMap<String, LockedPackage>>,
}

impl Lockfile {
    /// Create an empty lock file.
    #[must_use]
    pub fn new(project: impl Into<String>, fingerprint: RestoreFingerprint) -> Self {
        Self {
            lockfile_version: LOCK_SCHEMA_VERSION,
            project: project.into(),
            fingerprint,
            targets: BTreeMap::new(),
        }
    }

    /// Record a framework, even one with no packages.
    pub fn add_target(&mut self, framework: impl Into<String>) {
        self.targets.entry(framework.into()).or_default();
    }

    /// Add a package under a framework.
    pub fn add_package(&mut self, framework: &str, id: &str, pkg: LockedPackage) {
        self.targets
            .entry(framework.to_string())
            .or_default()
            .insert(id.to_string(), pkg);
    }

    /// Get a package entry.
    #[must_use]
    pub fn get_package(&self, framework: &str, id: &str) -> Option<&LockedPackage> {
        self.targets.get(framework).and_then(|t| t.get(id))
    }

    /// Whether both lock files record the same resolution, ignoring the fingerprint.
    #[must_use]
    pub fn same_resolution(&self, other: &Self) -> bool {
        self.targets == other.targets
    }

    /// Read a lock file from a path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be read or parsed, or
    /// has an unsupported schema version.
    pub fn read_from(path: &Path) -> Result<Self, LockfileError> {
        let content = depgraph_util::fs::read_if_exists(path)
            .map_err(|e| {
                LockfileError::new(
                    codes::LOCK_INVALID_JSON,
                    format!("Failed to read lock file: {e}"),
                )
            })?
            .ok_or_else(|| {
                LockfileError::new(
                    codes::LOCK_NOT_FOUND,
                    format!("Lock file not found: {}", path.display()),
                )
            })?;

        let lockfile: Self = serde_json::from_slice(&content).map_err(|e| {
            LockfileError::new(
                codes::LOCK_INVALID_JSON,
                format!("Invalid lock file JSON: {e}"),
            )
        })?;

        if lockfile.lockfile_version != LOCK_SCHEMA_VERSION {
            return Err(LockfileError::new(
                codes::LOCK_VERSION_MISMATCH,
                format!(
                    "Lock file version {} not supported (expected {})",
                    lockfile.lockfile_version, LOCK_SCHEMA_VERSION
                ),
            ));
        }

        Ok(lockfile)
    }

    /// Write the lock file to a path atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), LockfileError> {
        let content = self.to_json()?;

        depgraph_util::fs::atomic_write(path, content.as_bytes()).map_err(|e| {
            LockfileError::new(
                codes::LOCK_WRITE_FAILED,
                format!("Failed to write lock file {}: {e}", path.display()),
            )
        })
    }

    /// Serialize to the on-disk JSON form (pretty, trailing newline).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, LockfileError> {
        let mut json = serde_json::to_string_pretty(self).map_err(|e| {
            LockfileError::new(
                codes::LOCK_WRITE_FAILED,
                format!("Failed to serialize lock file: {e}"),
            )
        })?;
        json.push('\n');
        Ok(json)
    }
}

/// Lock file error.
#[derive(Debug)]
pub struct LockfileError {
    code: &'static str,
    message: String,
}

impl LockfileError {
    /// Create a new error.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LockfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for LockfileError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Lockfile {
        let mut lockfile = Lockfile::new("app", RestoreFingerprint::new("abc123"));
        let mut a = LockedPackage::direct("2.0.0", "*");
        a.add_dependency("packageb", "[1.0.0, )");
        lockfile.add_package("net46", "packagea", a);
        lockfile.add_package("net46", "packageb", LockedPackage::transitive("1.0.0"));
        lockfile
    }

    #[test]
    fn test_lock_schema_version_is_stable() {
        assert_eq!(LOCK_SCHEMA_VERSION, 1);
    }

    #[test]
    fn test_error_codes_are_uppercase() {
        let all_codes = [
            codes::LOCK_NOT_FOUND,
            codes::LOCK_INVALID_JSON,
            codes::LOCK_VERSION_MISMATCH,
            codes::LOCK_WRITE_FAILED,
            codes::LOCK_MISSING,
            codes::LOCK_MISMATCH,
        ];

        for code in all_codes {
            assert!(
                code.chars().all(|c| c.is_uppercase() || c == '_'),
                "Error code '{code}' should be SCREAMING_SNAKE_CASE"
            );
        }
    }

    #[test]
    fn test_lockfile_deterministic_ordering() {
        let mut lockfile = Lockfile::new("app", RestoreFingerprint::new("f"));
        lockfile.add_package("net46", "zod", LockedPackage::transitive("3.0.0"));
        lockfile.add_package("net46", "axios", LockedPackage::transitive("1.0.0"));
        lockfile.add_package("net46", "lodash", LockedPackage::transitive("4.0.0"));

        let json1 = lockfile.to_json().unwrap();
        let json2 = lockfile.clone().to_json().unwrap();
        assert_eq!(json1, json2);

        let axios = json1.find("\"axios\"").unwrap();
        let lodash = json1.find("\"lodash\"").unwrap();
        let zod = json1.find("\"zod\"").unwrap();
        assert!(axios < lodash);
        assert!(lodash < zod);
        assert!(json1.ends_with("}\n"));
    }

    #[test]
    fn test_lockfile_write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("packages.lock.json");
        let lockfile = sample();

        lockfile.write_to(&path).unwrap();
        let first = std::fs::read(&path).unwrap();
        lockfile.write_to(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);

        let loaded = Lockfile::read_from(&path).unwrap();
        assert_eq!(loaded, lockfile);
        assert_eq!(
            loaded.get_package("net46", "packagea").unwrap().version,
            "2.0.0"
        );
    }

    #[test]
    fn test_read_missing_and_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("packages.lock.json");

        let err = Lockfile::read_from(&path).unwrap_err();
        assert_eq!(err.code(), codes::LOCK_NOT_FOUND);

        std::fs::write(&path, "{ truncated").unwrap();
        let err = Lockfile::read_from(&path).unwrap_err();
        assert_eq!(err.code(), codes::LOCK_INVALID_JSON);
    }

    #[test]
    fn test_read_rejects_other_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("packages.lock.json");
        let mut lockfile = sample();
        lockfile.lockfile_version = 99;
        std::fs::write(&path, lockfile.to_json().unwrap()).unwrap();

        let err = Lockfile::read_from(&path).unwrap_err();
        assert_eq!(err.code(), codes::LOCK_VERSION_MISMATCH);
    }

    #[test]
    fn test_same_resolution_ignores_fingerprint() {
        let a = sample();
        let mut b = sample();
        b.fingerprint = RestoreFingerprint::new("different");
        assert!(a.same_resolution(&b));

        b.add_package("net46", "packagec", LockedPackage::transitive("1.0.0"));
        assert!(!a.same_resolution(&b));
    }
}
