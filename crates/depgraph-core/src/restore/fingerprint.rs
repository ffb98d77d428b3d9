//! No-op detection.
//!
//! A fingerprint is a BLAKE3 digest over everything that can change a
//! project's resolution: its own references, frameworks, runtime ids and
//! effective restore settings, plus the references and frameworks of every
//! project it transitively references. The lock file stores the fingerprint
//! it was written with; a restore whose fingerprint matches is skipped.
//!
//! ## Hashing Rules (v1)
//!
//! - Every field is prefixed with a label and terminated by `\0`
//! - Unordered inputs (references, frameworks, runtime ids, sources,
//!   referenced projects) are sorted first
//! - Fallback folders keep their order (lookup order matters)
//! - The engine version is hashed, so upgrading re-restores once
//! - Environment variables only contribute through the effective settings

use super::lockfile::Lockfile;
use super::metadata::ProjectReference;
use super::spec::{GraphSpec, ProjectNode};
use crate::version::VERSION;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Version of the fingerprint encoding.
pub const FINGERPRINT_FORMAT_VERSION: u32 = 1;

/// Digest of a project's restore inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RestoreFingerprint(String);

impl RestoreFingerprint {
    #[must_use]
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RestoreFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("Project '{project}' references '{target}', which is not in the graph")]
    MissingProject { project: String, target: String },
}

/// Labelled, NUL-separated byte encoding.
#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn field(&mut self, label: &str, value: &str) {
        self.buf.extend_from_slice(label.as_bytes());
        self.buf.push(b':');
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
    }

    fn list<S: AsRef<str>>(&mut self, label: &str, values: &[S]) {
        self.field(label, &values.len().to_string());
        for value in values {
            self.field("-", value.as_ref());
        }
    }

    fn finish(self) -> RestoreFingerprint {
        RestoreFingerprint(depgraph_util::hash::blake3_bytes(&self.buf))
    }
}

fn sorted<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: ToString,
{
    let mut out: Vec<String> = items.into_iter().map(|s| s.to_string()).collect();
    out.sort();
    out.dedup();
    out
}

fn encode_reference(reference: &ProjectReference) -> String {
    let frameworks = sorted(reference.frameworks.iter().map(|f| f.moniker().to_string()));
    format!(
        "{}|{}|{}",
        reference.id.to_ascii_lowercase(),
        reference.range,
        frameworks.join(",")
    )
}

/// Inputs every project contributes, whether restored or referenced.
fn encode_project(enc: &mut Encoder, node: &ProjectNode) {
    enc.field("project", &node.key());
    enc.list(
        "frameworks",
        &sorted(node.frameworks.iter().map(|f| f.moniker().to_string())),
    );
    enc.list("references", &sorted(node.references.iter().map(encode_reference)));
    enc.list(
        "project-references",
        &sorted(node.project_references.iter().map(|p| p.to_ascii_lowercase())),
    );
}

/// Compute the fingerprint for `node` within `graph`.
///
/// # Errors
///
/// Returns an error if a referenced project is missing from the graph.
pub fn compute_fingerprint(
    graph: &GraphSpec,
    node: &ProjectNode,
) -> Result<RestoreFingerprint, FingerprintError> {
    let mut enc = Encoder::default();
    enc.field("format", &FINGERPRINT_FORMAT_VERSION.to_string());
    enc.field("engine", VERSION);

    encode_project(&mut enc, node);
    enc.list("runtimes", &sorted(node.runtime_identifiers.iter()));

    let restore = &node.restore;
    enc.list("sources", &sorted(restore.sources.iter().map(|s| s.source.clone())));
    let fallback: Vec<String> = restore
        .fallback_folders
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    enc.list("fallback", &fallback);
    enc.field(
        "packages",
        &restore
            .packages_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    enc.field("lock", &restore.lock_file.to_string_lossy());
    enc.field("lock-mode", &format!("{:?}", restore.lock_file_mode));

    for target in &node.project_references {
        if graph.node(target).is_none() {
            return Err(FingerprintError::MissingProject {
                project: node.id.clone(),
                target: target.clone(),
            });
        }
    }
    let closure = graph.closure(&node.id);
    enc.field("closure", &closure.len().to_string());
    for referenced in closure {
        encode_project(&mut enc, referenced);
    }

    Ok(enc.finish())
}

/// Whether `node` can be skipped given the fingerprint of its last restore.
///
/// Never skips without a prior fingerprint or when the current one cannot
/// be computed.
#[must_use]
pub fn should_skip(
    graph: &GraphSpec,
    node: &ProjectNode,
    prior: Option<&RestoreFingerprint>,
) -> bool {
    let Some(prior) = prior else {
        return false;
    };
    match compute_fingerprint(graph, node) {
        Ok(current) => current == *prior,
        Err(e) => {
            debug!(project = %node.id, error = %e, "Fingerprint failed, not skipping");
            false
        }
    }
}

/// Read the fingerprint stored in a lock file.
///
/// Missing, unreadable, corrupt or incompatible lock files all yield `None`.
#[must_use]
pub fn read_prior_fingerprint(lock_file: &Path) -> Option<RestoreFingerprint> {
    match Lockfile::read_from(lock_file) {
        Ok(lockfile) => Some(lockfile.fingerprint),
        Err(e) => {
            debug!(path = %lock_file.display(), code = e.code(), "No prior fingerprint");
            None
        }
    }
}
