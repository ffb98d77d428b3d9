//! Package sources and the providers that answer "which versions of P exist".
//!
//! A [`PackageSource`] is configuration (a name and a location). A
//! [`ProviderFactory`] turns sources into [`PackageProvider`]s. The
//! default [`FeedProviderFactory`] understands local folder feeds laid out as
//! `<root>/<id>/<version>/<id>.json`; remote protocols are out of scope and
//! fail construction.

use super::error::ProviderConstructionError;
use super::version::{parse_version, VersionRange};
use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// A configured package source.
///
/// Deserializes from either a bare location string or `{ "name", "source" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "SourceRepr")]
pub struct PackageSource {
    /// Display name (defaults to the location).
    pub name: String,
    /// Directory path or URL.
    pub source: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SourceRepr {
    Location(String),
    Named { name: String, source: String },
}

impl From<SourceRepr> for PackageSource {
    fn from(repr: SourceRepr) -> Self {
        match repr {
            SourceRepr::Location(source) => Self::new(source),
            SourceRepr::Named { name, source } => Self::named(name, source),
        }
    }
}

/// Where a source points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// A directory feed.
    Local(PathBuf),
    /// A URL with a scheme other than `file`.
    Remote(Url),
}

impl PackageSource {
    /// Create a source named after its location.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            name: source.clone(),
            source,
        }
    }

    /// Create a named source.
    #[must_use]
    pub fn named(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Classify the location.
    ///
    /// Single-letter schemes are treated as Windows drive letters, not URLs.
    #[must_use]
    pub fn location(&self) -> SourceLocation {
        match Url::parse(&self.source) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map_or_else(|()| SourceLocation::Remote(url), SourceLocation::Local),
            Ok(url) if url.scheme().len() > 1 => SourceLocation::Remote(url),
            _ => SourceLocation::Local(PathBuf::from(&self.source)),
        }
    }

    /// Whether this source is a local directory feed.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self.location(), SourceLocation::Local(_))
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.source {
            f.write_str(&self.source)
        } else {
            write!(f, "{} ({})", self.name, self.source)
        }
    }
}

/// A dependency declared by a package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDependency {
    pub id: String,
    #[serde(default)]
    pub range: VersionRange,
}

impl PackageDependency {
    #[must_use]
    pub fn new(id: impl Into<String>, range: VersionRange) -> Self {
        Self {
            id: id.into(),
            range,
        }
    }
}

/// One available version of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub id: String,
    #[serde(
        serialize_with = "serialize_version",
        deserialize_with = "deserialize_version"
    )]
    pub version: Version,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<PackageDependency>,
}

impl PackageInfo {
    #[must_use]
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            dependencies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_dependency(mut self, id: impl Into<String>, range: VersionRange) -> Self {
        self.dependencies.push(PackageDependency::new(id, range));
        self
    }
}

fn serialize_version<S: Serializer>(version: &Version, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(version)
}

fn deserialize_version<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Version, D::Error> {
    let text = String::deserialize(deserializer)?;
    parse_version(&text).map_err(serde::de::Error::custom)
}

/// Failure while querying a constructed provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid package manifest {path}: {source}")]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Answers "what versions of package P are available".
#[async_trait]
pub trait PackageProvider: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// All known versions of `id` (case-insensitive). Unknown ids yield an empty list.
    async fn find_package(&self, id: &str) -> Result<Vec<PackageInfo>, ProviderError>;
}

/// Turns configured sources into providers.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn create(
        &self,
        source: &PackageSource,
    ) -> Result<Arc<dyn PackageProvider>, ProviderConstructionError>;
}

/// Provider backed by a fixed in-memory package list.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    name: String,
    packages: BTreeMap<String, Vec<PackageInfo>>,
    lookups: AtomicUsize,
}

impl InMemoryProvider {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a package version.
    #[must_use]
    pub fn with_package(mut self, package: PackageInfo) -> Self {
        self.add(package);
        self
    }

    pub fn add(&mut self, package: PackageInfo) {
        self.packages
            .entry(package.id.to_ascii_lowercase())
            .or_default()
            .push(package);
    }

    /// Number of `find_package` calls served.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PackageProvider for InMemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_package(&self, id: &str) -> Result<Vec<PackageInfo>, ProviderError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .packages
            .get(&id.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

/// Provider reading a folder feed: `<root>/<id>/<version>/<id>.json`.
#[derive(Debug, Clone)]
pub struct LocalFolderProvider {
    name: String,
    root: PathBuf,
}

impl LocalFolderProvider {
    #[must_use]
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    /// Path of the manifest for one package version.
    #[must_use]
    pub fn manifest_path(root: &Path, id: &str, version: &Version) -> PathBuf {
        let id = id.to_ascii_lowercase();
        root.join(&id)
            .join(version.to_string())
            .join(format!("{id}.json"))
    }

    /// Write a package manifest into a folder feed.
    ///
    /// # Errors
    /// Returns an error if the manifest cannot be written.
    pub fn publish(root: &Path, package: &PackageInfo) -> Result<PathBuf, ProviderError> {
        let path = Self::manifest_path(root, &package.id, &package.version);
        let json = serde_json::to_vec_pretty(package).map_err(|source| {
            ProviderError::InvalidManifest {
                path: path.clone(),
                source,
            }
        })?;
        depgraph_util::fs::atomic_write(&path, &json).map_err(|source| ProviderError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

#[async_trait]
impl PackageProvider for LocalFolderProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_package(&self, id: &str) -> Result<Vec<PackageInfo>, ProviderError> {
        let id = id.to_ascii_lowercase();
        let package_dir = self.root.join(&id);

        let mut entries = match tokio::fs::read_dir(&package_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ProviderError::Io {
                    path: package_dir,
                    source,
                })
            }
        };

        let mut found = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(ProviderError::Io {
                        path: package_dir,
                        source,
                    })
                }
            };

            let manifest = entry.path().join(format!("{id}.json"));
            let bytes = match tokio::fs::read(&manifest).await {
                Ok(bytes) => bytes,
                // Version directories without a manifest are partial extractions
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(ProviderError::Io {
                        path: manifest,
                        source,
                    })
                }
            };
            let info: PackageInfo = serde_json::from_slice(&bytes).map_err(|source| {
                ProviderError::InvalidManifest {
                    path: manifest.clone(),
                    source,
                }
            })?;
            found.push(info);
        }

        found.sort_by(|a, b| a.version.cmp(&b.version));
        debug!(source = %self.name, id = %id, versions = found.len(), "Read folder feed");
        Ok(found)
    }
}

/// Default factory: local directories become [`LocalFolderProvider`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedProviderFactory;

#[async_trait]
impl ProviderFactory for FeedProviderFactory {
    async fn create(
        &self,
        source: &PackageSource,
    ) -> Result<Arc<dyn PackageProvider>, ProviderConstructionError> {
        match source.location() {
            SourceLocation::Local(path) => match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => Ok(Arc::new(LocalFolderProvider::new(
                    source.name.clone(),
                    path,
                ))),
                Ok(_) => Err(ProviderConstructionError::Unreachable {
                    source_name: source.name.clone(),
                    reason: format!("{} is not a directory", path.display()),
                }),
                Err(e) => Err(ProviderConstructionError::Unreachable {
                    source_name: source.name.clone(),
                    reason: e.to_string(),
                }),
            },
            SourceLocation::Remote(url) => Err(ProviderConstructionError::Unsupported {
                source_name: source.name.clone(),
                scheme: url.scheme().to_string(),
            }),
        }
    }
}

/// Factory mapping source names to pre-built providers.
///
/// Counts how many providers it has handed out, which makes cache reuse
/// observable.
#[derive(Default)]
pub struct StaticProviderFactory {
    providers: HashMap<String, Arc<dyn PackageProvider>>,
    created: AtomicUsize,
}

impl StaticProviderFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the provider returned for sources named `name`.
    #[must_use]
    pub fn with_provider(
        mut self,
        name: impl Into<String>,
        provider: Arc<dyn PackageProvider>,
    ) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    /// Number of successful `create` calls.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderFactory for StaticProviderFactory {
    async fn create(
        &self,
        source: &PackageSource,
    ) -> Result<Arc<dyn PackageProvider>, ProviderConstructionError> {
        let provider = self.providers.get(&source.name).cloned().ok_or_else(|| {
            ProviderConstructionError::Unreachable {
                source_name: source.name.clone(),
                reason: "no provider registered".to_string(),
            }
        })?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn v(s: &str) -> Version {
        parse_version(s).unwrap()
    }

    #[test]
    fn test_source_location() {
        assert!(matches!(
            PackageSource::new("https://api.example.org/v3/index.json").location(),
            SourceLocation::Remote(_)
        ));
        assert!(PackageSource::new("/srv/feed").is_local());
        assert!(PackageSource::new("relative/feed").is_local());
        assert!(PackageSource::new(r"C:\feeds\local").is_local());
    }

    #[test]
    fn test_source_display() {
        assert_eq!(PackageSource::new("/srv/feed").to_string(), "/srv/feed");
        assert_eq!(
            PackageSource::named("corp", "/srv/feed").to_string(),
            "corp (/srv/feed)"
        );
    }

    #[test]
    fn test_source_deserialize_forms() {
        let sources: Vec<PackageSource> =
            serde_json::from_str(r#"["/srv/feed", {"name": "corp", "source": "/srv/corp"}]"#)
                .unwrap();
        assert_eq!(sources[0], PackageSource::new("/srv/feed"));
        assert_eq!(sources[1], PackageSource::named("corp", "/srv/corp"));
    }

    #[tokio::test]
    async fn test_in_memory_provider_case_insensitive() {
        let provider = InMemoryProvider::new("mem")
            .with_package(PackageInfo::new("PackageA", v("1.0.0")))
            .with_package(PackageInfo::new("packageA", v("2.0.0")));

        let found = provider.find_package("PACKAGEA").await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(provider.find_package("missing").await.unwrap().is_empty());
        assert_eq!(provider.lookups(), 2);
    }

    #[tokio::test]
    async fn test_local_folder_provider_reads_published_packages() {
        let dir = tempdir().unwrap();
        let dep = PackageInfo::new("PackageA", v("2.0.0"))
            .with_dependency("packageB", VersionRange::parse("[1.0, )").unwrap());
        LocalFolderProvider::publish(dir.path(), &PackageInfo::new("PackageA", v("1.0.0")))
            .unwrap();
        LocalFolderProvider::publish(dir.path(), &dep).unwrap();

        let provider = LocalFolderProvider::new("local", dir.path());
        let found = provider.find_package("packagea").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].version, v("1.0.0"));
        assert_eq!(found[1], dep);

        assert!(provider.find_package("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_folder_provider_rejects_bad_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken").join("1.0.0").join("broken.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let provider = LocalFolderProvider::new("local", dir.path());
        let err = provider.find_package("broken").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidManifest { .. }));
    }

    #[tokio::test]
    async fn test_feed_factory() {
        let dir = tempdir().unwrap();
        let factory = FeedProviderFactory;

        let local = PackageSource::new(dir.path().to_string_lossy());
        assert!(factory.create(&local).await.is_ok());

        let missing = PackageSource::new(dir.path().join("nope").to_string_lossy());
        let err = factory.create(&missing).await.err().unwrap();
        assert!(matches!(err, ProviderConstructionError::Unreachable { .. }));

        let remote = PackageSource::new("https://feed.example.org/index.json");
        let err = factory.create(&remote).await.err().unwrap();
        assert!(matches!(err, ProviderConstructionError::Unsupported { .. }));
    }
}
