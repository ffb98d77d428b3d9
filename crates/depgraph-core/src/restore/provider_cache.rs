//! Process-wide cache of constructed package providers.
//!
//! Providers are keyed by the effective source tuple of a node. Each key
//! owns a `tokio::sync::OnceCell`: the first caller constructs, concurrent
//! callers for the same key await that construction and receive the same
//! `Arc`. Entries live until [`ProviderCache::clear`].

use super::error::ProviderConstructionError;
use super::source::{
    FeedProviderFactory, LocalFolderProvider, PackageProvider, PackageSource, ProviderFactory,
};
use super::spec::ProjectNode;
use futures::future::join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Identifies a set of providers: sorted sources plus the local folders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcesKey {
    sources: Vec<PackageSource>,
    packages_path: Option<PathBuf>,
    fallback_folders: Vec<PathBuf>,
}

impl SourcesKey {
    /// Sources are sorted and deduplicated; fallback folder order is kept.
    #[must_use]
    pub fn new(
        sources: &[PackageSource],
        packages_path: Option<PathBuf>,
        fallback_folders: Vec<PathBuf>,
    ) -> Self {
        let mut sources = sources.to_vec();
        sources.sort();
        sources.dedup();
        Self {
            sources,
            packages_path,
            fallback_folders,
        }
    }

    /// Key for a node's effective restore settings.
    #[must_use]
    pub fn for_node(node: &ProjectNode) -> Self {
        Self::new(
            &node.restore.sources,
            node.restore.packages_path.clone(),
            node.restore.fallback_folders.clone(),
        )
    }

    #[must_use]
    pub fn sources(&self) -> &[PackageSource] {
        &self.sources
    }
}

/// The providers used to restore one node.
pub struct RestoreProviders {
    /// Global packages folder and fallback folders, in lookup order.
    pub local: Vec<Arc<dyn PackageProvider>>,
    /// Configured sources that constructed successfully.
    pub remote: Vec<Arc<dyn PackageProvider>>,
    /// Sources that failed to construct.
    pub failures: Vec<ProviderConstructionError>,
}

impl RestoreProviders {
    /// All providers, local ones first.
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn PackageProvider>> {
        self.local.iter().chain(self.remote.iter())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }
}

impl std::fmt::Debug for RestoreProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |providers: &[Arc<dyn PackageProvider>]| -> Vec<String> {
            providers.iter().map(|p| p.name().to_string()).collect()
        };
        f.debug_struct("RestoreProviders")
            .field("local", &names(&self.local))
            .field("remote", &names(&self.remote))
            .field("failures", &self.failures)
            .finish()
    }
}

type Entry = Arc<OnceCell<Arc<RestoreProviders>>>;

/// Memoizes provider construction per [`SourcesKey`].
pub struct ProviderCache {
    factory: Arc<dyn ProviderFactory>,
    entries: Mutex<HashMap<SourcesKey, Entry>>,
    constructions: AtomicUsize,
}

impl ProviderCache {
    #[must_use]
    pub fn new(factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            factory,
            entries: Mutex::new(HashMap::new()),
            constructions: AtomicUsize::new(0),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SourcesKey, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Get the providers for `key`, constructing them on first use.
    pub async fn get_or_create(&self, key: &SourcesKey) -> Arc<RestoreProviders> {
        let cell = Arc::clone(self.entries().entry(key.clone()).or_default());

        let providers = cell
            .get_or_init(|| async {
                self.constructions.fetch_add(1, Ordering::SeqCst);
                Arc::new(self.construct(key).await)
            })
            .await;
        Arc::clone(providers)
    }

    async fn construct(&self, key: &SourcesKey) -> RestoreProviders {
        let mut local: Vec<Arc<dyn PackageProvider>> = Vec::new();
        let folders = key.packages_path.iter().chain(key.fallback_folders.iter());
        for folder in folders {
            if tokio::fs::metadata(folder)
                .await
                .is_ok_and(|meta| meta.is_dir())
            {
                local.push(Arc::new(LocalFolderProvider::new(
                    folder.to_string_lossy(),
                    folder.clone(),
                )));
            }
        }

        let created = join_all(key.sources.iter().map(|s| self.factory.create(s))).await;
        let mut remote = Vec::new();
        let mut failures = Vec::new();
        for result in created {
            match result {
                Ok(provider) => remote.push(provider),
                Err(e) => {
                    warn!(code = e.code(), "{e}");
                    failures.push(e);
                }
            }
        }

        debug!(
            local = local.len(),
            remote = remote.len(),
            failed = failures.len(),
            "Constructed providers"
        );
        RestoreProviders {
            local,
            remote,
            failures,
        }
    }

    /// Number of provider sets constructed since creation or the last clear.
    #[must_use]
    pub fn construction_count(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries().clear();
        self.constructions.store(0, Ordering::SeqCst);
    }
}

impl Default for ProviderCache {
    fn default() -> Self {
        Self::new(Arc::new(FeedProviderFactory))
    }
}

impl std::fmt::Debug for ProviderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCache")
            .field("entries", &self.len())
            .field("constructions", &self.construction_count())
            .finish_non_exhaustive()
    }
}
