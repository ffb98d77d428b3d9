//! Per-session restore state.
//!
//! One [`CacheContext`] lives for one restore call. It carries the logger,
//! the effective settings and a memo of package metadata already fetched,
//! so projects restored in the same session never ask a provider about the
//! same package twice.

use super::settings::SettingsProvider;
use super::source::{PackageInfo, PackageProvider, ProviderError};
use super::summary::{MessageLevel, RestoreMessage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::{error, warn};

/// Collects restore messages and forwards them to `tracing`.
#[derive(Debug, Default)]
pub struct RestoreLogger {
    messages: Mutex<Vec<RestoreMessage>>,
}

impl RestoreLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn messages(&self) -> MutexGuard<'_, Vec<RestoreMessage>> {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn log(&self, message: RestoreMessage) {
        let project = message.project.as_deref().unwrap_or("-");
        match message.level {
            MessageLevel::Error => {
                error!(project, code = %message.code, "{}", message.message);
            }
            MessageLevel::Warning => {
                warn!(project, code = %message.code, "{}", message.message);
            }
        }
        self.messages().push(message);
    }

    #[must_use]
    pub fn errors(&self) -> usize {
        self.count(MessageLevel::Error)
    }

    #[must_use]
    pub fn warnings(&self) -> usize {
        self.count(MessageLevel::Warning)
    }

    fn count(&self, level: MessageLevel) -> usize {
        self.messages().iter().filter(|m| m.level == level).count()
    }

    /// Snapshot of every message logged so far.
    #[must_use]
    pub fn entries(&self) -> Vec<RestoreMessage> {
        self.messages().clone()
    }
}

type MetadataCell = Arc<OnceCell<Arc<Vec<PackageInfo>>>>;

/// Provider identity plus lowercase package id.
///
/// Providers are told apart by allocation, not by name: two feeds may share
/// a display name while pointing at different locations.
type MetadataKey = (usize, String);

/// A memo slot. Holding the provider keeps its address from being reused
/// by another provider while the session lives.
struct MetadataEntry {
    _provider: Arc<dyn PackageProvider>,
    cell: MetadataCell,
}

fn provider_identity(provider: &Arc<dyn PackageProvider>) -> usize {
    Arc::as_ptr(provider).cast::<()>() as usize
}

/// Scope shared by every project restored in one session.
pub struct CacheContext {
    logger: RestoreLogger,
    settings: Arc<dyn SettingsProvider>,
    max_parallelism: Option<usize>,
    metadata: Mutex<HashMap<MetadataKey, MetadataEntry>>,
    fetches: AtomicUsize,
}

impl CacheContext {
    #[must_use]
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        let max_parallelism = settings.max_parallelism();
        Self {
            logger: RestoreLogger::new(),
            settings,
            max_parallelism,
            metadata: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Cap the number of projects restored at once. Zero is treated as one.
    #[must_use]
    pub fn with_max_parallelism(mut self, max: usize) -> Self {
        self.max_parallelism = Some(max.max(1));
        self
    }

    #[must_use]
    pub fn logger(&self) -> &RestoreLogger {
        &self.logger
    }

    #[must_use]
    pub fn settings(&self) -> &dyn SettingsProvider {
        self.settings.as_ref()
    }

    #[must_use]
    pub fn max_parallelism(&self) -> Option<usize> {
        self.max_parallelism
    }

    /// Versions of `id` known to `provider`, fetched at most once per session.
    ///
    /// Concurrent callers for the same pair wait for the first fetch. A
    /// failed fetch is not memoized.
    pub async fn find_package(
        &self,
        provider: &Arc<dyn PackageProvider>,
        id: &str,
    ) -> Result<Arc<Vec<PackageInfo>>, ProviderError> {
        let key = (provider_identity(provider), id.to_ascii_lowercase());
        let cell = {
            let mut metadata = self
                .metadata
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let entry = metadata.entry(key).or_insert_with(|| MetadataEntry {
                _provider: Arc::clone(provider),
                cell: MetadataCell::default(),
            });
            Arc::clone(&entry.cell)
        };

        cell.get_or_try_init(|| async {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            provider.find_package(id).await.map(Arc::new)
        })
        .await
        .cloned()
    }

    /// Number of provider queries issued in this session.
    #[must_use]
    pub fn metadata_fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheContext")
            .field("max_parallelism", &self.max_parallelism)
            .field("metadata_fetches", &self.metadata_fetches())
            .finish_non_exhaustive()
    }
}
