//! The install-and-serve worker.
//!
//! [`Worker`] is the event interface a host dispatches to: one install event
//! per lifecycle, one fetch event per intercepted request.
//! [`CacheFirstWorker`] pre-caches a configured asset list on install and
//! answers fetches cache-first with network fallback, never writing
//! network responses back into the cache.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};

use crate::cache::{Cache, CacheStorage};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::request::Request;
use crate::response::Response;
use crate::stats::{InstallStats, InstallStatsBuilder};

/// Event handlers a host dispatches lifecycle and fetch events to.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Handles the install event. The host does not activate the worker
    /// until the returned future resolves to `Ok`.
    async fn on_install(&self) -> Result<InstallStats>;

    /// Handles a fetch event for an intercepted request.
    async fn on_fetch(&self, request: &Request) -> Result<FetchOutcome>;
}

/// Where a fetch event's response came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Served verbatim from the named cache.
    Cache(Response),
    /// Fetched live from the network.
    Network(Response),
}

impl FetchOutcome {
    /// Returns true if the response was served from the cache.
    #[must_use]
    pub const fn is_cache_hit(&self) -> bool {
        matches!(self, Self::Cache(_))
    }

    /// Borrows the response.
    #[must_use]
    pub const fn response(&self) -> &Response {
        match self {
            Self::Cache(r) | Self::Network(r) => r,
        }
    }

    /// Takes the response.
    #[must_use]
    pub fn into_response(self) -> Response {
        match self {
            Self::Cache(r) | Self::Network(r) => r,
        }
    }
}

/// Trait for receiving install progress updates.
///
/// All methods have default no-op implementations for convenience.
pub trait InstallProgress: Send + Sync {
    /// Called once before any asset is fetched.
    fn on_install_start(&self, _cache_name: &str, _assets: usize) {}

    /// Called when an asset fetch starts.
    fn on_asset_start(&self, _url: &str) {}

    /// Called when an asset was fetched and accepted for storage.
    fn on_asset_fetched(&self, _url: &str, _bytes: u64) {}

    /// Called when an asset fetch fails; the install fails with it.
    fn on_asset_error(&self, _url: &str, _error: &str) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl InstallProgress for NoProgress {}

/// Worker that pre-caches on install and serves cache-first.
pub struct CacheFirstWorker<S: CacheStorage, F: Fetcher> {
    config: WorkerConfig,
    storage: S,
    fetcher: F,
    progress: Arc<dyn InstallProgress>,
}

impl<S: CacheStorage, F: Fetcher> CacheFirstWorker<S, F> {
    /// Creates a worker over the given storage and network.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn new(config: WorkerConfig, storage: S, fetcher: F) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            storage,
            fetcher,
            progress: Arc::new(NoProgress),
        })
    }

    /// Replaces the install progress observer.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn InstallProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Returns the worker configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Returns the network collaborator.
    #[must_use]
    pub const fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Returns the cache storage.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Opens the worker's named cache, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot open the cache.
    pub async fn cache(&self) -> Result<S::Cache> {
        self.storage.open(&self.config.cache_name).await
    }

    /// Opens the named cache only if it already exists.
    async fn existing_cache(&self) -> Result<Option<S::Cache>> {
        if self.storage.has(&self.config.cache_name).await? {
            Ok(Some(self.cache().await?))
        } else {
            Ok(None)
        }
    }

    /// Fetches one asset for pre-caching, rejecting uncacheable responses.
    async fn fetch_asset(&self, request: Request) -> Result<(Request, Response)> {
        let url = request.url.to_string();
        self.progress.on_asset_start(&url);
        let result = self.fetcher.fetch(&request).await.and_then(|response| {
            if response.is_cacheable() {
                Ok(response)
            } else {
                Err(Error::Status {
                    url: url.clone(),
                    status: response.status,
                })
            }
        });
        match result {
            Ok(response) => {
                self.progress.on_asset_fetched(&url, response.len());
                Ok((request, response))
            }
            Err(e) => {
                self.progress.on_asset_error(&url, &e.to_string());
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<S: CacheStorage, F: Fetcher> Worker for CacheFirstWorker<S, F> {
    async fn on_install(&self) -> Result<InstallStats> {
        let requests = self.config.precache_requests()?;
        let cache_name = &self.config.cache_name;
        let mut stats = InstallStatsBuilder::new(cache_name.clone());
        log::info!("Installing: pre-caching {} asset(s) into {cache_name}", requests.len());
        self.progress.on_install_start(cache_name, requests.len());

        let cache = self.cache().await?;

        // Everything is fetched before anything is stored, so a failed
        // install writes nothing.
        let fetched: Vec<(Request, Response)> = stream::iter(requests)
            .map(|request| self.fetch_asset(request))
            .buffered(self.config.concurrent_fetches.max(1))
            .try_collect()
            .await
            .inspect_err(|e| log::error!("Install failed: {e}"))?;

        let entries = fetched
            .into_iter()
            .map(|(request, response)| {
                stats.add_asset(response.len());
                (request.key(), response)
            })
            .collect();
        cache.put_all(entries).await?;

        let stats = stats.build();
        log::info!(
            "Installed {} asset(s) ({} bytes) into {cache_name}",
            stats.assets_cached,
            stats.total_bytes
        );
        Ok(stats)
    }

    async fn on_fetch(&self, request: &Request) -> Result<FetchOutcome> {
        if let Some(cache) = self.existing_cache().await?
            && let Some(response) = cache.lookup(request).await?
        {
            log::debug!("Cache hit: {} {}", request.method, request.url);
            return Ok(FetchOutcome::Cache(response));
        }
        log::debug!("Cache miss: {} {}", request.method, request.url);
        self.fetcher.fetch(request).await.map(FetchOutcome::Network)
    }
}
