//! Registry of caches keyed by resource type.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use meshsync_cache::{CacheConfig, CacheStats, RefreshOutcome, ResourceCache};
use meshsync_core::{ResourceKind, ResourceType, SyncError, SyncResult};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::metrics::{RefreshTimer, SyncMetrics};
use crate::scheduler::{RefreshScheduler, SchedulerSummary};
use crate::shutdown::ShutdownController;

/// Type-erased view of a cache, as driven by the runtime.
///
/// Implemented for every [`ResourceCache`].
#[async_trait]
pub trait ManagedCache: Send + Sync {
    /// Resource type served by the cache.
    fn resource_type(&self) -> &ResourceType;

    /// Configuration the cache was initialized with.
    fn config(&self) -> &CacheConfig;

    /// Run one refresh cycle from the cache's own cursor.
    async fn refresh(&self) -> SyncResult<RefreshOutcome>;

    /// Clear the cache and force a full reload.
    fn reset(&self);

    /// `true` until the cache completes a cycle.
    fn is_first_load(&self) -> bool;

    /// Number of records held.
    fn record_count(&self) -> usize;

    /// Number of parent revisions held.
    fn revision_count(&self) -> usize;

    /// Cache statistics.
    fn stats(&self) -> &CacheStats;
}

#[async_trait]
impl<K: ResourceKind> ManagedCache for ResourceCache<K> {
    fn resource_type(&self) -> &ResourceType {
        ResourceCache::resource_type(self)
    }

    fn config(&self) -> &CacheConfig {
        ResourceCache::config(self)
    }

    async fn refresh(&self) -> SyncResult<RefreshOutcome> {
        ResourceCache::refresh(self).await
    }

    fn reset(&self) {
        ResourceCache::reset(self)
    }

    fn is_first_load(&self) -> bool {
        ResourceCache::is_first_load(self)
    }

    fn record_count(&self) -> usize {
        self.count()
    }

    fn revision_count(&self) -> usize {
        self.parent_revision_count()
    }

    fn stats(&self) -> &CacheStats {
        ResourceCache::stats(self)
    }
}

/// Caches of one control plane, one per resource type.
///
/// `DashMap` references are never held across an `.await`: operations that
/// refresh caches clone the `Arc`s out first.
#[derive(Default)]
pub struct CacheManager {
    caches: DashMap<ResourceType, Arc<dyn ManagedCache>>,
    metrics: SyncMetrics,
}

impl CacheManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty manager reporting to `metrics`.
    pub fn with_metrics(metrics: SyncMetrics) -> Self {
        Self {
            caches: DashMap::new(),
            metrics,
        }
    }

    /// Metrics shared by every cache of this manager.
    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    /// Register a cache. Fails if its resource type is already registered.
    pub fn register(&self, cache: Arc<dyn ManagedCache>) -> SyncResult<()> {
        let resource = cache.resource_type().clone();
        match self.caches.entry(resource) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Err(SyncError::Configuration(
                format!("resource type {} registered twice", entry.key()),
            )),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                debug!(resource = %entry.key(), "registered cache");
                entry.insert(cache);
                Ok(())
            }
        }
    }

    /// Remove a cache. Its refresh loop, if any, keeps running until shutdown.
    pub fn unregister(&self, resource: &ResourceType) -> Option<Arc<dyn ManagedCache>> {
        self.caches.remove(resource).map(|(_, cache)| cache)
    }

    /// Get the cache for a resource type.
    pub fn get(&self, resource: &ResourceType) -> Option<Arc<dyn ManagedCache>> {
        self.caches.get(resource).map(|r| Arc::clone(r.value()))
    }

    /// Registered resource types, sorted.
    pub fn resources(&self) -> Vec<ResourceType> {
        let mut resources: Vec<_> = self.caches.iter().map(|r| r.key().clone()).collect();
        resources.sort();
        resources
    }

    /// Number of registered caches.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// Check if no cache is registered.
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn ManagedCache>> {
        self.caches.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Refresh every cache concurrently, once.
    ///
    /// Results are sorted by resource type. A failure of one cache does not
    /// affect the others.
    pub async fn refresh_all(&self) -> Vec<(ResourceType, SyncResult<RefreshOutcome>)> {
        let caches = self.snapshot();
        let cycles = caches.iter().map(|cache| {
            let metrics = self.metrics.clone();
            async move {
                let timer = RefreshTimer::start(metrics);
                let result = cache.refresh().await;
                timer.finish(cache.as_ref(), &result);
                (cache.resource_type().clone(), result)
            }
        });

        let mut results = join_all(cycles).await;
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// `true` once every registered cache has completed its first load.
    ///
    /// A manager with no caches is ready.
    pub fn is_ready(&self) -> bool {
        self.caches.iter().all(|r| !r.value().is_first_load())
    }

    /// Resource types still waiting for their first load.
    pub fn pending(&self) -> Vec<ResourceType> {
        let mut pending: Vec<_> = self
            .caches
            .iter()
            .filter(|r| r.value().is_first_load())
            .map(|r| r.key().clone())
            .collect();
        pending.sort();
        pending
    }

    /// Start one refresh loop per registered cache.
    pub fn spawn_all(&self, shutdown: &ShutdownController) -> Vec<JoinHandle<SchedulerSummary>> {
        let caches = self.snapshot();
        info!(caches = caches.len(), "starting refresh loops");
        caches
            .into_iter()
            .map(|cache| {
                let scheduler = RefreshScheduler::new(cache).with_metrics(self.metrics.clone());
                tokio::spawn(scheduler.run(shutdown.clone()))
            })
            .collect()
    }

    /// Reset every cache.
    pub fn reset_all(&self) {
        for cache in self.snapshot() {
            let was_ready = !cache.is_first_load();
            cache.reset();
            if was_ready {
                self.metrics.cache_reset(cache.resource_type().as_str());
            }
        }
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("resources", &self.resources())
            .finish()
    }
}
