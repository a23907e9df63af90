//! Prometheus-style metrics for cache synchronization.
//!
//! Everything goes through the `metrics` facade; without an installed
//! recorder the calls are no-ops.
//!
//! - Refresh counters per resource type and outcome
//! - Refresh duration histograms
//! - Record and revision gauges
//! - Malformed record counters
//!
//! # Example
//!
//! ```rust,ignore
//! use meshsync_runtime::{RefreshTimer, SyncMetrics};
//!
//! let metrics = SyncMetrics::new();
//! let timer = RefreshTimer::start(metrics.clone());
//! let result = cache.refresh().await;
//! timer.finish(cache.as_ref(), &result);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use meshsync_cache::RefreshOutcome;
use meshsync_core::SyncResult;
use metrics::{counter, gauge, histogram};

use crate::manager::ManagedCache;

/// Metrics for cache synchronization.
#[derive(Debug, Clone)]
pub struct SyncMetrics {
    inner: Arc<SyncMetricsInner>,
}

#[derive(Debug)]
struct SyncMetricsInner {
    /// Caches that completed their first load.
    ready_caches: AtomicU64,
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SyncMetricsInner {
                ready_caches: AtomicU64::new(0),
            }),
        }
    }

    /// Record a finished refresh cycle.
    pub fn record_refresh(&self, resource: &str, outcome: &'static str, duration: Duration) {
        counter!(
            "meshsync_refresh_total",
            "resource" => resource.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!("meshsync_refresh_duration_seconds", "resource" => resource.to_string())
            .record(duration.as_secs_f64());
    }

    /// Record skipped malformed records.
    pub fn record_malformed(&self, resource: &str, count: usize) {
        if count > 0 {
            counter!("meshsync_malformed_records_total", "resource" => resource.to_string())
                .increment(count as u64);
        }
    }

    /// Publish the current cache population.
    pub fn record_population(&self, resource: &str, records: usize, revisions: usize) {
        gauge!("meshsync_records", "resource" => resource.to_string()).set(records as f64);
        gauge!("meshsync_revisions", "resource" => resource.to_string()).set(revisions as f64);
    }

    /// Record a cache completing its first load.
    pub fn cache_ready(&self, resource: &str) {
        let count = self.inner.ready_caches.fetch_add(1, Ordering::Relaxed) + 1;
        counter!("meshsync_first_loads_total", "resource" => resource.to_string()).increment(1);
        gauge!("meshsync_ready_caches").set(count as f64);
    }

    /// Record a cache going back to first-load state.
    pub fn cache_reset(&self, resource: &str) {
        let previous = self
            .inner
            .ready_caches
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .unwrap_or(0);
        counter!("meshsync_resets_total", "resource" => resource.to_string()).increment(1);
        gauge!("meshsync_ready_caches").set(previous.saturating_sub(1) as f64);
    }

    /// Caches that completed their first load.
    pub fn ready_caches(&self) -> u64 {
        self.inner.ready_caches.load(Ordering::Relaxed)
    }
}

/// Timer for one refresh cycle.
#[derive(Debug)]
pub struct RefreshTimer {
    start: Instant,
    metrics: SyncMetrics,
}

impl RefreshTimer {
    /// Start timing a cycle.
    pub fn start(metrics: SyncMetrics) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    /// Finish the timer and record the cycle.
    pub fn finish(self, cache: &dyn ManagedCache, result: &SyncResult<RefreshOutcome>) {
        let resource = cache.resource_type().as_str();
        let outcome = match result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "failed",
        };
        self.metrics
            .record_refresh(resource, outcome, self.start.elapsed());

        if let Ok(outcome) = result {
            if let RefreshOutcome::Applied(summary) = outcome {
                self.metrics.record_malformed(resource, summary.malformed);
            }
            if outcome.completed_first_load() {
                self.metrics.cache_ready(resource);
            }
        }
        self.metrics
            .record_population(resource, cache.record_count(), cache.revision_count());
    }
}
