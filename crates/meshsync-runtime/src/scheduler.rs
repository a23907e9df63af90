//! Background refresh loop for one cache.

use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::manager::ManagedCache;
use crate::metrics::{RefreshTimer, SyncMetrics};
use crate::shutdown::ShutdownController;

/// Counters returned when a refresh loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    /// Cycles run.
    pub cycles: u64,
    /// Cycles that failed.
    pub failures: u64,
}

/// Drives a cache's refresh cycle on its configured interval.
///
/// Ticks that fall behind are skipped, never bunched. After a failed cycle
/// the next one waits [`RetryPolicy::delay_for_attempt`] for the number of
/// consecutive failures; a successful cycle returns to the plain interval.
///
/// [`RetryPolicy::delay_for_attempt`]: meshsync_cache::RetryPolicy::delay_for_attempt
pub struct RefreshScheduler {
    cache: Arc<dyn ManagedCache>,
    metrics: SyncMetrics,
}

impl RefreshScheduler {
    /// Create a scheduler for `cache`.
    pub fn new(cache: Arc<dyn ManagedCache>) -> Self {
        Self {
            cache,
            metrics: SyncMetrics::new(),
        }
    }

    /// Report cycles to `metrics`.
    pub fn with_metrics(mut self, metrics: SyncMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Run until `shutdown` is signalled.
    ///
    /// The first cycle starts immediately.
    pub async fn run(self, shutdown: ShutdownController) -> SchedulerSummary {
        let resource = self.cache.resource_type().clone();
        let config = self.cache.config().clone();
        let mut ticker = interval(config.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let stop = shutdown.shutdown_signal().wait();
        tokio::pin!(stop);

        let mut summary = SchedulerSummary::default();
        let mut consecutive_failures = 0u32;
        info!(resource = %resource, interval = ?config.refresh_interval, "refresh loop started");

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = ticker.tick() => {}
            }

            let result = {
                let _cycle = shutdown.begin_cycle();
                let timer = RefreshTimer::start(self.metrics.clone());
                let result = self.cache.refresh().await;
                timer.finish(self.cache.as_ref(), &result);
                result
            };
            summary.cycles += 1;

            match result {
                Ok(outcome) => {
                    if consecutive_failures > 0 {
                        info!(
                            resource = %resource,
                            failures = consecutive_failures,
                            "store reachable again"
                        );
                    }
                    consecutive_failures = 0;
                    debug!(resource = %resource, outcome = outcome.as_str(), "cycle finished");
                }
                Err(err) => {
                    summary.failures += 1;
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    let delay = config
                        .retry
                        .delay_for_attempt(consecutive_failures, config.refresh_interval);
                    warn!(
                        resource = %resource,
                        error = %err,
                        retryable = err.is_retryable(),
                        failures = consecutive_failures,
                        retry_in = ?delay,
                        "refresh failed"
                    );
                    ticker.reset_after(delay);
                }
            }
        }

        info!(
            resource = %resource,
            cycles = summary.cycles,
            failures = summary.failures,
            "refresh loop stopped"
        );
        summary
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("resource", self.cache.resource_type())
            .finish()
    }
}
