//! # meshsync-runtime
//!
//! Runs meshsync caches: refresh loops, a cache registry, metrics and
//! graceful shutdown.
//!
//! - [`CacheManager`] - caches keyed by resource type, refreshed together
//! - [`RefreshScheduler`] - interval-driven refresh loop with retry backoff
//! - [`SyncMetrics`] - counters, gauges and histograms via the `metrics` facade
//! - [`ShutdownController`] - stops loops and waits for in-flight cycles
//! - [`RuntimeConfig`] - per-resource cache settings loaded from JSON
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use meshsync_runtime::{CacheManager, RuntimeConfig, ShutdownController};
//!
//! let config = RuntimeConfig::from_path("meshsync.json")?;
//! let manager = CacheManager::new();
//! manager.register(Arc::new(rate_limits))?;
//!
//! let shutdown = ShutdownController::new();
//! let loops = manager.spawn_all(&shutdown);
//!
//! meshsync_runtime::wait_for_signal().await?;
//! shutdown.shutdown(config.shutdown.grace_period).await;
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod manager;
mod metrics;
mod scheduler;
mod shutdown;

pub use config::{RuntimeConfig, ShutdownConfig};
pub use manager::{CacheManager, ManagedCache};
pub use metrics::{RefreshTimer, SyncMetrics};
pub use scheduler::{RefreshScheduler, SchedulerSummary};
pub use shutdown::{wait_for_signal, CycleGuard, ShutdownController, ShutdownSignal};
