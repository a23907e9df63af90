//! # meshsync
//!
//! Incremental cache synchronization for service-mesh control planes.
//!
//! A control plane node keeps an in-memory copy of rows from a shared store
//! (rate-limit rules, clients, config groups and so on). This crate keeps
//! those copies current by polling the store for rows changed since a
//! cursor, merging them into per-type indexes grouped by a parent key, and
//! serving lookups without touching the store.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use meshsync::prelude::*;
//!
//! // A store adapter implementing ChangeSource<RateLimitKind>
//! let source = Arc::new(SqlRateLimits::new(pool));
//!
//! let rate_limits = RateLimitCache::initialize(CacheConfig::new(), source)?;
//!
//! let manager = CacheManager::new();
//! manager.register(rate_limits.cache().clone())?;
//!
//! let shutdown = ShutdownController::new();
//! let loops = manager.spawn_all(&shutdown);
//!
//! let rules = rate_limits.rules_for_service("service-1");
//! let revision = rate_limits.last_revision("service-1");
//! ```
//!
//! ## Architecture
//!
//! - `meshsync-core` - records, revisions, timestamps, errors and the
//!   [`ChangeSource`](core::ChangeSource) store boundary
//! - `meshsync-cache` - the generic [`ResourceCache`](cache::ResourceCache):
//!   record index, revision index, cursor and the refresh cycle
//! - `meshsync-runtime` - refresh loops, cache registry, metrics, shutdown
//! - `meshsync-resources` - rate-limit, client and config-group caches
//!
//! This crate re-exports all public APIs for convenience.
//!
//! ## Design Principles
//!
//! 1. **No panics in library code** - all errors are returned as `Result`
//! 2. **No locks held across await points** - store calls run unlocked
//! 3. **Readers never see a half-applied batch** - one write per cycle
//! 4. **Observable** - `tracing` spans and `metrics` counters throughout
//!
//! ## Features
//!
//! - `test-util` - the scripted in-memory [`MemorySource`](cache::MemorySource)

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use meshsync_cache as cache;
pub use meshsync_core as core;
pub use meshsync_resources as resources;
pub use meshsync_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use meshsync::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Core types
    pub use meshsync_core::{
        ChangeSource, DecodeError, FetchBatch, RawRecord, Record, ResourceKind, ResourceType,
        Revision, RevisionRecord, SyncError, SyncResult, Timestamp,
    };

    // Cache types
    pub use meshsync_cache::{
        CacheConfig, CacheStats, IndexMode, RefreshOutcome, ResourceCache, RetryPolicy,
        SharedRecord,
    };

    // Runtime types
    pub use meshsync_runtime::{
        CacheManager, ManagedCache, RuntimeConfig, ShutdownController, SyncMetrics,
    };

    // Resource caches
    pub use meshsync_resources::{ClientCache, ConfigGroupCache, Page, RateLimitCache};
}

/// Version information for this crate.
pub mod version {
    /// Crate version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Minimum supported Rust version.
    pub const MSRV: &str = "1.75";

    /// Get version info as a string.
    pub fn version_string() -> String {
        format!("meshsync {} (MSRV {})", VERSION, MSRV)
    }
}
