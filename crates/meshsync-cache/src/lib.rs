//! # meshsync-cache
//!
//! Incrementally synchronized in-memory caches of store-backed resources.
//!
//! This crate provides the cache engine used by meshsync control planes:
//!
//! - [`ResourceCache`] - per-resource-type cache with refresh cycle and queries
//! - [`RecordIndex`] - identity -> record mapping with a parent grouping
//! - [`RevisionIndex`] - parent key -> latest aggregate revision
//! - [`Cursor`] - high-water mark bounding incremental fetches
//! - [`CacheConfig`] - validated per-cache settings
//!
//! ## Key Design Decisions
//!
//! - A whole batch is decoded before any lock is taken, then applied in one
//!   exclusive step, so readers never see half a batch
//! - No lock is held across a store round trip
//! - The index is either mutated under a lock or published as an immutable
//!   snapshot, selected per cache with [`IndexMode`]
//! - A reset racing a refresh drops the in-flight batch
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use meshsync_cache::{CacheConfig, ResourceCache};
//!
//! let cache = ResourceCache::<RateLimitKind>::initialize(CacheConfig::default(), Arc::new(store))?;
//!
//! // Full load, then deltas on each call.
//! cache.refresh().await?;
//!
//! let rules = cache.get_by_parent("service-1");
//! let revision = cache.get_last_revision("service-1");
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod cell;
mod config;
mod cursor;
mod index;
#[cfg(any(test, feature = "test-util"))]
mod memory;
mod revision;
mod stats;

pub use cache::{RefreshOutcome, RefreshSummary, ResourceCache};
pub use config::{CacheConfig, IndexMode, RetryPolicy};
pub use cursor::Cursor;
pub use index::{Change, IndexViolation, RecordIndex, SharedRecord};
#[cfg(any(test, feature = "test-util"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub use memory::{FetchCall, MemorySource};
pub use revision::RevisionIndex;
pub use stats::CacheStats;
