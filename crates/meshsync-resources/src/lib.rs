//! # meshsync-resources
//!
//! Ready-made resource kinds and query surfaces on top of `meshsync-cache`.
//!
//! | Cache | Parent key | Revisions |
//! |-------|-----------|-----------|
//! | [`RateLimitCache`] | service id | per service |
//! | [`ClientCache`] | client host | none |
//! | [`ConfigGroupCache`] | namespace | none |
//!
//! Each cache wraps an `Arc<ResourceCache<_>>`; refresh it through
//! [`cache()`](RateLimitCache::cache) or register that handle with a runtime
//! manager.

#![deny(unsafe_code)]

mod client;
mod config_group;
mod page;
mod ratelimit;

pub use client::{
    client_equals, Client, ClientCache, ClientKind, ClientRecord, ClientRow, ClientType, Location,
    StatInfo, CLIENT_FILTER_KEYS,
};
pub use config_group::{
    ConfigGroup, ConfigGroupCache, ConfigGroupKind, ConfigGroupRecord, ConfigGroupRow,
};
pub use page::{Page, MAX_PAGE_SIZE};
pub use ratelimit::{
    Amount, ArgumentType, Failover, LimitResource, LimitType, MatchArgument, MatchString,
    MatchType, RateLimit, RateLimitCache, RateLimitKind, RateLimitRecord, RateLimitRow,
    RateLimitRule,
};
