//! # meshsync-core
//!
//! Core types, traits, and error handling for the meshsync cache engine.
//!
//! This crate provides the foundational types used across all other meshsync crates:
//!
//! - [`SyncError`] - Error taxonomy for refresh cycles and queries
//! - [`Revision`] - Opaque revision tokens for records and parent keys
//! - [`Timestamp`] - Store-assigned modification times (seconds resolution)
//! - [`ResourceType`] - Identifier of a synchronized resource category
//! - [`ResourceKind`] - Trait describing one resource type (raw row, decoded payload)
//! - [`ChangeSource`] - Trait for the backing store's "changed since" query
//!
//! ## Example
//!
//! ```rust
//! use meshsync_core::{RawRecord, Revision, Timestamp};
//!
//! let record = RawRecord::new("rule-1", "service-1", "{}".to_string())
//!     .with_modify_time(Timestamp::from_secs(100))
//!     .with_revision("rev-1");
//!
//! assert!(record.valid);
//! assert_eq!(record.revision, Revision::new("rev-1"));
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod record;
mod resource;
mod resource_type;
mod revision;
mod timestamp;

pub use error::{BoxError, DecodeError, SyncError};
pub use record::{FetchBatch, RawRecord, Record, RevisionRecord};
pub use resource::{ChangeSource, ResourceKind};
pub use resource_type::ResourceType;
pub use revision::Revision;
pub use timestamp::Timestamp;

/// Result type alias using [`SyncError`].
pub type SyncResult<T> = std::result::Result<T, SyncError>;
