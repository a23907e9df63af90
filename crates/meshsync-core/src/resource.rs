//! Resource kinds and the store boundary.
//!
//! A [`ResourceKind`] describes one synchronized resource type: what the
//! store delivers ([`ResourceKind::Raw`]), what the cache serves
//! ([`ResourceKind::Payload`]) and how one becomes the other. A
//! [`ChangeSource`] is the backing store's per-type query surface.

use std::fmt;

use async_trait::async_trait;

use crate::{BoxError, DecodeError, FetchBatch, ResourceType, Timestamp};

/// Trait for synchronized resource types.
///
/// Implement this trait once per resource type; the cache engine is generic
/// over it.
///
/// # Example
///
/// ```rust
/// use meshsync_core::{DecodeError, ResourceKind};
///
/// #[derive(Debug)]
/// struct Weight(u32);
///
/// struct WeightKind;
///
/// impl ResourceKind for WeightKind {
///     const RESOURCE: &'static str = "weight";
///     type Raw = String;
///     type Payload = Weight;
///
///     fn decode(raw: String) -> Result<Weight, DecodeError> {
///         raw.parse()
///             .map(Weight)
///             .map_err(|e| DecodeError::format("decimal", e))
///     }
/// }
///
/// assert_eq!(WeightKind::resource_type().as_str(), "weight");
/// assert!(WeightKind::decode("x".to_string()).is_err());
/// ```
pub trait ResourceKind: Send + Sync + 'static {
    /// Name of the resource type.
    const RESOURCE: &'static str;

    /// Payload as delivered by the store.
    type Raw: Send + Sync + fmt::Debug + 'static;

    /// Payload as served by the cache.
    type Payload: Send + Sync + fmt::Debug + 'static;

    /// Decode a store payload. Only called for valid rows.
    fn decode(raw: Self::Raw) -> Result<Self::Payload, DecodeError>;

    /// The [`ResourceType`] for this kind.
    fn resource_type() -> ResourceType {
        ResourceType::new(Self::RESOURCE)
    }
}

/// The backing store's change feed for one resource type.
///
/// Implementations perform a single round trip per call; the cache applies
/// nothing from a call that returns an error.
#[async_trait]
pub trait ChangeSource<K: ResourceKind>: Send + Sync {
    /// Fetch rows changed since `cursor`.
    ///
    /// With `first_load` set, return the complete valid population and ignore
    /// the cursor. Otherwise return every row whose modification time is
    /// strictly greater than `cursor`, including invalid ones.
    async fn fetch_changed(
        &self,
        cursor: Timestamp,
        first_load: bool,
    ) -> Result<FetchBatch<K::Raw>, BoxError>;

    /// Current time on the store clock.
    async fn server_unix_time(&self) -> Result<Timestamp, BoxError>;
}
