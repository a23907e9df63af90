//! Error types for cache synchronization.
//!
//! [`SyncError`] covers every failure a refresh cycle or a query can report.
//! [`DecodeError`] is returned by [`ResourceKind::decode`](crate::ResourceKind::decode)
//! and surfaces as [`SyncError::MalformedRecord`] when a cycle skips a record.

use std::time::Duration;

use crate::ResourceType;

/// Boxed error used at the store boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error taxonomy for refresh cycles and cache queries.
///
/// Refresh failures are local to one cycle of one resource type. They are
/// returned to the scheduler and never reach reader call sites.
///
/// # Example
///
/// ```rust
/// use meshsync_core::{ResourceType, SyncError};
///
/// let err = SyncError::store_unavailable(
///     ResourceType::new(ResourceType::RATE_LIMIT),
///     "connection refused",
///     std::io::Error::other("refused"),
/// );
/// assert!(err.is_retryable());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The store call failed (network, store-side error).
    #[error("store unavailable for {resource}: {message}")]
    StoreUnavailable {
        /// Resource type whose cycle failed.
        resource: ResourceType,
        /// Description of the failed call.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// A store call exceeded the configured request timeout.
    #[error("{operation} for {resource} timed out after {elapsed:?}")]
    Timeout {
        /// Resource type whose cycle failed.
        resource: ResourceType,
        /// The store operation that timed out.
        operation: &'static str,
        /// The timeout that elapsed.
        elapsed: Duration,
    },

    /// A record payload could not be decoded.
    #[error("malformed {resource} record {id}: {source}")]
    MalformedRecord {
        /// Resource type of the record.
        resource: ResourceType,
        /// Identity of the skipped record.
        id: String,
        /// Decoding failure.
        #[source]
        source: DecodeError,
    },

    /// Index bookkeeping disagreed with the primary mapping.
    #[error("index invariant violated for {resource} record {id}: {reason}")]
    InvariantViolation {
        /// Resource type of the index.
        resource: ResourceType,
        /// Identity of the affected entry.
        id: String,
        /// What was inconsistent.
        reason: String,
    },

    /// A query was rejected before touching the index.
    #[error("invalid {resource} query: {reason}")]
    InvalidQuery {
        /// Resource type being queried.
        resource: ResourceType,
        /// Why the query was rejected.
        reason: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unexpected internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<BoxError>,
    },
}

impl SyncError {
    /// Create a store-unavailable error from any error type.
    pub fn store_unavailable<E>(
        resource: ResourceType,
        message: impl Into<String>,
        source: E,
    ) -> Self
    where
        E: Into<BoxError>,
    {
        Self::StoreUnavailable {
            resource,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create an internal error from any error type.
    pub fn internal<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid-query error.
    pub fn invalid_query(resource: ResourceType, reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            resource,
            reason: reason.into(),
        }
    }

    /// Whether the next scheduled cycle may succeed without intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. } | Self::Timeout { .. })
    }

    /// Resource type the error belongs to, if any.
    #[must_use]
    pub fn resource(&self) -> Option<&ResourceType> {
        match self {
            Self::StoreUnavailable { resource, .. }
            | Self::Timeout { resource, .. }
            | Self::MalformedRecord { resource, .. }
            | Self::InvariantViolation { resource, .. }
            | Self::InvalidQuery { resource, .. } => Some(resource),
            Self::Configuration(_) | Self::Internal { .. } => None,
        }
    }
}

/// Failure to turn a raw store payload into its decoded form.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload text is not valid in its wire format.
    #[error("invalid {format} payload: {source}")]
    Format {
        /// Name of the format, e.g. `json`.
        format: &'static str,
        /// Parser error.
        #[source]
        source: BoxError,
    },

    /// A required field is absent or empty.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// The payload parsed but holds an unusable value.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// Why it is unusable.
        reason: String,
    },
}

impl DecodeError {
    /// Create a format error from a parser error.
    pub fn format<E>(format: &'static str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Format {
            format,
            source: source.into(),
        }
    }
}
