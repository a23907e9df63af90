//! Store-assigned timestamps.
//!
//! Modification times and cursors are whole seconds since the Unix epoch as
//! reported by the backing store's clock. The local wall clock never feeds
//! into a [`Timestamp`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Seconds-resolution timestamp taken from the store clock.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use meshsync_core::Timestamp;
///
/// let t = Timestamp::from_secs(100);
/// assert_eq!(t.saturating_sub(Duration::from_secs(30)).as_secs(), 70);
/// assert_eq!(Timestamp::ZERO.saturating_sub(Duration::from_secs(30)), Timestamp::ZERO);
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The epoch. Initial cursor value.
    pub const ZERO: Self = Self(0);

    /// Create a timestamp from Unix seconds.
    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Unix seconds.
    #[must_use]
    pub const fn as_secs(&self) -> i64 {
        self.0
    }

    /// Move back by `window`, clamping at [`Timestamp::ZERO`].
    #[must_use]
    pub fn saturating_sub(self, window: Duration) -> Self {
        let secs = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(secs).max(0))
    }

    /// Move forward by `window`.
    #[must_use]
    pub fn saturating_add(self, window: Duration) -> Self {
        let secs = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(secs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Timestamp {
    fn from(secs: i64) -> Self {
        Self(secs)
    }
}
