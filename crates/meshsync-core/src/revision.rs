//! Revision tokens.
//!
//! A [`Revision`] identifies the content version of a single record, or the
//! aggregate version of every record under a parent key. Consumers compare
//! tokens to detect "nothing changed since I last asked".

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque revision token.
///
/// The empty token is reserved as the "unknown" sentinel returned by
/// revision lookups for parent keys the cache has never seen. The revision
/// index never stores it.
///
/// # Example
///
/// ```rust
/// use meshsync_core::Revision;
///
/// let r1 = Revision::new("rev-1");
/// let unknown = Revision::empty();
///
/// assert!(!r1.is_empty());
/// assert!(unknown.is_empty());
/// assert_eq!(r1, "rev-1");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Create a revision from a string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The "unknown" sentinel.
    #[must_use]
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Check if this is the sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Revision {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Revision {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<Revision> for String {
    fn from(r: Revision) -> Self {
        r.0
    }
}

impl AsRef<str> for Revision {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Revision {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Revision {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
