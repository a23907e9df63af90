//! Resource type identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a synchronized resource category.
///
/// Each resource type owns one independent cache instance. The identifier
/// keys cache registries, per-resource configuration and metric labels.
///
/// # Example
///
/// ```rust
/// use meshsync_core::ResourceType;
///
/// let rt = ResourceType::new(ResourceType::RATE_LIMIT);
/// assert_eq!(rt.as_str(), "ratelimit");
/// assert!(rt.is_builtin());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(String);

impl ResourceType {
    /// Rate-limit rules, grouped by service.
    pub const RATE_LIMIT: &'static str = "ratelimit";

    /// Client registrations, grouped by host.
    pub const CLIENT: &'static str = "client";

    /// Configuration file groups, grouped by namespace.
    pub const CONFIG_GROUP: &'static str = "config_group";

    const BUILTIN: [&'static str; 3] = [Self::RATE_LIMIT, Self::CLIENT, Self::CONFIG_GROUP];

    /// Create a resource type from a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if this is one of the resource types shipped with meshsync.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        Self::BUILTIN.contains(&self.0.as_str())
    }

    /// Consume and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ResourceType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
