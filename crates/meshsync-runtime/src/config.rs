//! Runtime configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use meshsync_cache::CacheConfig;
use meshsync_core::{ResourceType, SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// Configuration for a set of caches and their refresh loops.
///
/// `defaults` applies to every resource type without an entry in
/// `resources`. An override replaces the defaults wholesale; fields it leaves
/// out take the [`CacheConfig`] defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Settings for caches without an override.
    pub defaults: CacheConfig,
    /// Per-resource-type overrides, keyed by resource type name.
    pub resources: HashMap<String, CacheConfig>,
    /// Shutdown behavior.
    pub shutdown: ShutdownConfig,
}

impl RuntimeConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SyncError::Configuration(format!("invalid runtime config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Replace the defaults.
    pub fn with_defaults(mut self, defaults: CacheConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set an override for one resource type.
    pub fn with_resource(mut self, resource: impl Into<String>, config: CacheConfig) -> Self {
        self.resources.insert(resource.into(), config);
        self
    }

    /// Set the shutdown grace period.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.shutdown.grace_period = grace_period;
        self
    }

    /// Settings for `resource`.
    pub fn cache_config(&self, resource: &ResourceType) -> CacheConfig {
        self.resources
            .get(resource.as_str())
            .unwrap_or(&self.defaults)
            .clone()
    }

    /// Validate the defaults and every override.
    pub fn validate(&self) -> SyncResult<()> {
        self.defaults.validate()?;
        for (resource, config) in &self.resources {
            config.validate().map_err(|e| {
                SyncError::Configuration(format!("resource {resource}: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for in-flight refresh cycles.
    #[serde(rename = "grace_period_secs", with = "secs")]
    pub grace_period: Duration,
    /// Whether to listen for OS signals.
    pub listen_for_signals: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(30),
            listen_for_signals: true,
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
