//! Cache configuration.
//!
//! Every recognized option is a field of [`CacheConfig`] with a documented
//! default. Configurations are validated once, when a cache is initialized.
//! In serialized form durations are whole seconds (`*_secs`) or, for retry
//! delays, milliseconds (`*_ms`).

use std::time::Duration;

use meshsync_core::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// Configuration for one resource-type cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Scheduler cadence between refresh cycles. Default 1s.
    #[serde(rename = "refresh_interval_secs", with = "secs")]
    pub refresh_interval: Duration,
    /// Bound on a single store round trip. Default 5s.
    #[serde(rename = "request_timeout_secs", with = "secs")]
    pub request_timeout: Duration,
    /// Window subtracted from the cursor for incremental fetches. Default 0s.
    #[serde(rename = "store_rollback_secs", with = "secs")]
    pub store_rollback: Duration,
    /// How far record times may run ahead of the store clock before the
    /// cycle reports a clock anomaly. Default 5s.
    #[serde(rename = "clock_skew_tolerance_secs", with = "secs")]
    pub clock_skew_tolerance: Duration,
    /// Concurrency strategy for the index. Default [`IndexMode::Locked`].
    pub index_mode: IndexMode,
    /// Delay policy after a failed cycle. Default [`RetryPolicy::Fixed`].
    pub retry: RetryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            store_rollback: Duration::ZERO,
            clock_skew_tolerance: Duration::from_secs(5),
            index_mode: IndexMode::Locked,
            retry: RetryPolicy::Fixed,
        }
    }
}

impl CacheConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the refresh interval.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the store rollback window.
    pub fn with_store_rollback(mut self, rollback: Duration) -> Self {
        self.store_rollback = rollback;
        self
    }

    /// Set the clock skew tolerance.
    pub fn with_clock_skew_tolerance(mut self, tolerance: Duration) -> Self {
        self.clock_skew_tolerance = tolerance;
        self
    }

    /// Set the index mode.
    pub fn with_index_mode(mut self, mode: IndexMode) -> Self {
        self.index_mode = mode;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.refresh_interval.is_zero() {
            return Err(SyncError::Configuration(
                "refresh_interval must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(SyncError::Configuration(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        self.retry.validate()
    }
}

/// How readers and the refresh cycle share the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    /// One reader/writer lock around the index, mutated in place. Suits
    /// large record counts with frequent small deltas.
    #[default]
    Locked,
    /// Each cycle builds a new immutable index and swaps it in. Reads never
    /// wait on an apply; every cycle copies the index.
    CopyOnWrite,
}

/// Delay before retrying after a failed cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Retry on the regular refresh interval.
    #[default]
    Fixed,
    /// Exponential backoff, capped.
    Exponential {
        /// Delay after the first failure.
        #[serde(rename = "initial_delay_ms", with = "millis")]
        initial_delay: Duration,
        /// Upper bound on the delay.
        #[serde(rename = "max_delay_ms", with = "millis")]
        max_delay: Duration,
        /// Growth factor per consecutive failure.
        multiplier: f64,
        /// Add up to 25% random jitter.
        jitter: bool,
    },
}

impl RetryPolicy {
    /// Exponential backoff from `initial_delay` up to `max_delay`, doubling, with jitter.
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self::Exponential {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Delay before the next cycle after `failures` consecutive failures.
    ///
    /// With no failures, or under [`RetryPolicy::Fixed`], this is `interval`.
    pub fn delay_for_attempt(&self, failures: u32, interval: Duration) -> Duration {
        match self {
            Self::Fixed => interval,
            Self::Exponential { .. } if failures == 0 => interval,
            Self::Exponential {
                initial_delay,
                max_delay,
                multiplier,
                jitter,
            } => {
                let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
                let base = initial_delay.as_secs_f64() * multiplier.powi(exponent);
                let capped = base.min(max_delay.as_secs_f64());
                let secs = if *jitter {
                    capped + capped * 0.25 * rand::random::<f64>()
                } else {
                    capped
                };
                // Jitter on a cap near `Duration::MAX` does not fit.
                Duration::try_from_secs_f64(secs).unwrap_or(*max_delay)
            }
        }
    }

    fn validate(&self) -> SyncResult<()> {
        match self {
            Self::Fixed => Ok(()),
            Self::Exponential {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                if initial_delay.is_zero() {
                    return Err(SyncError::Configuration(
                        "retry initial_delay must be greater than zero".to_string(),
                    ));
                }
                if max_delay < initial_delay {
                    return Err(SyncError::Configuration(
                        "retry max_delay must not be below initial_delay".to_string(),
                    ));
                }
                if !multiplier.is_finite() || *multiplier < 1.0 {
                    return Err(SyncError::Configuration(
                        "retry multiplier must be at least 1.0".to_string(),
                    ));
                }
                Ok(())
            }
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

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
