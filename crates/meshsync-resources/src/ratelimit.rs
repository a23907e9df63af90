//! Rate-limit rules grouped by service.
//!
//! The store keeps one row per rule with the rule body as JSON text, plus one
//! aggregate revision per service. Decoding parses the body and reconciles
//! its two ways of expressing match conditions: the label map and the
//! argument list. After decoding both forms describe the same conditions, so
//! consumers may read either.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use meshsync_cache::{CacheConfig, ResourceCache, SharedRecord};
use meshsync_core::{ChangeSource, DecodeError, ResourceKind, ResourceType, Revision, SyncResult};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::page::visited;

/// How a [`MatchString`] compares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    /// Equal to the value.
    #[default]
    Exact,
    /// Matches the value as a regular expression.
    Regex,
    /// Not equal to the value.
    NotEquals,
    /// One of a comma-separated list.
    In,
    /// None of a comma-separated list.
    NotIn,
}

/// A value matcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchString {
    /// Comparison.
    #[serde(rename = "type")]
    pub match_type: MatchType,
    /// Operand.
    pub value: String,
}

impl MatchString {
    /// An exact matcher.
    pub fn exact(value: impl Into<String>) -> Self {
        Self {
            match_type: MatchType::Exact,
            value: value.into(),
        }
    }
}

/// Where a [`MatchArgument`] reads its input from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArgumentType {
    /// A caller-supplied label.
    #[default]
    Custom,
    /// The request method.
    Method,
    /// A request header.
    Header,
    /// A query parameter.
    Query,
    /// The calling service.
    CallerService,
    /// The calling address.
    CallerIp,
}

impl ArgumentType {
    /// Label key an argument of this type and `key` is known by.
    ///
    /// Custom arguments keep their key; the others are `$`-prefixed.
    pub fn label_key(self, key: &str) -> String {
        match self {
            Self::Custom => key.to_string(),
            Self::Method => "$method".to_string(),
            Self::Header => format!("$header.{key}"),
            Self::Query => format!("$query.{key}"),
            Self::CallerService => format!("$caller_service.{key}"),
            Self::CallerIp => "$caller_ip".to_string(),
        }
    }
}

/// One request attribute a rule matches on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchArgument {
    /// Attribute source.
    #[serde(rename = "type")]
    pub argument_type: ArgumentType,
    /// Attribute name. Empty for sources without names.
    pub key: String,
    /// Matcher.
    pub value: MatchString,
}

/// A quota: `max_amount` requests per `valid_duration_secs`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Amount {
    /// Requests allowed in the window.
    pub max_amount: u32,
    /// Window length in seconds.
    pub valid_duration_secs: u64,
}

/// What a rule limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitResource {
    /// Requests per second.
    #[default]
    Qps,
    /// Concurrent requests.
    Concurrency,
}

/// Where quotas are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitType {
    /// Shared across instances.
    #[default]
    Global,
    /// Per instance.
    Local,
}

/// Behavior when the shared quota server is unreachable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Failover {
    /// Fall back to per-instance counting.
    #[default]
    FailoverLocal,
    /// Let requests through.
    FailoverPass,
}

/// Decoded rule body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitRule {
    /// Rule name; the row name when the body has none.
    pub name: String,
    /// Lower values are evaluated first.
    pub priority: u32,
    /// What the amounts count.
    pub resource: LimitResource,
    /// Where the amounts are counted.
    #[serde(rename = "type")]
    pub limit_type: LimitType,
    /// Method matcher; taken from the row when the body has none.
    pub method: Option<MatchString>,
    /// Match conditions keyed by flattened label key.
    pub labels: BTreeMap<String, MatchString>,
    /// Match conditions by request attribute.
    pub arguments: Vec<MatchArgument>,
    /// Quotas; all must hold.
    pub amounts: Vec<Amount>,
    /// Limiter behavior name, e.g. `REJECT`.
    pub action: String,
    /// Disabled rules are distributed but not enforced.
    pub disable: bool,
    /// Count all values matching a regex label under one quota.
    pub regex_combine: bool,
    pub failover: Failover,
}

impl RateLimitRule {
    /// Make labels and arguments describe the same conditions.
    ///
    /// A label that no argument accounts for becomes a custom argument. An
    /// argument accounts for a label when their keys are equal or the label
    /// sits under the argument's [`ArgumentType::label_key`]. Every argument
    /// then gets a label under its flattened key unless one is already
    /// present. Existing entries are never changed, and a normalized rule
    /// normalizes to itself.
    pub fn normalize_match_conditions(&mut self) {
        let flattened: HashSet<String> = self
            .arguments
            .iter()
            .map(|arg| arg.argument_type.label_key(&arg.key))
            .collect();
        for (key, value) in &self.labels {
            let covered =
                flattened.contains(key) || self.arguments.iter().any(|arg| &arg.key == key);
            if !covered {
                self.arguments.push(MatchArgument {
                    argument_type: ArgumentType::Custom,
                    key: key.clone(),
                    value: value.clone(),
                });
            }
        }
        for arg in &self.arguments {
            self.labels
                .entry(arg.argument_type.label_key(&arg.key))
                .or_insert_with(|| arg.value.clone());
        }
    }
}

/// A rate-limit row as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitRow {
    /// Rule name.
    pub name: String,
    /// Method the rule applies to; empty for all.
    pub method: String,
    /// Rule body, JSON text.
    pub rule: String,
}

impl RateLimitRow {
    /// Create a row.
    pub fn new(name: impl Into<String>, method: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: method.into(),
            rule: rule.into(),
        }
    }
}

/// A decoded rate-limit rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimit {
    /// Row name.
    pub name: String,
    /// Row method; empty for all.
    pub method: String,
    /// Decoded and normalized body.
    pub rule: RateLimitRule,
}

/// [`ResourceKind`] of rate-limit rules. Parent key: the service id.
#[derive(Debug)]
pub struct RateLimitKind;

impl ResourceKind for RateLimitKind {
    const RESOURCE: &'static str = ResourceType::RATE_LIMIT;
    type Raw = RateLimitRow;
    type Payload = RateLimit;

    fn decode(raw: RateLimitRow) -> Result<RateLimit, DecodeError> {
        if raw.name.is_empty() {
            return Err(DecodeError::MissingField("name"));
        }
        let mut rule: RateLimitRule = if raw.rule.trim().is_empty() {
            RateLimitRule::default()
        } else {
            serde_json::from_str(&raw.rule).map_err(|e| DecodeError::format("json", e))?
        };

        if rule.name.is_empty() {
            rule.name.clone_from(&raw.name);
        }
        if rule.method.is_none() && !raw.method.is_empty() {
            rule.method = Some(MatchString::exact(raw.method.as_str()));
        }
        if rule.amounts.iter().any(|a| a.valid_duration_secs == 0) {
            return Err(DecodeError::InvalidValue {
                field: "amounts",
                reason: "validDurationSecs must be positive".to_string(),
            });
        }
        rule.normalize_match_conditions();

        Ok(RateLimit {
            name: raw.name,
            method: raw.method,
            rule,
        })
    }
}

/// Shared handle to a cached rule.
pub type RateLimitRecord = SharedRecord<RateLimit>;

/// Rate-limit rules by service.
#[derive(Debug, Clone)]
pub struct RateLimitCache {
    cache: Arc<ResourceCache<RateLimitKind>>,
}

impl RateLimitCache {
    /// Wrap an existing cache.
    pub fn new(cache: Arc<ResourceCache<RateLimitKind>>) -> Self {
        Self { cache }
    }

    /// Create a cache reading from `source`.
    pub fn initialize(
        config: CacheConfig,
        source: Arc<dyn ChangeSource<RateLimitKind>>,
    ) -> SyncResult<Self> {
        Ok(Self::new(Arc::new(ResourceCache::initialize(config, source)?)))
    }

    /// The underlying cache, for refreshing and registration.
    pub fn cache(&self) -> &Arc<ResourceCache<RateLimitKind>> {
        &self.cache
    }

    /// Rules of `service`, sorted by id.
    pub fn rules_for_service(&self, service: &str) -> Vec<RateLimitRecord> {
        let mut rules = self.cache.get_by_parent(service);
        rules.sort_by(|a, b| a.id().cmp(b.id()));
        rules
    }

    /// Latest revision of `service`'s rule set. Empty when unknown.
    pub fn last_revision(&self, service: &str) -> Revision {
        self.cache.get_last_revision(service)
    }

    /// Number of rules held.
    pub fn rule_count(&self) -> usize {
        self.cache.count()
    }

    /// Number of services with a known revision.
    pub fn revision_count(&self) -> usize {
        self.cache.parent_revision_count()
    }

    /// The rule of `service` named `name`.
    pub fn find_rule(&self, service: &str, name: &str) -> Option<RateLimitRecord> {
        let mut found = None;
        visited(self.cache.iterate(service, |_, record| {
            if record.payload().name == name {
                found = Some(Arc::clone(record));
                return Ok(false);
            }
            Ok(true)
        }));
        trace!(service, name, found = found.is_some(), "find_rule");
        found
    }
}
