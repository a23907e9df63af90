//! SDK and agent clients grouped by host.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use meshsync_cache::{CacheConfig, ResourceCache, SharedRecord};
use meshsync_core::{
    ChangeSource, DecodeError, ResourceKind, ResourceType, SyncError, SyncResult, Timestamp,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::page::{check_limit, take_offset_and_limit, Page};

/// Filter keys accepted by [`ClientCache::clients_by_filter`].
pub const CLIENT_FILTER_KEYS: [&str; 3] = ["type", "host", "version"];

/// Kind of client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientType {
    #[default]
    Unknown,
    Sdk,
    Agent,
}

impl ClientType {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Sdk => "SDK",
            Self::Agent => "AGENT",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientType {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "" | "UNKNOWN" => Ok(Self::Unknown),
            "SDK" => Ok(Self::Sdk),
            "AGENT" => Ok(Self::Agent),
            other => Err(DecodeError::InvalidValue {
                field: "type",
                reason: format!("unknown client type {other}"),
            }),
        }
    }
}

/// Where a client runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    /// Region, the coarsest level.
    pub region: String,
    /// Zone within the region.
    pub zone: String,
    /// Campus within the zone.
    pub campus: String,
}

/// A metrics endpoint a client exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatInfo {
    pub target: String,
    pub port: u32,
    pub path: String,
    pub protocol: String,
}

/// A client row as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientRow {
    /// Address the client registered from. Parent key.
    pub host: String,
    /// Client type name, e.g. `SDK`.
    pub client_type: String,
    /// Client software version.
    pub version: String,
    pub location: Location,
    /// Metrics endpoints, in registration order.
    pub stats: Vec<StatInfo>,
    /// Registration time.
    pub create_time: Timestamp,
}

/// A decoded client registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    /// Address the client registered from.
    pub host: String,
    /// Parsed client type.
    pub client_type: ClientType,
    /// Client software version.
    pub version: String,
    /// Where the client runs.
    pub location: Location,
    /// Metrics endpoints, in registration order.
    pub stats: Vec<StatInfo>,
    /// Registration time. Not part of [`client_equals`].
    pub registered_at: Timestamp,
}

/// Check if two registrations agree on everything that must be stored.
///
/// Compares host, type, version, location and the stat endpoints in order;
/// ignores the registration time.
pub fn client_equals(a: &Client, b: &Client) -> bool {
    a.host == b.host
        && a.client_type == b.client_type
        && a.version == b.version
        && a.location == b.location
        && a.stats.len() == b.stats.len()
        && a.stats.iter().zip(&b.stats).all(|(x, y)| x == y)
}

/// [`ResourceKind`] of clients. Parent key: the client host.
#[derive(Debug)]
pub struct ClientKind;

impl ResourceKind for ClientKind {
    const RESOURCE: &'static str = ResourceType::CLIENT;
    type Raw = ClientRow;
    type Payload = Client;

    fn decode(raw: ClientRow) -> Result<Client, DecodeError> {
        if raw.host.is_empty() {
            return Err(DecodeError::MissingField("host"));
        }
        Ok(Client {
            client_type: raw.client_type.parse()?,
            host: raw.host,
            version: raw.version,
            location: raw.location,
            stats: raw.stats,
            registered_at: raw.create_time,
        })
    }
}

/// Shared handle to a cached client.
pub type ClientRecord = SharedRecord<Client>;

/// Clients by id and host.
#[derive(Debug, Clone)]
pub struct ClientCache {
    cache: Arc<ResourceCache<ClientKind>>,
}

impl ClientCache {
    /// Wrap an existing cache.
    pub fn new(cache: Arc<ResourceCache<ClientKind>>) -> Self {
        Self { cache }
    }

    /// Create a cache reading from `source`.
    pub fn initialize(
        config: CacheConfig,
        source: Arc<dyn ChangeSource<ClientKind>>,
    ) -> SyncResult<Self> {
        Ok(Self::new(Arc::new(ResourceCache::initialize(config, source)?)))
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<ResourceCache<ClientKind>> {
        &self.cache
    }

    /// Look up a client by id.
    pub fn get_client(&self, id: &str) -> Option<ClientRecord> {
        self.cache.get(id)
    }

    /// Clients registered from `host`, sorted by id.
    pub fn clients_on_host(&self, host: &str) -> Vec<ClientRecord> {
        let mut clients = self.cache.get_by_parent(host);
        clients.sort_by(|a, b| a.id().cmp(b.id()));
        clients
    }

    /// Number of clients held.
    pub fn client_count(&self) -> usize {
        self.cache.count()
    }

    /// Check if `incoming` differs from the cached registration of `id`.
    pub fn needs_store(&self, id: &str, incoming: &Client) -> bool {
        match self.cache.get(id) {
            Some(cached) => !client_equals(cached.payload(), incoming),
            None => true,
        }
    }

    /// Clients matching every filter, sorted by id, one page at a time.
    ///
    /// Filters are exact matches on `type`, `host` or `version`; any other
    /// key is rejected. An empty filter set matches everything.
    pub fn clients_by_filter(
        &self,
        filters: &HashMap<String, String>,
        offset: usize,
        limit: usize,
    ) -> SyncResult<Page<ClientRecord>> {
        check_limit(ClientKind::RESOURCE, limit)?;
        let filter = ClientFilter::parse(filters)?;

        let mut matched = Vec::new();
        // Host is the parent key, so a host filter only walks one bucket.
        let collect = |_: &str, record: &ClientRecord| -> Result<bool, SyncError> {
            if filter.matches(record.payload()) {
                matched.push(Arc::clone(record));
            }
            Ok(true)
        };
        match filter.host {
            Some(host) => self.cache.iterate(host, collect)?,
            None => self.cache.iterate_all(collect)?,
        }
        matched.sort_by(|a, b| a.id().cmp(b.id()));

        let page = Page::slice(matched, offset, limit);
        debug!(
            filters = filters.len(),
            total = page.total,
            returned = page.len(),
            "clients_by_filter"
        );
        Ok(page)
    }

    /// [`clients_by_filter`](Self::clients_by_filter) driven by request
    /// parameters, where `offset` and `limit` sit beside the filters.
    pub fn query(&self, params: &HashMap<String, String>) -> SyncResult<Page<ClientRecord>> {
        let mut filters = params.clone();
        let (offset, limit) = take_offset_and_limit(ClientKind::RESOURCE, &mut filters)?;
        self.clients_by_filter(&filters, offset, limit)
    }
}

struct ClientFilter<'a> {
    client_type: Option<ClientType>,
    host: Option<&'a str>,
    version: Option<&'a str>,
}

impl<'a> ClientFilter<'a> {
    fn parse(filters: &'a HashMap<String, String>) -> SyncResult<Self> {
        let mut filter = Self {
            client_type: None,
            host: None,
            version: None,
        };
        for (key, value) in filters {
            match key.as_str() {
                "type" => {
                    let client_type = value.parse().map_err(|e: DecodeError| {
                        SyncError::invalid_query(ClientKind::resource_type(), e.to_string())
                    })?;
                    filter.client_type = Some(client_type);
                }
                "host" => filter.host = Some(value),
                "version" => filter.version = Some(value),
                other => {
                    return Err(SyncError::invalid_query(
                        ClientKind::resource_type(),
                        format!("unsupported filter {other}, expected one of {CLIENT_FILTER_KEYS:?}"),
                    ))
                }
            }
        }
        Ok(filter)
    }

    fn matches(&self, client: &Client) -> bool {
        self.client_type.map_or(true, |t| client.client_type == t)
            && self.host.map_or(true, |h| client.host == h)
            && self.version.map_or(true, |v| client.version == v)
    }
}
