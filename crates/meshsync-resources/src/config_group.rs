//! Configuration groups grouped by namespace.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::sync::Arc;

use meshsync_cache::{CacheConfig, ResourceCache, SharedRecord};
use meshsync_core::{ChangeSource, DecodeError, ResourceKind, ResourceType, SyncResult};
use tracing::debug;

use crate::page::{check_limit, matches_pattern, visited, Page};

const MAX_NAME_LEN: usize = 128;

/// A config group row as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigGroupRow {
    /// Group name, unique within the namespace.
    pub name: String,
    pub comment: String,
    /// Empty means the creator owns the group.
    pub owner: String,
    /// User that created the group.
    pub create_by: String,
    /// User that last changed the group.
    pub modify_by: String,
}

/// A decoded config group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigGroup {
    /// Group name.
    pub name: String,
    /// Free-form description.
    pub comment: String,
    /// Owning user; the creator unless set explicitly.
    pub owner: String,
    /// User that created the group.
    pub create_by: String,
    /// User that last changed the group.
    pub modify_by: String,
}

/// [`ResourceKind`] of config groups. Parent key: the namespace.
#[derive(Debug)]
pub struct ConfigGroupKind;

impl ResourceKind for ConfigGroupKind {
    const RESOURCE: &'static str = ResourceType::CONFIG_GROUP;
    type Raw = ConfigGroupRow;
    type Payload = ConfigGroup;

    fn decode(raw: ConfigGroupRow) -> Result<ConfigGroup, DecodeError> {
        check_name(&raw.name)?;
        let owner = if raw.owner.is_empty() {
            raw.create_by.clone()
        } else {
            raw.owner
        };
        Ok(ConfigGroup {
            name: raw.name,
            comment: raw.comment,
            owner,
            create_by: raw.create_by,
            modify_by: raw.modify_by,
        })
    }
}

fn check_name(name: &str) -> Result<(), DecodeError> {
    if name.is_empty() {
        return Err(DecodeError::MissingField("name"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(DecodeError::InvalidValue {
            field: "name",
            reason: format!("longer than {MAX_NAME_LEN} bytes"),
        });
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')))
    {
        return Err(DecodeError::InvalidValue {
            field: "name",
            reason: format!("unexpected character {c:?}"),
        });
    }
    Ok(())
}

/// Shared handle to a cached group.
pub type ConfigGroupRecord = SharedRecord<ConfigGroup>;

/// Config groups by namespace and name.
#[derive(Debug, Clone)]
pub struct ConfigGroupCache {
    cache: Arc<ResourceCache<ConfigGroupKind>>,
}

impl ConfigGroupCache {
    /// Wrap an existing cache.
    pub fn new(cache: Arc<ResourceCache<ConfigGroupKind>>) -> Self {
        Self { cache }
    }

    /// Create a cache reading from `source`.
    pub fn initialize(
        config: CacheConfig,
        source: Arc<dyn ChangeSource<ConfigGroupKind>>,
    ) -> SyncResult<Self> {
        Ok(Self::new(Arc::new(ResourceCache::initialize(config, source)?)))
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<ResourceCache<ConfigGroupKind>> {
        &self.cache
    }

    /// Number of groups held.
    pub fn group_count(&self) -> usize {
        self.cache.count()
    }

    /// The group `name` in `namespace`.
    pub fn get_group(&self, namespace: &str, name: &str) -> Option<ConfigGroupRecord> {
        let mut found = None;
        visited(self.cache.iterate(namespace, |_, record| {
            if record.payload().name == name {
                found = Some(Arc::clone(record));
                return Ok(false);
            }
            Ok(true)
        }));
        found
    }

    /// Groups whose name matches `name_filter`, one page at a time.
    ///
    /// The filter is an exact name or a prefix ending in `*`; empty matches
    /// every group. An empty `namespace` searches all namespaces. Results
    /// are sorted by name, then namespace.
    pub fn query_groups(
        &self,
        namespace: &str,
        name_filter: &str,
        offset: usize,
        limit: usize,
    ) -> SyncResult<Page<ConfigGroupRecord>> {
        check_limit(ConfigGroupKind::RESOURCE, limit)?;

        let mut matched = Vec::new();
        let collect = |_: &str, record: &ConfigGroupRecord| -> Result<bool, Infallible> {
            if name_filter.is_empty() || matches_pattern(name_filter, &record.payload().name) {
                matched.push(Arc::clone(record));
            }
            Ok(true)
        };
        visited(if namespace.is_empty() {
            self.cache.iterate_all(collect)
        } else {
            self.cache.iterate(namespace, collect)
        });
        matched.sort_by(by_name);

        let page = Page::slice(matched, offset, limit);
        debug!(
            namespace,
            name_filter,
            total = page.total,
            returned = page.len(),
            "query_groups"
        );
        Ok(page)
    }
}

fn by_name(a: &ConfigGroupRecord, b: &ConfigGroupRecord) -> Ordering {
    a.payload()
        .name
        .cmp(&b.payload().name)
        .then_with(|| a.parent().cmp(b.parent()))
}
