//! Offset/limit paging over cache query results.

use std::collections::HashMap;
use std::convert::Infallible;

use meshsync_core::{ResourceType, SyncError, SyncResult};

/// Finish a cache visit whose visitor cannot fail.
pub(crate) fn visited(result: Result<(), Infallible>) {
    match result {
        Ok(()) => {}
        Err(never) => match never {},
    }
}

/// Largest page a query may ask for.
pub const MAX_PAGE_SIZE: usize = 100;

/// One page of a sorted result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Matches before paging.
    pub total: usize,
    /// The requested slice.
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// Cut `offset..offset + limit` out of `sorted`.
    pub(crate) fn slice(sorted: Vec<T>, offset: usize, limit: usize) -> Self {
        let total = sorted.len();
        let items = sorted.into_iter().skip(offset).take(limit).collect();
        Self { total, items }
    }

    /// Number of items on this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the page holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Reject limits outside `1..=MAX_PAGE_SIZE`.
pub(crate) fn check_limit(resource: &str, limit: usize) -> SyncResult<()> {
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(SyncError::invalid_query(
            ResourceType::new(resource),
            format!("limit must be within 1..={MAX_PAGE_SIZE}, got {limit}"),
        ));
    }
    Ok(())
}

/// Take `offset` and `limit` out of query parameters.
///
/// Defaults are offset 0 and limit [`MAX_PAGE_SIZE`].
pub(crate) fn take_offset_and_limit(
    resource: &str,
    params: &mut HashMap<String, String>,
) -> SyncResult<(usize, usize)> {
    let mut parse = |key: &str, default: usize| -> SyncResult<usize> {
        match params.remove(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| {
                SyncError::invalid_query(
                    ResourceType::new(resource),
                    format!("{key} is not a number: {value}"),
                )
            }),
        }
    };
    let offset = parse("offset", 0)?;
    let limit = parse("limit", MAX_PAGE_SIZE)?;
    check_limit(resource, limit)?;
    Ok((offset, limit))
}

/// Match `value` against a filter with an optional trailing `*` wildcard.
pub(crate) fn matches_pattern(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}
