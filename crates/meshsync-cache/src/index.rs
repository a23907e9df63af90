//! Record index: identity -> record, plus parent key -> identities.
//!
//! The secondary grouping is derived from the primary mapping and kept in
//! step on every mutation:
//!
//! - every identity in the primary mapping sits in exactly one parent bucket,
//!   the one matching its current parent key
//! - empty buckets are dropped
//! - invalid records never enter either structure

use std::fmt;
use std::sync::Arc;

use fnv::{FnvHashMap, FnvHashSet};
use meshsync_core::Record;

/// Shared handle to an indexed record.
pub type SharedRecord<T> = Arc<Record<T>>;

/// What an upsert did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// A new identity was added.
    Inserted,
    /// An existing identity was replaced under the same parent.
    Replaced,
    /// An existing identity was replaced and moved to another parent.
    Moved,
}

/// Bookkeeping found inconsistent while mutating one identity.
///
/// The affected identity is evicted from the index so the remaining entries
/// stay consistent; a later full reload restores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexViolation {
    /// The affected identity.
    pub id: String,
    /// What was inconsistent.
    pub reason: String,
}

impl fmt::Display for IndexViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.reason)
    }
}

/// Identity -> record mapping with a parent-key grouping.
pub struct RecordIndex<T> {
    records: FnvHashMap<String, SharedRecord<T>>,
    by_parent: FnvHashMap<String, FnvHashSet<String>>,
}

impl<T> Default for RecordIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Records are shared, so cloning the index never clones payloads.
impl<T> Clone for RecordIndex<T> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            by_parent: self.by_parent.clone(),
        }
    }
}

impl<T> fmt::Debug for RecordIndex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordIndex")
            .field("records", &self.records.len())
            .field("parents", &self.by_parent.len())
            .finish()
    }
}

impl<T> RecordIndex<T> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            records: FnvHashMap::default(),
            by_parent: FnvHashMap::default(),
        }
    }

    /// Number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the index holds no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of non-empty parent buckets.
    #[inline]
    pub fn parent_count(&self) -> usize {
        self.by_parent.len()
    }

    /// Look up a record by identity.
    #[inline]
    pub fn get(&self, id: &str) -> Option<&SharedRecord<T>> {
        self.records.get(id)
    }

    /// Parent keys with at least one record.
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.by_parent.keys().map(String::as_str)
    }

    /// Records grouped under `parent`, in unspecified order.
    ///
    /// Identities whose primary entry disagrees with the bucket are skipped.
    pub fn records_of<'a>(
        &'a self,
        parent: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a SharedRecord<T>)> + 'a {
        self.by_parent
            .get(parent)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(move |id| {
                self.records
                    .get(id)
                    .filter(|record| record.parent() == parent)
                    .map(|record| (id.as_str(), record))
            })
    }

    /// Every record, in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SharedRecord<T>)> {
        self.records.iter().map(|(id, record)| (id.as_str(), record))
    }

    /// Insert or replace a valid record.
    pub fn upsert(&mut self, record: Record<T>) -> Result<Change, IndexViolation> {
        let id = record.id().to_string();
        let parent = record.parent().to_string();
        let record = Arc::new(record);

        let change = match self.records.insert(id.clone(), record) {
            None => Change::Inserted,
            Some(previous) if previous.parent() == parent => {
                if !self.bucket_contains(&parent, &id) {
                    return Err(self.evict(
                        &id,
                        &[previous.parent()],
                        "identity missing from its parent bucket",
                    ));
                }
                Change::Replaced
            }
            Some(previous) => {
                if !self.unlink(previous.parent(), &id) {
                    return Err(self.evict(
                        &id,
                        &[previous.parent(), parent.as_str()],
                        "identity missing from its previous parent bucket",
                    ));
                }
                Change::Moved
            }
        };

        self.by_parent.entry(parent).or_default().insert(id);
        Ok(change)
    }

    /// Remove an identity. Absent identities are a no-op.
    pub fn remove(&mut self, id: &str) -> Result<Option<SharedRecord<T>>, IndexViolation> {
        let Some(previous) = self.records.remove(id) else {
            return Ok(None);
        };

        if !self.unlink(previous.parent(), id) {
            return Err(IndexViolation {
                id: id.to_string(),
                reason: format!(
                    "identity missing from parent bucket {} on removal",
                    previous.parent()
                ),
            });
        }
        Ok(Some(previous))
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.records.clear();
        self.by_parent.clear();
    }

    /// Check every invariant, returning the violations found.
    pub fn verify(&self) -> Vec<IndexViolation> {
        let mut violations = Vec::new();
        let mut bucketed = 0usize;

        for (parent, ids) in &self.by_parent {
            if ids.is_empty() {
                violations.push(IndexViolation {
                    id: String::new(),
                    reason: format!("empty bucket for parent {parent}"),
                });
            }
            for id in ids {
                bucketed += 1;
                match self.records.get(id) {
                    None => violations.push(IndexViolation {
                        id: id.clone(),
                        reason: format!("bucket {parent} references a missing record"),
                    }),
                    Some(record) if record.parent() != parent.as_str() => {
                        violations.push(IndexViolation {
                            id: id.clone(),
                            reason: format!(
                                "bucket {parent} holds a record owned by {}",
                                record.parent()
                            ),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        if bucketed != self.records.len() {
            violations.push(IndexViolation {
                id: String::new(),
                reason: format!(
                    "{} records but {bucketed} bucket entries",
                    self.records.len()
                ),
            });
        }
        violations
    }

    fn bucket_contains(&self, parent: &str, id: &str) -> bool {
        self.by_parent
            .get(parent)
            .is_some_and(|ids| ids.contains(id))
    }

    /// Remove `id` from a bucket, dropping the bucket once empty.
    fn unlink(&mut self, parent: &str, id: &str) -> bool {
        let Some(ids) = self.by_parent.get_mut(parent) else {
            return false;
        };
        let removed = ids.remove(id);
        if ids.is_empty() {
            self.by_parent.remove(parent);
        }
        removed
    }

    fn evict(&mut self, id: &str, parents: &[&str], reason: &str) -> IndexViolation {
        self.records.remove(id);
        for parent in parents {
            self.unlink(parent, id);
        }
        IndexViolation {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn corrupt_bucket(&mut self, parent: &str, id: &str) {
        self.unlink(parent, id);
    }
}
