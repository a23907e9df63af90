//! Revision index: parent key -> latest aggregate revision.

use fnv::FnvHashMap;
use meshsync_core::Revision;

/// Latest known revision per parent key.
///
/// Entries outlive the records they describe: a parent whose last record was
/// deleted keeps its revision until the cache is reset. The empty token is
/// never stored, so it can serve as the "unknown parent" sentinel.
#[derive(Debug, Clone, Default)]
pub struct RevisionIndex {
    revisions: FnvHashMap<String, Revision>,
}

impl RevisionIndex {
    /// Create an empty revision index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parent keys with a revision.
    #[inline]
    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// Check if no revision is known.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Revision for `parent`, if known.
    #[inline]
    pub fn get(&self, parent: &str) -> Option<&Revision> {
        self.revisions.get(parent)
    }

    /// Overwrite the revision for `parent`.
    ///
    /// Returns `false` and leaves the index untouched when `revision` is empty.
    pub fn set(&mut self, parent: impl Into<String>, revision: Revision) -> bool {
        if revision.is_empty() {
            return false;
        }
        self.revisions.insert(parent.into(), revision);
        true
    }

    /// Iterate over every (parent, revision) pair.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Revision)> {
        self.revisions.iter().map(|(parent, rev)| (parent.as_str(), rev))
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.revisions.clear();
    }
}
