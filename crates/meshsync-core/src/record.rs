//! Record envelopes exchanged with the store and held by the index.
//!
//! - [`RawRecord`] - one changed row as delivered by the store, payload undecoded
//! - [`Record`] - a valid, decoded record as held by a cache
//! - [`RevisionRecord`] - the aggregate revision of one parent key
//! - [`FetchBatch`] - everything one `fetch_changed` round trip returned

use crate::{Revision, Timestamp};

/// A changed row as delivered by the store.
///
/// Invalid rows (`valid == false`) are soft deletions: the cache evicts the
/// identity and never decodes the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord<P> {
    /// Identity, unique within the resource type.
    pub id: String,
    /// Grouping key, e.g. the owning service id.
    pub parent: String,
    /// `false` marks a logical deletion.
    pub valid: bool,
    /// Store-assigned modification time.
    pub modify_time: Timestamp,
    /// Content version of this record.
    pub revision: Revision,
    /// Undecoded payload.
    pub payload: P,
}

impl<P> RawRecord<P> {
    /// Create a valid record with a zero modification time and no revision.
    pub fn new(id: impl Into<String>, parent: impl Into<String>, payload: P) -> Self {
        Self {
            id: id.into(),
            parent: parent.into(),
            valid: true,
            modify_time: Timestamp::ZERO,
            revision: Revision::empty(),
            payload,
        }
    }

    /// Set the modification time.
    #[must_use]
    pub fn with_modify_time(mut self, modify_time: Timestamp) -> Self {
        self.modify_time = modify_time;
        self
    }

    /// Set the record revision.
    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<Revision>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Mark the record as logically deleted.
    #[must_use]
    pub fn invalidated(mut self) -> Self {
        self.valid = false;
        self
    }
}

/// A valid, decoded record held by a cache.
///
/// Records are immutable once indexed; a newer version replaces the whole
/// entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<T> {
    id: String,
    parent: String,
    modify_time: Timestamp,
    revision: Revision,
    payload: T,
}

impl<T> Record<T> {
    /// Build a decoded record from the envelope of a raw one.
    ///
    /// The raw envelope is consumed whether or not decoding succeeds.
    pub fn try_from_raw<P, E>(
        raw: RawRecord<P>,
        decode: impl FnOnce(P) -> Result<T, E>,
    ) -> Result<Self, E> {
        Ok(Self {
            payload: decode(raw.payload)?,
            id: raw.id,
            parent: raw.parent,
            modify_time: raw.modify_time,
            revision: raw.revision,
        })
    }

    /// Create a record from its parts.
    pub fn new(
        id: impl Into<String>,
        parent: impl Into<String>,
        modify_time: Timestamp,
        revision: impl Into<Revision>,
        payload: T,
    ) -> Self {
        Self {
            id: id.into(),
            parent: parent.into(),
            modify_time,
            revision: revision.into(),
            payload,
        }
    }

    /// Identity of the record.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Parent key the record is grouped under.
    #[inline]
    pub fn parent(&self) -> &str {
        &self.parent
    }

    /// Store modification time.
    #[inline]
    pub fn modify_time(&self) -> Timestamp {
        self.modify_time
    }

    /// Record revision.
    #[inline]
    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    /// Decoded payload.
    #[inline]
    pub fn payload(&self) -> &T {
        &self.payload
    }
}

/// The latest aggregate revision of every record under a parent key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRecord {
    /// Parent key.
    pub parent: String,
    /// Aggregate revision.
    pub revision: Revision,
}

impl RevisionRecord {
    /// Create a revision record.
    pub fn new(parent: impl Into<String>, revision: impl Into<Revision>) -> Self {
        Self {
            parent: parent.into(),
            revision: revision.into(),
        }
    }
}

/// Result of one `fetch_changed` round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchBatch<P> {
    /// Changed rows, valid and invalid.
    pub records: Vec<RawRecord<P>>,
    /// Parent revisions to overwrite.
    pub revisions: Vec<RevisionRecord>,
}

impl<P> Default for FetchBatch<P> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<P> FetchBatch<P> {
    /// Create a batch.
    pub fn new(records: Vec<RawRecord<P>>, revisions: Vec<RevisionRecord>) -> Self {
        Self { records, revisions }
    }

    /// A batch with nothing in it.
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            revisions: Vec::new(),
        }
    }

    /// Check if the store reported no changes at all.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.revisions.is_empty()
    }

    /// Largest modification time among the rows, if any.
    pub fn max_modify_time(&self) -> Option<Timestamp> {
        self.records.iter().map(|r| r.modify_time).max()
    }
}
