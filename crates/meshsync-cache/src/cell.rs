//! Shared home of the record and revision indexes.
//!
//! Both indexes form one unit: a batch lands in both or in neither, and a
//! reader sees one consistent state for the duration of a query. The
//! generation counter changes on every reset so an apply prepared against an
//! older generation can tell that the index it targeted is gone.

use std::sync::Arc;

use meshsync_core::{Record, RevisionRecord};
use parking_lot::RwLock;

use crate::config::IndexMode;
use crate::index::{Change, IndexViolation, RecordIndex};
use crate::revision::RevisionIndex;

/// One decoded mutation from a fetched batch.
#[derive(Debug)]
pub(crate) enum Op<T> {
    Upsert(Record<T>),
    Remove(String),
}

/// What one apply did.
#[derive(Debug, Default)]
pub(crate) struct ApplyReport {
    pub inserted: usize,
    pub replaced: usize,
    pub moved: usize,
    pub removed: usize,
    pub revisions_applied: usize,
    /// Parents whose revision token was empty.
    pub revisions_rejected: Vec<String>,
    pub violations: Vec<IndexViolation>,
}

impl ApplyReport {
    pub fn upserted(&self) -> usize {
        self.inserted + self.replaced + self.moved
    }
}

pub(crate) struct IndexState<T> {
    pub records: RecordIndex<T>,
    pub revisions: RevisionIndex,
    pub generation: u64,
}

impl<T> Clone for IndexState<T> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            revisions: self.revisions.clone(),
            generation: self.generation,
        }
    }
}

impl<T> IndexState<T> {
    fn empty(generation: u64) -> Self {
        Self {
            records: RecordIndex::new(),
            revisions: RevisionIndex::new(),
            generation,
        }
    }

    /// Apply a batch in order. Violations are collected, never fatal.
    fn apply(&mut self, ops: Vec<Op<T>>, revisions: Vec<RevisionRecord>) -> ApplyReport {
        let mut report = ApplyReport::default();

        for op in ops {
            match op {
                Op::Upsert(record) => match self.records.upsert(record) {
                    Ok(Change::Inserted) => report.inserted += 1,
                    Ok(Change::Replaced) => report.replaced += 1,
                    Ok(Change::Moved) => report.moved += 1,
                    Err(violation) => report.violations.push(violation),
                },
                Op::Remove(id) => match self.records.remove(&id) {
                    Ok(Some(_)) => report.removed += 1,
                    Ok(None) => {}
                    Err(violation) => {
                        report.removed += 1;
                        report.violations.push(violation);
                    }
                },
            }
        }

        for RevisionRecord { parent, revision } in revisions {
            if self.revisions.set(parent.as_str(), revision) {
                report.revisions_applied += 1;
            } else {
                report.revisions_rejected.push(parent);
            }
        }

        report
    }
}

/// The index unit under one of the two sharing strategies.
pub(crate) enum IndexCell<T> {
    /// Mutated in place under an exclusive lock.
    Locked(RwLock<IndexState<T>>),
    /// Replaced wholesale; the lock only guards the pointer.
    CopyOnWrite(RwLock<Arc<IndexState<T>>>),
}

impl<T> IndexCell<T> {
    pub fn new(mode: IndexMode) -> Self {
        match mode {
            IndexMode::Locked => Self::Locked(RwLock::new(IndexState::empty(0))),
            IndexMode::CopyOnWrite => Self::CopyOnWrite(RwLock::new(Arc::new(IndexState::empty(0)))),
        }
    }

    pub fn mode(&self) -> IndexMode {
        match self {
            Self::Locked(_) => IndexMode::Locked,
            Self::CopyOnWrite(_) => IndexMode::CopyOnWrite,
        }
    }

    /// Run `f` against one consistent state.
    ///
    /// In locked mode `f` runs under the shared lock, so it must not call
    /// back into anything that takes the lock exclusively.
    pub fn read<R>(&self, f: impl FnOnce(&IndexState<T>) -> R) -> R {
        match self {
            Self::Locked(lock) => f(&lock.read()),
            Self::CopyOnWrite(slot) => {
                let snapshot = Arc::clone(&slot.read());
                f(&snapshot)
            }
        }
    }

    /// Apply a batch if the index is still at `generation`.
    ///
    /// Returns `None` when a reset moved the generation on, in which case
    /// nothing was applied.
    pub fn apply(
        &self,
        generation: u64,
        ops: Vec<Op<T>>,
        revisions: Vec<RevisionRecord>,
    ) -> Option<ApplyReport> {
        match self {
            Self::Locked(lock) => {
                let mut state = lock.write();
                if state.generation != generation {
                    return None;
                }
                Some(state.apply(ops, revisions))
            }
            Self::CopyOnWrite(slot) => {
                let current = Arc::clone(&slot.read());
                if current.generation != generation {
                    return None;
                }

                let mut next = IndexState::clone(&current);
                let report = next.apply(ops, revisions);

                let mut published = slot.write();
                if !Arc::ptr_eq(&published, &current) {
                    return None;
                }
                *published = Arc::new(next);
                Some(report)
            }
        }
    }

    /// Clear both indexes and move to a new generation, which is returned.
    pub fn reset(&self) -> u64 {
        match self {
            Self::Locked(lock) => {
                let mut state = lock.write();
                state.records.clear();
                state.revisions.clear();
                state.generation += 1;
                state.generation
            }
            Self::CopyOnWrite(slot) => {
                let mut published = slot.write();
                let generation = published.generation + 1;
                *published = Arc::new(IndexState::empty(generation));
                generation
            }
        }
    }
}
