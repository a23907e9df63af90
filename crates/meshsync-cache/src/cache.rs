//! The per-resource cache: sync engine plus query surface.
//!
//! A [`ResourceCache`] mirrors one resource type of the backing store. The
//! refresh cycle pulls changed rows through its [`ChangeSource`], decodes them
//! outside any lock and applies the whole batch in one exclusive step.
//! Readers query the in-memory indexes and never touch the store.
//!
//! ## Lock order
//!
//! The cycle mutex serializes refreshes. Inside a cycle the index is taken
//! before the sync metadata, never both at once while awaiting. No lock is
//! held across a store round trip.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use meshsync_core::{
    BoxError, ChangeSource, FetchBatch, RawRecord, Record, ResourceKind, ResourceType, Revision,
    SyncError, SyncResult, Timestamp,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::cell::{ApplyReport, IndexCell, Op};
use crate::config::{CacheConfig, IndexMode};
use crate::cursor::Cursor;
use crate::index::{IndexViolation, SharedRecord};
use crate::stats::CacheStats;

/// Result of a refresh cycle that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A non-empty batch was applied.
    Applied(RefreshSummary),
    /// The store reported no changes.
    Unchanged {
        /// Whether this cycle completed the first load.
        first_load: bool,
    },
    /// A reset ran while the cycle was in flight; the batch was dropped.
    Discarded,
}

impl RefreshOutcome {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied(_) => "applied",
            Self::Unchanged { .. } => "unchanged",
            Self::Discarded => "discarded",
        }
    }

    /// Whether this cycle took the cache from first-load state to loaded.
    ///
    /// Decided under the cycle lock, so exactly one cycle after construction
    /// or each reset reports it.
    pub fn completed_first_load(&self) -> bool {
        match self {
            Self::Applied(summary) => summary.first_load,
            Self::Unchanged { first_load } => *first_load,
            Self::Discarded => false,
        }
    }
}

/// What an applied batch changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Whether this cycle completed the first load.
    pub first_load: bool,
    /// Records inserted, replaced or moved.
    pub upserted: usize,
    /// Records evicted.
    pub removed: usize,
    /// Revision tokens written.
    pub revisions: usize,
    /// Records skipped because they did not decode.
    pub malformed: usize,
    /// Index inconsistencies found and repaired.
    pub violations: usize,
    /// Cursor after the cycle.
    pub cursor: Timestamp,
}

#[derive(Debug)]
struct SyncMeta {
    cursor: Cursor,
    loaded: bool,
    generation: u64,
    last_store_time: Option<Timestamp>,
}

/// An incrementally synchronized cache for one resource type.
///
/// ## Thread Safety
///
/// All methods take `&self`. Share the cache behind an [`Arc`]; any number of
/// readers may query it while one refresh loop keeps it current.
pub struct ResourceCache<K: ResourceKind> {
    resource: ResourceType,
    config: CacheConfig,
    source: Arc<dyn ChangeSource<K>>,
    index: IndexCell<K::Payload>,
    meta: Mutex<SyncMeta>,
    cycle: tokio::sync::Mutex<()>,
    stats: CacheStats,
}

impl<K: ResourceKind> ResourceCache<K> {
    /// Create an empty cache bound to `source`.
    ///
    /// Fails with [`SyncError::Configuration`] if `config` does not validate.
    /// No store call is made; the first [`refresh`](Self::refresh) performs
    /// the full load.
    pub fn initialize(config: CacheConfig, source: Arc<dyn ChangeSource<K>>) -> SyncResult<Self> {
        config.validate()?;

        let resource = K::resource_type();
        debug!(
            resource = %resource,
            index_mode = ?config.index_mode,
            refresh_interval = ?config.refresh_interval,
            "initialized cache"
        );

        Ok(Self {
            index: IndexCell::new(config.index_mode),
            resource,
            config,
            source,
            meta: Mutex::new(SyncMeta {
                cursor: Cursor::new(),
                loaded: false,
                generation: 0,
                last_store_time: None,
            }),
            cycle: tokio::sync::Mutex::new(()),
            stats: CacheStats::new(),
        })
    }

    /// Run one cycle from the cache's own cursor, less the rollback window.
    pub async fn refresh(&self) -> SyncResult<RefreshOutcome> {
        self.run_cycle(None).await
    }

    /// Run one cycle with an explicit cursor.
    ///
    /// The cursor is ignored by the store while the cache has not completed
    /// its first load.
    pub async fn refresh_from(&self, cursor: Timestamp) -> SyncResult<RefreshOutcome> {
        self.run_cycle(Some(cursor)).await
    }

    async fn run_cycle(&self, cursor: Option<Timestamp>) -> SyncResult<RefreshOutcome> {
        let _cycle = self.cycle.lock().await;
        let started = Instant::now();

        let (generation, full_load, cursor) = {
            let meta = self.meta.lock();
            let cursor =
                cursor.unwrap_or_else(|| meta.cursor.fetch_position(self.config.store_rollback));
            (meta.generation, !meta.loaded, cursor)
        };

        let fetched = match self.sample_and_fetch(cursor, full_load).await {
            Ok(fetched) => fetched,
            Err(err) => {
                self.stats.record_cycle_failed();
                warn!(
                    resource = %self.resource,
                    cursor = %cursor,
                    first_load = full_load,
                    error = %err,
                    "refresh cycle failed"
                );
                return Err(err);
            }
        };
        let (store_time, batch) = fetched;

        if batch.is_empty() {
            let Some(first_load) = self.commit_meta(generation, store_time, None) else {
                return Ok(self.discarded(cursor));
            };
            self.stats.record_cycle_succeeded();
            if first_load {
                info!(resource = %self.resource, records = 0, "first load complete");
            }
            trace!(resource = %self.resource, cursor = %cursor, "no changes");
            return Ok(RefreshOutcome::Unchanged { first_load });
        }

        let observed = batch.max_modify_time();
        if let Some(observed) = observed {
            self.check_clock(observed, store_time);
        }

        let FetchBatch { records, revisions } = batch;
        let (ops, malformed) = self.decode_batch(records);

        let Some(report) = self.index.apply(generation, ops, revisions) else {
            return Ok(self.discarded(cursor));
        };
        self.report_apply(&report, malformed);

        let Some(first_load) = self.commit_meta(generation, store_time, observed) else {
            return Ok(self.discarded(cursor));
        };
        self.stats.record_cycle_succeeded();

        let summary = RefreshSummary {
            first_load,
            upserted: report.upserted(),
            removed: report.removed,
            revisions: report.revisions_applied,
            malformed,
            violations: report.violations.len(),
            cursor: self.cursor(),
        };

        debug!(
            resource = %self.resource,
            first_load,
            upserted = summary.upserted,
            removed = summary.removed,
            revisions = summary.revisions,
            malformed,
            cursor = %summary.cursor,
            elapsed = ?started.elapsed(),
            "applied batch"
        );
        if first_load {
            info!(resource = %self.resource, records = self.count(), "first load complete");
        }

        Ok(RefreshOutcome::Applied(summary))
    }

    async fn sample_and_fetch(
        &self,
        cursor: Timestamp,
        first_load: bool,
    ) -> SyncResult<(Timestamp, FetchBatch<K::Raw>)> {
        let store_time = self
            .round_trip("server_unix_time", self.source.server_unix_time())
            .await?;
        let batch = self
            .round_trip("fetch_changed", self.source.fetch_changed(cursor, first_load))
            .await?;
        Ok((store_time, batch))
    }

    async fn round_trip<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, BoxError>>,
    ) -> SyncResult<T> {
        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(SyncError::store_unavailable(
                self.resource.clone(),
                format!("{operation} failed"),
                source,
            )),
            Err(_) => Err(SyncError::Timeout {
                resource: self.resource.clone(),
                operation,
                elapsed: self.config.request_timeout,
            }),
        }
    }

    /// Turn raw rows into index mutations, skipping rows that do not decode.
    fn decode_batch(&self, records: Vec<RawRecord<K::Raw>>) -> (Vec<Op<K::Payload>>, usize) {
        let mut ops = Vec::with_capacity(records.len());
        let mut malformed = 0usize;

        for raw in records {
            if !raw.valid {
                ops.push(Op::Remove(raw.id));
                continue;
            }
            match K::decode(raw.payload) {
                Ok(payload) => ops.push(Op::Upsert(Record::new(
                    raw.id,
                    raw.parent,
                    raw.modify_time,
                    raw.revision,
                    payload,
                ))),
                Err(source) => {
                    malformed += 1;
                    let err = SyncError::MalformedRecord {
                        resource: self.resource.clone(),
                        id: raw.id,
                        source,
                    };
                    warn!(resource = %self.resource, parent = %raw.parent, error = %err, "skipping record");
                }
            }
        }

        (ops, malformed)
    }

    fn check_clock(&self, observed: Timestamp, store_time: Timestamp) {
        let limit = store_time.saturating_add(self.config.clock_skew_tolerance);
        if observed > limit {
            self.stats.record_clock_anomaly();
            warn!(
                resource = %self.resource,
                modify_time = %observed,
                store_time = %store_time,
                tolerance = ?self.config.clock_skew_tolerance,
                "record modified ahead of store clock"
            );
        }
    }

    fn report_apply(&self, report: &ApplyReport, malformed: usize) {
        self.stats.record_upserts(report.upserted() as u64);
        self.stats.record_removals(report.removed as u64);
        self.stats.record_revisions(
            report.revisions_applied as u64,
            report.revisions_rejected.len() as u64,
        );
        self.stats.record_malformed(malformed as u64);
        self.stats.record_violations(report.violations.len() as u64);

        for parent in &report.revisions_rejected {
            warn!(resource = %self.resource, parent = %parent, "ignoring empty revision token");
        }
        for IndexViolation { id, reason } in &report.violations {
            let err = SyncError::InvariantViolation {
                resource: self.resource.clone(),
                id: id.clone(),
                reason: reason.clone(),
            };
            error!(resource = %self.resource, error = %err, "evicted inconsistent entry");
        }
    }

    /// Record a committed cycle.
    ///
    /// Returns whether the cycle completed the first load, or `None` if a
    /// reset got there first.
    fn commit_meta(
        &self,
        generation: u64,
        store_time: Timestamp,
        observed: Option<Timestamp>,
    ) -> Option<bool> {
        let mut meta = self.meta.lock();
        if meta.generation != generation {
            return None;
        }
        if let Some(observed) = observed {
            meta.cursor.advance(observed);
        }
        let completed = !meta.loaded;
        meta.loaded = true;
        meta.last_store_time = Some(store_time);
        Some(completed)
    }

    fn discarded(&self, cursor: Timestamp) -> RefreshOutcome {
        self.stats.record_cycle_discarded();
        info!(resource = %self.resource, cursor = %cursor, "dropped batch fetched before reset");
        RefreshOutcome::Discarded
    }

    /// Clear both indexes and force the next cycle to fully reload.
    ///
    /// A cycle in flight when this runs drops its batch.
    pub fn reset(&self) {
        let generation = self.index.reset();
        {
            let mut meta = self.meta.lock();
            meta.generation = meta.generation.max(generation);
            meta.loaded = false;
            meta.cursor.reset();
        }
        self.stats.record_reset();
        info!(resource = %self.resource, generation, "cache reset");
    }

    /// Number of valid records.
    pub fn count(&self) -> usize {
        self.index.read(|state| state.records.len())
    }

    /// Number of parent keys with a known revision.
    pub fn parent_revision_count(&self) -> usize {
        self.index.read(|state| state.revisions.len())
    }

    /// Look up one record by identity.
    pub fn get(&self, id: &str) -> Option<SharedRecord<K::Payload>> {
        let record = self.index.read(|state| state.records.get(id).cloned());
        if record.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        trace!(resource = %self.resource, id, hit = record.is_some(), "get");
        record
    }

    /// Records under `parent`. Empty when the parent is unknown.
    pub fn get_by_parent(&self, parent: &str) -> Vec<SharedRecord<K::Payload>> {
        let records: Vec<_> = self.index.read(|state| {
            state
                .records
                .records_of(parent)
                .map(|(_, record)| Arc::clone(record))
                .collect()
        });
        trace!(resource = %self.resource, parent, records = records.len(), "get_by_parent");
        records
    }

    /// Latest revision of `parent`. The empty revision means unknown.
    pub fn get_last_revision(&self, parent: &str) -> Revision {
        let revision = self
            .index
            .read(|state| state.revisions.get(parent).cloned());
        match revision {
            Some(revision) => {
                self.stats.record_hit();
                revision
            }
            None => {
                self.stats.record_miss();
                Revision::empty()
            }
        }
    }

    /// Visit the records under `parent` until the visitor returns `Ok(false)`
    /// or an error, which is returned unchanged.
    ///
    /// The visitor sees one consistent state. It must not call back into
    /// this cache: in [`IndexMode::Locked`] the visitor runs under the index
    /// read lock, and a nested read can deadlock behind a queued writer.
    pub fn iterate<E, F>(&self, parent: &str, mut visitor: F) -> Result<(), E>
    where
        F: FnMut(&str, &SharedRecord<K::Payload>) -> Result<bool, E>,
    {
        self.index.read(|state| {
            for (id, record) in state.records.records_of(parent) {
                if !visitor(id, record)? {
                    break;
                }
            }
            Ok(())
        })
    }

    /// Visit every record, with the same contract as [`iterate`](Self::iterate).
    pub fn iterate_all<E, F>(&self, mut visitor: F) -> Result<(), E>
    where
        F: FnMut(&str, &SharedRecord<K::Payload>) -> Result<bool, E>,
    {
        self.index.read(|state| {
            for (id, record) in state.records.iter() {
                if !visitor(id, record)? {
                    break;
                }
            }
            Ok(())
        })
    }

    /// Parent keys with at least one record.
    pub fn parents(&self) -> Vec<String> {
        self.index
            .read(|state| state.records.parents().map(str::to_string).collect())
    }

    /// Check the record index invariants.
    pub fn verify(&self) -> Vec<IndexViolation> {
        self.index.read(|state| state.records.verify())
    }

    /// `true` until a cycle completes after construction or reset.
    pub fn is_first_load(&self) -> bool {
        !self.meta.lock().loaded
    }

    /// Current cursor position.
    pub fn cursor(&self) -> Timestamp {
        self.meta.lock().cursor.position()
    }

    /// Store clock sampled by the last committed cycle.
    pub fn last_store_time(&self) -> Option<Timestamp> {
        self.meta.lock().last_store_time
    }

    /// Resource type served by this cache.
    #[inline]
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource
    }

    /// Configuration the cache was initialized with.
    #[inline]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Index sharing strategy in use.
    #[inline]
    pub fn index_mode(&self) -> IndexMode {
        self.index.mode()
    }

    /// Cache statistics.
    #[inline]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl<K: ResourceKind> fmt::Debug for ResourceCache<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("resource", &self.resource)
            .field("index_mode", &self.index.mode())
            .field("records", &self.count())
            .field("revisions", &self.parent_revision_count())
            .field("meta", &*self.meta.lock())
            .finish()
    }
}
