//! Cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for one resource-type cache.
///
/// All counters are atomic and can be safely accessed from multiple threads.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Refresh cycles that committed (including empty ones).
    cycles_succeeded: AtomicU64,
    /// Refresh cycles that failed on the store round trip.
    cycles_failed: AtomicU64,
    /// Refresh cycles whose batch was dropped because of a reset.
    cycles_discarded: AtomicU64,
    /// Records inserted or replaced.
    records_upserted: AtomicU64,
    /// Records evicted by an invalid row.
    records_removed: AtomicU64,
    /// Revision tokens written.
    revisions_applied: AtomicU64,
    /// Revision tokens rejected as empty.
    revisions_rejected: AtomicU64,
    /// Records skipped because their payload did not decode.
    malformed_records: AtomicU64,
    /// Index bookkeeping inconsistencies found and repaired.
    invariant_violations: AtomicU64,
    /// Record times ahead of the store clock.
    clock_anomalies: AtomicU64,
    /// Explicit resets.
    resets: AtomicU64,
    /// Point lookups that found a record or parent.
    query_hits: AtomicU64,
    /// Point lookups that found nothing.
    query_misses: AtomicU64,
}

impl CacheStats {
    /// Create new cache statistics.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_cycle_succeeded(&self) {
        self.cycles_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_cycle_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_cycle_discarded(&self) {
        self.cycles_discarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_upserts(&self, count: u64) {
        self.records_upserted.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_removals(&self, count: u64) {
        self.records_removed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_revisions(&self, applied: u64, rejected: u64) {
        self.revisions_applied.fetch_add(applied, Ordering::Relaxed);
        self.revisions_rejected.fetch_add(rejected, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_malformed(&self, count: u64) {
        self.malformed_records.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_violations(&self, count: u64) {
        self.invariant_violations.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_clock_anomaly(&self) {
        self.clock_anomalies.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        self.query_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        self.query_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get committed refresh cycles.
    #[inline]
    pub fn cycles_succeeded(&self) -> u64 {
        self.cycles_succeeded.load(Ordering::Relaxed)
    }

    /// Get failed refresh cycles.
    #[inline]
    pub fn cycles_failed(&self) -> u64 {
        self.cycles_failed.load(Ordering::Relaxed)
    }

    /// Get discarded refresh cycles.
    #[inline]
    pub fn cycles_discarded(&self) -> u64 {
        self.cycles_discarded.load(Ordering::Relaxed)
    }

    /// Get total records inserted or replaced.
    #[inline]
    pub fn records_upserted(&self) -> u64 {
        self.records_upserted.load(Ordering::Relaxed)
    }

    /// Get total records evicted.
    #[inline]
    pub fn records_removed(&self) -> u64 {
        self.records_removed.load(Ordering::Relaxed)
    }

    /// Get total revision tokens written.
    #[inline]
    pub fn revisions_applied(&self) -> u64 {
        self.revisions_applied.load(Ordering::Relaxed)
    }

    /// Get total empty revision tokens rejected.
    #[inline]
    pub fn revisions_rejected(&self) -> u64 {
        self.revisions_rejected.load(Ordering::Relaxed)
    }

    /// Get total malformed records skipped.
    #[inline]
    pub fn malformed_records(&self) -> u64 {
        self.malformed_records.load(Ordering::Relaxed)
    }

    /// Get total index invariant violations.
    #[inline]
    pub fn invariant_violations(&self) -> u64 {
        self.invariant_violations.load(Ordering::Relaxed)
    }

    /// Get total clock anomalies.
    #[inline]
    pub fn clock_anomalies(&self) -> u64 {
        self.clock_anomalies.load(Ordering::Relaxed)
    }

    /// Get total resets.
    #[inline]
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    /// Get total lookup hits.
    #[inline]
    pub fn query_hits(&self) -> u64 {
        self.query_hits.load(Ordering::Relaxed)
    }

    /// Get total lookup misses.
    #[inline]
    pub fn query_misses(&self) -> u64 {
        self.query_misses.load(Ordering::Relaxed)
    }

    /// Calculate lookup hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.query_hits() as f64;
        let total = hits + self.query_misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        for counter in [
            &self.cycles_succeeded,
            &self.cycles_failed,
            &self.cycles_discarded,
            &self.records_upserted,
            &self.records_removed,
            &self.revisions_applied,
            &self.revisions_rejected,
            &self.malformed_records,
            &self.invariant_violations,
            &self.clock_anomalies,
            &self.resets,
            &self.query_hits,
            &self.query_misses,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
