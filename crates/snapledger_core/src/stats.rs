//! Engine statistics.
//!
//! Counters are kept per engine and aggregated across every resource kind.
//!
//! ```rust,ignore
//! let engine = SyncEngine::new(MemoryStore::new());
//! // ... sync a few batches ...
//! let stats = engine.stats().snapshot();
//! println!("created {} updated {}", stats.records_created, stats.records_updated);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine statistics and metrics.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct EngineStats {
    // Batch counters
    /// Batches committed.
    batches_applied: AtomicU64,
    /// Batches rolled back, for any reason.
    batches_failed: AtomicU64,

    // Record counters
    /// Records seen for the first time.
    records_created: AtomicU64,
    /// Records whose state changed.
    records_updated: AtomicU64,
    /// Records observed without change.
    records_unchanged: AtomicU64,
    /// Records retired by reconciliation.
    records_retired: AtomicU64,

    // Reconciliation counters
    /// Reconciliation passes committed.
    reconciliations: AtomicU64,
    /// Reconciliation passes rolled back.
    reconciliations_failed: AtomicU64,
}

impl EngineStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    // === Increment methods (internal use) ===

    /// Records a committed batch and its per-record outcome counts.
    pub(crate) fn record_batch(&self, created: usize, updated: usize, unchanged: usize) {
        self.batches_applied.fetch_add(1, Ordering::Relaxed);
        self.records_created
            .fetch_add(created as u64, Ordering::Relaxed);
        self.records_updated
            .fetch_add(updated as u64, Ordering::Relaxed);
        self.records_unchanged
            .fetch_add(unchanged as u64, Ordering::Relaxed);
    }

    /// Records a rolled-back batch.
    pub(crate) fn record_batch_failure(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a committed reconciliation pass.
    pub(crate) fn record_reconciliation(&self, retired: usize) {
        self.reconciliations.fetch_add(1, Ordering::Relaxed);
        self.records_retired
            .fetch_add(retired as u64, Ordering::Relaxed);
    }

    /// Records a rolled-back reconciliation pass.
    pub(crate) fn record_reconciliation_failure(&self) {
        self.reconciliations_failed.fetch_add(1, Ordering::Relaxed);
    }

    // === Getter methods (public API) ===

    /// Returns the number of batches committed.
    pub fn batches_applied(&self) -> u64 {
        self.batches_applied.load(Ordering::Relaxed)
    }

    /// Returns the number of batches rolled back.
    pub fn batches_failed(&self) -> u64 {
        self.batches_failed.load(Ordering::Relaxed)
    }

    /// Returns the number of records created.
    pub fn records_created(&self) -> u64 {
        self.records_created.load(Ordering::Relaxed)
    }

    /// Returns the number of records updated.
    pub fn records_updated(&self) -> u64 {
        self.records_updated.load(Ordering::Relaxed)
    }

    /// Returns the number of records observed without change.
    ///
    /// On a steady-state inventory this dominates every other counter.
    pub fn records_unchanged(&self) -> u64 {
        self.records_unchanged.load(Ordering::Relaxed)
    }

    /// Returns the number of records retired.
    pub fn records_retired(&self) -> u64 {
        self.records_retired.load(Ordering::Relaxed)
    }

    /// Returns the number of reconciliation passes committed.
    pub fn reconciliations(&self) -> u64 {
        self.reconciliations.load(Ordering::Relaxed)
    }

    /// Returns the number of reconciliation passes rolled back.
    pub fn reconciliations_failed(&self) -> u64 {
        self.reconciliations_failed.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            batches_applied: self.batches_applied(),
            batches_failed: self.batches_failed(),
            records_created: self.records_created(),
            records_updated: self.records_updated(),
            records_unchanged: self.records_unchanged(),
            records_retired: self.records_retired(),
            reconciliations: self.reconciliations(),
            reconciliations_failed: self.reconciliations_failed(),
        }
    }
}

/// A point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Batches committed.
    pub batches_applied: u64,
    /// Batches rolled back.
    pub batches_failed: u64,
    /// Records created.
    pub records_created: u64,
    /// Records updated.
    pub records_updated: u64,
    /// Records observed without change.
    pub records_unchanged: u64,
    /// Records retired.
    pub records_retired: u64,
    /// Reconciliation passes committed.
    pub reconciliations: u64,
    /// Reconciliation passes rolled back.
    pub reconciliations_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = EngineStats::new();
        stats.record_batch(2, 1, 5);
        stats.record_batch(0, 0, 8);
        stats.record_batch_failure();
        stats.record_reconciliation(3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.batches_applied, 2);
        assert_eq!(snapshot.batches_failed, 1);
        assert_eq!(snapshot.records_created, 2);
        assert_eq!(snapshot.records_updated, 1);
        assert_eq!(snapshot.records_unchanged, 13);
        assert_eq!(snapshot.records_retired, 3);
        assert_eq!(snapshot.reconciliations, 1);
        assert_eq!(snapshot.reconciliations_failed, 0);
    }

    #[test]
    fn new_stats_are_zero() {
        assert_eq!(EngineStats::new().snapshot(), StatsSnapshot::default());
    }
}
