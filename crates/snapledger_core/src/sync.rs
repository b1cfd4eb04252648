//! Synchronizer: applies one collection run of one resource kind.
//!
//! Per snapshot, inside the caller's transaction:
//!
//! 1. Load the stored current record.
//! 2. Diff it against the snapshot.
//! 3. Unchanged: bump `collected_at` only, no history write.
//! 4. New: insert the current record, open the first interval.
//! 5. Changed: overwrite the current record (keeping `first_collected_at`),
//!    close the open interval and open the next one.
//!
//! The whole batch is validated before the first write.

use snapledger_storage::{
    CanonicalSnapshot, CurrentRecord, ResourceKind, StoreTransaction, Timestamp,
};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::diff::diff;
use crate::error::{CoreError, CoreResult};
use crate::ledger::{create_history, update_history};
use crate::schema::ResourceSchema;

/// One collection run of one resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncBatch {
    /// When the run collected its snapshots. Every snapshot carries the same
    /// timestamp.
    pub collected_at: Timestamp,
    /// Snapshots, at most one per resource id.
    pub snapshots: Vec<CanonicalSnapshot>,
}

impl SyncBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new(collected_at: Timestamp) -> Self {
        Self {
            collected_at,
            snapshots: Vec::new(),
        }
    }

    /// Creates a batch from already-collected snapshots.
    #[must_use]
    pub fn from_snapshots(collected_at: Timestamp, snapshots: Vec<CanonicalSnapshot>) -> Self {
        Self {
            collected_at,
            snapshots,
        }
    }

    /// Appends a snapshot.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: CanonicalSnapshot) -> Self {
        self.snapshots.push(snapshot);
        self
    }

    /// Returns the number of snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns true if the batch has no snapshots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Outcome of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Kind the batch was applied to.
    pub kind: ResourceKind,
    /// The batch's collection timestamp.
    pub collected_at: Timestamp,
    /// Records seen for the first time.
    pub created: usize,
    /// Records whose state changed.
    pub updated: usize,
    /// Records observed without change.
    pub unchanged: usize,
    /// Wall time spent, including commit.
    pub duration: Duration,
}

impl SyncReport {
    /// Returns the number of snapshots applied.
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged
    }

    /// Returns true if any history row was written.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.created > 0 || self.updated > 0
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchCounts {
    pub(crate) created: usize,
    pub(crate) updated: usize,
    pub(crate) unchanged: usize,
}

/// Rejects a malformed batch before anything is written.
pub(crate) fn validate_batch(
    schema: &ResourceSchema,
    config: &EngineConfig,
    batch: &SyncBatch,
) -> CoreResult<()> {
    let kind = &schema.kind;
    if let Some(limit) = config.max_batch_size {
        if batch.len() > limit {
            return Err(CoreError::BatchTooLarge {
                kind: kind.clone(),
                size: batch.len(),
                limit,
            });
        }
    }

    let mut seen = BTreeSet::new();
    for snapshot in &batch.snapshots {
        schema.check_snapshot(snapshot)?;
        if snapshot.collected_at != batch.collected_at {
            return Err(CoreError::CollectedAtMismatch {
                kind: kind.clone(),
                resource_id: snapshot.resource_id.clone(),
                expected: batch.collected_at,
                actual: snapshot.collected_at,
            });
        }
        if !seen.insert(snapshot.resource_id.as_str()) {
            return Err(CoreError::DuplicateResourceId {
                kind: kind.clone(),
                resource_id: snapshot.resource_id.clone(),
            });
        }
    }
    Ok(())
}

/// Applies a validated batch inside `txn`.
///
/// `valid_at` opens and closes the history intervals written by this batch.
pub(crate) fn apply_batch<T>(
    txn: &mut T,
    schema: &ResourceSchema,
    config: &EngineConfig,
    batch: &SyncBatch,
    valid_at: Timestamp,
) -> CoreResult<BatchCounts>
where
    T: StoreTransaction + ?Sized,
{
    let kind = &schema.kind;
    advance_watermark(txn, kind, config, batch.collected_at)?;

    let mut counts = BatchCounts::default();
    let mut untouched = Vec::new();

    for snapshot in &batch.snapshots {
        let existing = txn.get_current(kind, &snapshot.resource_id)?;
        let d = diff(schema, existing.as_ref(), snapshot);

        match existing {
            None => {
                txn.insert_current(kind, CurrentRecord::from_snapshot(snapshot))?;
                create_history(txn, kind, snapshot, valid_at)?;
                tracing::debug!(%kind, resource_id = %snapshot.resource_id, "created");
                counts.created += 1;
            }
            Some(old) if d.is_changed => {
                let record = CurrentRecord {
                    resource_id: old.resource_id.clone(),
                    fields: snapshot.fields.clone(),
                    children: snapshot.children.clone(),
                    collected_at: snapshot.collected_at,
                    first_collected_at: old.first_collected_at,
                };
                txn.replace_current(kind, record)?;
                update_history(txn, kind, &old, snapshot, valid_at)?;
                let children: Vec<&str> = d.changed_children().collect();
                tracing::debug!(
                    %kind,
                    resource_id = %snapshot.resource_id,
                    fields = ?d.changed_fields,
                    children = ?children,
                    "updated"
                );
                counts.updated += 1;
            }
            Some(_) => {
                if config.batch_touches {
                    untouched.push(snapshot.resource_id.clone());
                } else {
                    let id = std::slice::from_ref(&snapshot.resource_id);
                    txn.touch_current(kind, id, batch.collected_at)?;
                }
                counts.unchanged += 1;
            }
        }
    }

    if !untouched.is_empty() {
        let touched = txn.touch_current(kind, &untouched, batch.collected_at)?;
        tracing::trace!(%kind, touched, "touched unchanged records");
    }

    Ok(counts)
}

fn advance_watermark<T>(
    txn: &mut T,
    kind: &ResourceKind,
    config: &EngineConfig,
    collected_at: Timestamp,
) -> CoreResult<()>
where
    T: StoreTransaction + ?Sized,
{
    match txn.high_watermark(kind)? {
        Some(high) if collected_at < high => {
            if config.reject_out_of_order {
                return Err(CoreError::OutOfOrderBatch {
                    kind: kind.clone(),
                    collected_at,
                    high_watermark: high,
                });
            }
            tracing::warn!(%kind, %collected_at, %high, "applying out-of-order batch");
            Ok(())
        }
        Some(high) if collected_at == high => Ok(()),
        _ => Ok(txn.set_high_watermark(kind, collected_at)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ChildSpec, FieldSpec};
    use chrono::{TimeZone, Utc};
    use snapledger_storage::{ChildRecord, FieldValue, MemoryStore, SnapshotStore};

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn schema() -> ResourceSchema {
        ResourceSchema::new("storage.bucket")
            .with_field(FieldSpec::new("region").required())
            .with_children(ChildSpec::new("labels", ["key"]))
    }

    fn bucket(id: &str, at: i64, region: &str) -> CanonicalSnapshot {
        CanonicalSnapshot::new(id, ts(at)).with_field("region", region)
    }

    fn apply(store: &MemoryStore, config: &EngineConfig, batch: &SyncBatch) -> CoreResult<BatchCounts> {
        let schema = schema();
        validate_batch(&schema, config, batch)?;
        let mut txn = store.begin()?;
        let counts = apply_batch(&mut txn, &schema, config, batch, batch.collected_at)?;
        store.commit(txn)?;
        Ok(counts)
    }

    #[test]
    fn validation_rejects_bad_batches() {
        let schema = schema();
        let config = EngineConfig::default();

        let duplicate = SyncBatch::new(ts(1))
            .with_snapshot(bucket("b-1", 1, "eu"))
            .with_snapshot(bucket("b-1", 1, "us"));
        assert!(matches!(
            validate_batch(&schema, &config, &duplicate),
            Err(CoreError::DuplicateResourceId { .. })
        ));

        let skewed = SyncBatch::new(ts(1)).with_snapshot(bucket("b-1", 2, "eu"));
        assert!(matches!(
            validate_batch(&schema, &config, &skewed),
            Err(CoreError::CollectedAtMismatch { .. })
        ));

        let missing = SyncBatch::new(ts(1)).with_snapshot(CanonicalSnapshot::new("b-1", ts(1)));
        assert!(matches!(
            validate_batch(&schema, &config, &missing),
            Err(CoreError::InvalidSnapshot { .. })
        ));

        let large = SyncBatch::new(ts(1))
            .with_snapshot(bucket("b-1", 1, "eu"))
            .with_snapshot(bucket("b-2", 1, "eu"));
        assert!(matches!(
            validate_batch(&schema, &config.clone().max_batch_size(1), &large),
            Err(CoreError::BatchTooLarge { size: 2, limit: 1, .. })
        ));
    }

    #[test]
    fn counts_each_outcome() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();

        let first = SyncBatch::new(ts(1))
            .with_snapshot(bucket("b-1", 1, "eu"))
            .with_snapshot(bucket("b-2", 1, "eu"));
        let counts = apply(&store, &config, &first).unwrap();
        assert_eq!((counts.created, counts.updated, counts.unchanged), (2, 0, 0));

        let second = SyncBatch::new(ts(2))
            .with_snapshot(bucket("b-1", 2, "eu"))
            .with_snapshot(bucket("b-2", 2, "us"))
            .with_snapshot(bucket("b-3", 2, "us"));
        let counts = apply(&store, &config, &second).unwrap();
        assert_eq!((counts.created, counts.updated, counts.unchanged), (1, 1, 1));
    }

    #[test]
    fn unchanged_records_are_touched_either_way() {
        for batch_touches in [true, false] {
            let store = MemoryStore::new();
            let config = EngineConfig::default().batch_touches(batch_touches);
            let kind = schema().kind;

            apply(&store, &config, &SyncBatch::new(ts(1)).with_snapshot(bucket("b-1", 1, "eu"))).unwrap();
            apply(&store, &config, &SyncBatch::new(ts(5)).with_snapshot(bucket("b-1", 5, "eu"))).unwrap();

            let mut txn = store.begin().unwrap();
            let current = txn.get_current(&kind, "b-1").unwrap().unwrap();
            assert_eq!(current.collected_at, ts(5));
            assert_eq!(current.first_collected_at, ts(1));
            assert_eq!(txn.history_for(&kind, "b-1").unwrap().len(), 1);
        }
    }

    #[test]
    fn changed_children_replace_current() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let kind = schema().kind;
        let label = |v: &str| {
            ChildRecord::from([
                ("key".to_string(), FieldValue::from("team")),
                ("value".to_string(), FieldValue::from(v)),
            ])
        };

        let first = bucket("b-1", 1, "eu").with_child("labels", label("core"));
        apply(&store, &config, &SyncBatch::new(ts(1)).with_snapshot(first)).unwrap();
        let second = bucket("b-1", 2, "eu").with_child("labels", label("data"));
        let counts = apply(&store, &config, &SyncBatch::new(ts(2)).with_snapshot(second)).unwrap();
        assert_eq!(counts.updated, 1);

        let mut txn = store.begin().unwrap();
        let current = txn.get_current(&kind, "b-1").unwrap().unwrap();
        assert_eq!(current.children["labels"], vec![label("data")]);
    }

    #[test]
    fn watermark_rules() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let kind = schema().kind;

        apply(&store, &config, &SyncBatch::new(ts(10))).unwrap();
        let mut txn = store.begin().unwrap();
        assert_eq!(txn.high_watermark(&kind).unwrap(), Some(ts(10)));
        drop(txn);

        // A retry of the same run is fine, an older run is not.
        apply(&store, &config, &SyncBatch::new(ts(10))).unwrap();
        let err = apply(&store, &config, &SyncBatch::new(ts(9))).unwrap_err();
        assert!(matches!(err, CoreError::OutOfOrderBatch { .. }));

        let lenient = config.reject_out_of_order(false);
        apply(&store, &lenient, &SyncBatch::new(ts(9))).unwrap();
        let mut txn = store.begin().unwrap();
        assert_eq!(txn.high_watermark(&kind).unwrap(), Some(ts(10)));
    }

    #[test]
    fn report_totals() {
        let report = SyncReport {
            kind: ResourceKind::new("vm"),
            collected_at: ts(1),
            created: 1,
            updated: 0,
            unchanged: 4,
            duration: Duration::from_millis(3),
        };
        assert_eq!(report.total(), 5);
        assert!(report.has_changes());
    }
}
