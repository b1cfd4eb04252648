//! In-memory store.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::partition::Partition;
use crate::record::{CurrentRecord, HistoryRecord, ResourceKind, Timestamp};
use crate::store::{SnapshotStore, StoreTransaction};

pub(crate) type Partitions = BTreeMap<ResourceKind, Arc<Partition>>;

/// An in-memory store.
///
/// This store keeps every table in memory and is suitable for:
/// - Unit and integration tests
/// - Ephemeral engines that rebuild state on start
///
/// # Transactions
///
/// `begin()` takes a cheap snapshot of every partition. The first write to a
/// partition copies it into the transaction, so staged writes are invisible
/// to everyone else until `commit()` swaps the touched partitions in at once.
/// Dropping a transaction discards its copies.
///
/// # Thread Safety
///
/// The store is thread-safe and can be shared across threads. Transactions
/// on different kinds commit independently; two transactions writing the
/// same kind conflict and the later commit fails with
/// [`StorageError::Conflict`].
///
/// # Example
///
/// ```rust
/// use snapledger_storage::{CanonicalSnapshot, CurrentRecord, MemoryStore, ResourceKind};
/// use snapledger_storage::{SnapshotStore, StoreTransaction};
///
/// let store = MemoryStore::new();
/// let kind = ResourceKind::new("compute.instance");
/// let snapshot = CanonicalSnapshot::new("vm-1", chrono::Utc::now());
///
/// let mut txn = store.begin().unwrap();
/// txn.insert_current(&kind, CurrentRecord::from_snapshot(&snapshot)).unwrap();
/// store.commit(txn).unwrap();
///
/// let mut read = store.begin().unwrap();
/// assert!(read.get_current(&kind, "vm-1").unwrap().is_some());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    partitions: RwLock<Partitions>,
    next_txn_id: AtomicU64,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from previously persisted partitions.
    pub(crate) fn with_partitions(partitions: Partitions) -> Self {
        Self {
            partitions: RwLock::new(partitions),
            next_txn_id: AtomicU64::new(0),
        }
    }

    /// Commits a transaction, handing the would-be state to `persist` before
    /// it becomes visible. If `persist` fails nothing changes.
    pub(crate) fn commit_with<F>(&self, txn: MemoryTransaction, persist: F) -> StorageResult<()>
    where
        F: FnOnce(&Partitions) -> StorageResult<()>,
    {
        let MemoryTransaction {
            id,
            mut staged,
            written,
        } = txn;

        if written.is_empty() {
            tracing::trace!(txn = id, "read-only transaction committed");
            return Ok(());
        }

        let mut partitions = self.partitions.write();

        for kind in &written {
            let committed = partitions.get(kind).map_or(0, |p| p.version);
            let base = staged.get(kind).map_or(0, |p| p.version);
            if committed != base {
                tracing::debug!(txn = id, %kind, committed, base, "commit conflict");
                return Err(StorageError::Conflict { kind: kind.clone() });
            }
        }

        let mut next = partitions.clone();
        for kind in written {
            if let Some(mut partition) = staged.remove(&kind) {
                Arc::make_mut(&mut partition).version += 1;
                next.insert(kind, partition);
            }
        }

        persist(&next)?;
        *partitions = next;
        tracing::trace!(txn = id, "transaction committed");
        Ok(())
    }
}

impl SnapshotStore for MemoryStore {
    type Transaction = MemoryTransaction;

    fn begin(&self) -> StorageResult<MemoryTransaction> {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MemoryTransaction {
            id,
            staged: self.partitions.read().clone(),
            written: BTreeSet::new(),
        })
    }

    fn commit(&self, txn: MemoryTransaction) -> StorageResult<()> {
        self.commit_with(txn, |_| Ok(()))
    }

    fn abort(&self, txn: MemoryTransaction) -> StorageResult<()> {
        tracing::trace!(txn = txn.id, writes = txn.written.len(), "transaction aborted");
        Ok(())
    }
}

/// A transaction against a [`MemoryStore`] or [`FileStore`](crate::FileStore).
#[derive(Debug)]
pub struct MemoryTransaction {
    id: u64,
    /// Snapshot taken at `begin()`, with written partitions copied in place.
    staged: Partitions,
    /// Partitions this transaction has written.
    written: BTreeSet<ResourceKind>,
}

impl MemoryTransaction {
    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns true if this transaction has staged any write.
    #[must_use]
    pub fn has_writes(&self) -> bool {
        !self.written.is_empty()
    }

    fn partition(&self, kind: &ResourceKind) -> Option<&Partition> {
        self.staged.get(kind).map(Arc::as_ref)
    }

    fn partition_mut(&mut self, kind: &ResourceKind) -> &mut Partition {
        self.written.insert(kind.clone());
        let shared = self.staged.entry(kind.clone()).or_default();
        Arc::make_mut(shared)
    }
}

impl StoreTransaction for MemoryTransaction {
    fn get_current(
        &mut self,
        kind: &ResourceKind,
        resource_id: &str,
    ) -> StorageResult<Option<CurrentRecord>> {
        Ok(self
            .partition(kind)
            .and_then(|p| p.get_current(resource_id))
            .cloned())
    }

    fn insert_current(&mut self, kind: &ResourceKind, record: CurrentRecord) -> StorageResult<()> {
        self.partition_mut(kind).insert_current(kind, record)
    }

    fn replace_current(
        &mut self,
        kind: &ResourceKind,
        record: CurrentRecord,
    ) -> StorageResult<()> {
        self.partition_mut(kind).replace_current(kind, record)
    }

    fn touch_current(
        &mut self,
        kind: &ResourceKind,
        resource_ids: &[String],
        collected_at: Timestamp,
    ) -> StorageResult<usize> {
        if resource_ids.is_empty() {
            return Ok(0);
        }
        Ok(self
            .partition_mut(kind)
            .touch_current(resource_ids, collected_at))
    }

    fn delete_current(&mut self, kind: &ResourceKind, resource_id: &str) -> StorageResult<bool> {
        Ok(self.partition_mut(kind).delete_current(resource_id))
    }

    fn stale_current(
        &mut self,
        kind: &ResourceKind,
        watermark: Timestamp,
    ) -> StorageResult<Vec<String>> {
        Ok(self
            .partition(kind)
            .map(|p| p.stale_current(watermark))
            .unwrap_or_default())
    }

    fn list_current(&mut self, kind: &ResourceKind) -> StorageResult<Vec<CurrentRecord>> {
        Ok(self
            .partition(kind)
            .map(|p| p.current.values().cloned().collect())
            .unwrap_or_default())
    }

    fn insert_history(&mut self, kind: &ResourceKind, record: HistoryRecord) -> StorageResult<()> {
        self.partition_mut(kind).insert_history(kind, record)
    }

    fn open_history(
        &mut self,
        kind: &ResourceKind,
        resource_id: &str,
    ) -> StorageResult<Option<HistoryRecord>> {
        Ok(self
            .partition(kind)
            .and_then(|p| p.open_history(resource_id))
            .cloned())
    }

    fn close_history(
        &mut self,
        kind: &ResourceKind,
        history_id: Uuid,
        valid_to: Timestamp,
    ) -> StorageResult<()> {
        self.partition_mut(kind)
            .close_history(kind, history_id, valid_to)
    }

    fn history_for(
        &mut self,
        kind: &ResourceKind,
        resource_id: &str,
    ) -> StorageResult<Vec<HistoryRecord>> {
        Ok(self
            .partition(kind)
            .map(|p| p.history_for(resource_id))
            .unwrap_or_default())
    }

    fn all_history(&mut self, kind: &ResourceKind) -> StorageResult<Vec<HistoryRecord>> {
        Ok(self
            .partition(kind)
            .map(Partition::all_history)
            .unwrap_or_default())
    }

    fn high_watermark(&mut self, kind: &ResourceKind) -> StorageResult<Option<Timestamp>> {
        Ok(self.partition(kind).and_then(|p| p.high_watermark))
    }

    fn set_high_watermark(
        &mut self,
        kind: &ResourceKind,
        watermark: Timestamp,
    ) -> StorageResult<()> {
        self.partition_mut(kind).high_watermark = Some(watermark);
        Ok(())
    }

    fn kinds(&mut self) -> StorageResult<Vec<ResourceKind>> {
        Ok(self.staged.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CanonicalSnapshot;
    use chrono::{TimeZone, Utc};

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn record(id: &str, at: i64) -> CurrentRecord {
        CurrentRecord::from_snapshot(&CanonicalSnapshot::new(id, ts(at)).with_field("state", "up"))
    }

    #[test]
    fn uncommitted_writes_are_invisible() {
        let store = MemoryStore::new();
        let kind = ResourceKind::new("lb");

        let mut writer = store.begin().unwrap();
        writer.insert_current(&kind, record("lb-1", 1)).unwrap();

        let mut reader = store.begin().unwrap();
        assert!(reader.get_current(&kind, "lb-1").unwrap().is_none());

        // Visible inside the writer
        assert!(writer.get_current(&kind, "lb-1").unwrap().is_some());

        store.commit(writer).unwrap();
        let mut reader = store.begin().unwrap();
        assert!(reader.get_current(&kind, "lb-1").unwrap().is_some());
    }

    #[test]
    fn abort_discards_writes() {
        let store = MemoryStore::new();
        let kind = ResourceKind::new("lb");

        let mut txn = store.begin().unwrap();
        txn.insert_current(&kind, record("lb-1", 1)).unwrap();
        store.abort(txn).unwrap();

        let mut reader = store.begin().unwrap();
        assert!(reader.list_current(&kind).unwrap().is_empty());
    }

    #[test]
    fn dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        let kind = ResourceKind::new("lb");
        {
            let mut txn = store.begin().unwrap();
            txn.insert_current(&kind, record("lb-1", 1)).unwrap();
        }
        let mut reader = store.begin().unwrap();
        assert!(reader.kinds().unwrap().is_empty());
    }

    #[test]
    fn concurrent_writers_on_same_kind_conflict() {
        let store = MemoryStore::new();
        let kind = ResourceKind::new("lb");

        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        first.insert_current(&kind, record("lb-1", 1)).unwrap();
        second.insert_current(&kind, record("lb-2", 1)).unwrap();

        store.commit(first).unwrap();
        let err = store.commit(second).unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[test]
    fn writers_on_different_kinds_commit_independently() {
        let store = MemoryStore::new();
        let lbs = ResourceKind::new("lb");
        let dbs = ResourceKind::new("db");

        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        first.insert_current(&lbs, record("lb-1", 1)).unwrap();
        second.insert_current(&dbs, record("db-1", 1)).unwrap();
        store.commit(first).unwrap();
        store.commit(second).unwrap();

        let mut reader = store.begin().unwrap();
        assert_eq!(reader.kinds().unwrap().len(), 2);
    }

    #[test]
    fn touch_and_stale_scan() {
        let store = MemoryStore::new();
        let kind = ResourceKind::new("lb");

        let mut txn = store.begin().unwrap();
        txn.insert_current(&kind, record("lb-1", 1)).unwrap();
        txn.insert_current(&kind, record("lb-2", 1)).unwrap();
        let touched = txn
            .touch_current(&kind, &["lb-2".to_string(), "missing".to_string()], ts(5))
            .unwrap();
        assert_eq!(touched, 1);
        assert_eq!(txn.stale_current(&kind, ts(5)).unwrap(), vec!["lb-1".to_string()]);

        let touched_row = txn.get_current(&kind, "lb-2").unwrap().unwrap();
        assert_eq!(touched_row.collected_at, ts(5));
        assert_eq!(touched_row.first_collected_at, ts(1));
    }

    #[test]
    fn replace_missing_row_fails() {
        let store = MemoryStore::new();
        let kind = ResourceKind::new("lb");
        let mut txn = store.begin().unwrap();
        let err = txn.replace_current(&kind, record("lb-9", 1)).unwrap_err();
        assert!(matches!(err, StorageError::MissingRow { table: "current", .. }));
    }

    #[test]
    fn failed_persist_leaves_state_unchanged() {
        let store = MemoryStore::new();
        let kind = ResourceKind::new("lb");

        let mut txn = store.begin().unwrap();
        txn.insert_current(&kind, record("lb-1", 1)).unwrap();
        let err = store
            .commit_with(txn, |_| Err(StorageError::corrupted("disk full")))
            .unwrap_err();
        assert!(matches!(err, StorageError::Corrupted(_)));

        let mut reader = store.begin().unwrap();
        assert!(reader.get_current(&kind, "lb-1").unwrap().is_none());
    }
}
