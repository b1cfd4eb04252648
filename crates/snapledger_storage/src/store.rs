//! Store and transaction traits.

use uuid::Uuid;

use crate::error::StorageResult;
use crate::record::{CurrentRecord, HistoryRecord, ResourceKind, Timestamp};

/// A transactional store for current and history tables.
///
/// ## Transaction lifecycle
///
/// 1. `begin()` - start a transaction
/// 2. Read and write through the returned [`StoreTransaction`]
/// 3. `commit(txn)` - apply every staged write atomically
///    OR `abort(txn)` - discard every staged write
///
/// A transaction that is dropped without `commit` is rolled back: nothing it
/// staged ever becomes visible. This is what makes a panic inside a
/// transaction safe.
///
/// ## Isolation
///
/// Reads inside a transaction see the state committed when it began plus
/// its own writes. Implementations must reject a commit that would
/// overwrite a partition committed by another transaction since `begin()`.
pub trait SnapshotStore: Send + Sync {
    /// The transaction type used by this store.
    type Transaction: StoreTransaction + Send;

    /// Begins a new transaction.
    fn begin(&self) -> StorageResult<Self::Transaction>;

    /// Commits a transaction, making all of its writes visible at once.
    fn commit(&self, txn: Self::Transaction) -> StorageResult<()>;

    /// Aborts a transaction, discarding all of its writes.
    fn abort(&self, txn: Self::Transaction) -> StorageResult<()>;
}

/// Row-level operations available inside a transaction.
///
/// Every operation is scoped to one [`ResourceKind`] partition.
pub trait StoreTransaction {
    // ── Current table ────────────────────────────────────────────────────

    /// Point lookup by resource id.
    fn get_current(
        &mut self,
        kind: &ResourceKind,
        resource_id: &str,
    ) -> StorageResult<Option<CurrentRecord>>;

    /// Inserts a new current record.
    ///
    /// Fails with `DuplicateKey` if the resource id already has a row.
    fn insert_current(&mut self, kind: &ResourceKind, record: CurrentRecord)
        -> StorageResult<()>;

    /// Overwrites an existing current record.
    ///
    /// Fails with `MissingRow` if the resource id has no row.
    fn replace_current(
        &mut self,
        kind: &ResourceKind,
        record: CurrentRecord,
    ) -> StorageResult<()>;

    /// Sets `collected_at` on every listed row, leaving everything else
    /// untouched. Returns the number of rows updated.
    fn touch_current(
        &mut self,
        kind: &ResourceKind,
        resource_ids: &[String],
        collected_at: Timestamp,
    ) -> StorageResult<usize>;

    /// Deletes a current record and its child collections. Returns whether
    /// a row existed.
    fn delete_current(&mut self, kind: &ResourceKind, resource_id: &str) -> StorageResult<bool>;

    /// Returns the ids of current records with `collected_at < watermark`,
    /// in id order.
    fn stale_current(
        &mut self,
        kind: &ResourceKind,
        watermark: Timestamp,
    ) -> StorageResult<Vec<String>>;

    /// Returns every current record of the kind, in id order.
    fn list_current(&mut self, kind: &ResourceKind) -> StorageResult<Vec<CurrentRecord>>;

    // ── History table ────────────────────────────────────────────────────

    /// Appends a history row.
    ///
    /// Fails with `DuplicateKey` if the row is open and the resource id
    /// already has an open row.
    fn insert_history(&mut self, kind: &ResourceKind, record: HistoryRecord)
        -> StorageResult<()>;

    /// Returns the open history row (`valid_to IS NULL`) for a resource id.
    fn open_history(
        &mut self,
        kind: &ResourceKind,
        resource_id: &str,
    ) -> StorageResult<Option<HistoryRecord>>;

    /// Sets `valid_to` on an open history row.
    ///
    /// Fails with `MissingRow` if the row does not exist or is already closed.
    fn close_history(
        &mut self,
        kind: &ResourceKind,
        history_id: Uuid,
        valid_to: Timestamp,
    ) -> StorageResult<()>;

    /// Returns every history row for a resource id, ordered by `valid_from`.
    fn history_for(
        &mut self,
        kind: &ResourceKind,
        resource_id: &str,
    ) -> StorageResult<Vec<HistoryRecord>>;

    /// Returns every history row of the kind, ordered by resource id then
    /// `valid_from`.
    fn all_history(&mut self, kind: &ResourceKind) -> StorageResult<Vec<HistoryRecord>>;

    // ── Partition metadata ───────────────────────────────────────────────

    /// Returns the newest batch timestamp applied to the kind.
    fn high_watermark(&mut self, kind: &ResourceKind) -> StorageResult<Option<Timestamp>>;

    /// Records the newest batch timestamp applied to the kind.
    fn set_high_watermark(&mut self, kind: &ResourceKind, watermark: Timestamp)
        -> StorageResult<()>;

    /// Returns every kind that has a partition.
    fn kinds(&mut self) -> StorageResult<Vec<ResourceKind>>;
}
