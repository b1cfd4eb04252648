//! Point-in-time reads over the history table.

use snapledger_storage::{HistoryRecord, ResourceKind, StorageResult, StoreTransaction, Timestamp};

/// Returns the interval of `resource_id` that contains `at`.
///
/// When a retired resource reappeared, its lineages can touch at the
/// boundary; the latest-starting interval wins.
pub(crate) fn history_as_of<T>(
    txn: &mut T,
    kind: &ResourceKind,
    resource_id: &str,
    at: Timestamp,
) -> StorageResult<Option<HistoryRecord>>
where
    T: StoreTransaction + ?Sized,
{
    let rows = txn.history_for(kind, resource_id)?;
    Ok(rows.into_iter().rev().find(|row| row.contains(at)))
}

/// Returns the state of every resource of the kind at `at`, in id order.
pub(crate) fn snapshot_as_of<T>(
    txn: &mut T,
    kind: &ResourceKind,
    at: Timestamp,
) -> StorageResult<Vec<HistoryRecord>>
where
    T: StoreTransaction + ?Sized,
{
    let mut result: Vec<HistoryRecord> = Vec::new();
    for row in txn.all_history(kind)? {
        if !row.contains(at) {
            continue;
        }
        // Rows arrive ordered by id then valid_from.
        match result.last_mut() {
            Some(last) if last.resource_id == row.resource_id => *last = row,
            _ => result.push(row),
        }
    }
    Ok(result)
}
