//! History ledger.
//!
//! Slowly-changing-dimension versioning over the history table: every state
//! of a resource is one row bounded by `[valid_from, valid_to)`, and at most
//! one row per resource id is open at any time.
//!
//! These functions never open a transaction of their own. They run inside
//! the caller's, so a failure anywhere in the batch rolls their writes back
//! too.

use snapledger_storage::{
    CanonicalSnapshot, CurrentRecord, HistoryRecord, ResourceKind, StoreTransaction, Timestamp,
};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Opens the first interval of a new lineage at `now`.
///
/// `first_collected_at` is taken from the snapshot. A resource that was
/// retired before starts its new lineage no earlier than the end of the old
/// one, so lineages of one id never overlap.
///
/// # Errors
///
/// Returns `HistoryInvariantViolation` if the resource already has an open
/// interval.
pub fn create_history<T>(
    txn: &mut T,
    kind: &ResourceKind,
    snapshot: &CanonicalSnapshot,
    now: Timestamp,
) -> CoreResult<HistoryRecord>
where
    T: StoreTransaction + ?Sized,
{
    let previous = txn.history_for(kind, &snapshot.resource_id)?;
    if previous.iter().any(HistoryRecord::is_open) {
        return Err(violation(
            kind,
            &snapshot.resource_id,
            "new resource already has an open history interval",
        ));
    }

    let valid_from = match previous.iter().filter_map(|row| row.valid_to).max() {
        Some(retired_at) if retired_at > now => {
            tracing::debug!(
                %kind,
                resource_id = %snapshot.resource_id,
                %retired_at,
                "new lineage starts at previous retirement"
            );
            retired_at
        }
        _ => now,
    };

    let record = HistoryRecord {
        history_id: Uuid::new_v4(),
        resource_id: snapshot.resource_id.clone(),
        fields: snapshot.fields.clone(),
        children: snapshot.children.clone(),
        valid_from,
        valid_to: None,
        first_collected_at: snapshot.collected_at,
    };
    txn.insert_history(kind, record.clone())?;
    Ok(record)
}

/// Closes the open interval and opens the next one with the new state.
///
/// The new interval starts where the old one ended and carries
/// `first_collected_at` from `old`, never from the new snapshot.
///
/// # Errors
///
/// Returns `HistoryInvariantViolation` if the resource has no open interval:
/// the current and history tables have drifted apart.
pub fn update_history<T>(
    txn: &mut T,
    kind: &ResourceKind,
    old: &CurrentRecord,
    new: &CanonicalSnapshot,
    now: Timestamp,
) -> CoreResult<HistoryRecord>
where
    T: StoreTransaction + ?Sized,
{
    let Some(open) = txn.open_history(kind, &old.resource_id)? else {
        return Err(violation(
            kind,
            &old.resource_id,
            "changed resource has no open history interval",
        ));
    };

    let boundary = close_time(&open, now);
    txn.close_history(kind, open.history_id, boundary)?;

    let record = HistoryRecord {
        history_id: Uuid::new_v4(),
        resource_id: old.resource_id.clone(),
        fields: new.fields.clone(),
        children: new.children.clone(),
        valid_from: boundary,
        valid_to: None,
        first_collected_at: old.first_collected_at,
    };
    txn.insert_history(kind, record.clone())?;
    Ok(record)
}

/// Closes the open interval of a resource, if it has one.
///
/// Returns the close time, or `None` if there was nothing to close.
/// Closing twice is not an error.
pub fn close_history<T>(
    txn: &mut T,
    kind: &ResourceKind,
    resource_id: &str,
    now: Timestamp,
) -> CoreResult<Option<Timestamp>>
where
    T: StoreTransaction + ?Sized,
{
    let Some(open) = txn.open_history(kind, resource_id)? else {
        tracing::trace!(%kind, resource_id, "no open interval to close");
        return Ok(None);
    };

    let closed_at = close_time(&open, now);
    txn.close_history(kind, open.history_id, closed_at)?;
    Ok(Some(closed_at))
}

// An interval never ends before it starts.
fn close_time(open: &HistoryRecord, now: Timestamp) -> Timestamp {
    now.max(open.valid_from)
}

fn violation(kind: &ResourceKind, resource_id: &str, message: &str) -> CoreError {
    tracing::error!(%kind, resource_id, reason = message, "history invariant violated");
    CoreError::history_invariant(kind, resource_id, message)
}
