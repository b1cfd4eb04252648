//! Staleness reconciler.
//!
//! A current record whose `collected_at` is older than the reconciliation
//! watermark was not reported by the run that reached that watermark, so
//! the source no longer has it. Retiring it closes its open interval and
//! deletes the current row. History rows are never deleted.

use snapledger_storage::{ResourceKind, StoreTransaction, Timestamp};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::ledger::close_history;

/// Outcome of a committed reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Kind that was reconciled.
    pub kind: ResourceKind,
    /// Watermark the pass compared against.
    pub watermark: Timestamp,
    /// Retired resource ids, in id order.
    pub retired: Vec<String>,
    /// Wall time spent, including commit.
    pub duration: Duration,
}

/// Refuses a watermark no sync has reached yet.
pub(crate) fn check_watermark<T>(
    txn: &mut T,
    kind: &ResourceKind,
    config: &EngineConfig,
    watermark: Timestamp,
) -> CoreResult<()>
where
    T: StoreTransaction + ?Sized,
{
    if !config.reject_out_of_order {
        return Ok(());
    }
    let high = txn.high_watermark(kind)?;
    match high {
        Some(high) if watermark <= high => Ok(()),
        _ => Err(CoreError::WatermarkAhead {
            kind: kind.clone(),
            watermark,
            high_watermark: high,
        }),
    }
}

/// Retires every current record with `collected_at < watermark`, closing
/// its history at `now`. Returns the retired ids.
pub(crate) fn retire_stale<T>(
    txn: &mut T,
    kind: &ResourceKind,
    watermark: Timestamp,
    now: Timestamp,
) -> CoreResult<Vec<String>>
where
    T: StoreTransaction + ?Sized,
{
    let stale = txn.stale_current(kind, watermark)?;
    for resource_id in &stale {
        let closed_at = close_history(txn, kind, resource_id, now)?;
        txn.delete_current(kind, resource_id)?;
        tracing::debug!(%kind, %resource_id, ?closed_at, "retired");
    }
    Ok(stale)
}
