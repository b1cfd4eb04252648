//! Helpers for driving the engine through whole collection runs.

use snapledger_core::{Clock, ReconcileReport, SyncBatch, SyncEngine, SyncReport};
use snapledger_storage::{CanonicalSnapshot, FieldValue, ResourceKind, SnapshotStore, Timestamp};

use crate::fixtures::TestEngine;
use crate::generators::InstanceState;

/// Runs one collection pass the way an orchestrator would: sync the batch,
/// then reconcile with the same timestamp. The clock is set to `at` first.
pub fn run_pass<S: SnapshotStore>(
    engine: &TestEngine<S>,
    kind: &ResourceKind,
    at: Timestamp,
    snapshots: Vec<CanonicalSnapshot>,
) -> (SyncReport, ReconcileReport) {
    engine.clock.set(at);
    let sync = engine
        .sync(kind, &SyncBatch::from_snapshots(at, snapshots))
        .expect("Failed to sync batch");
    let reconcile = engine
        .reconcile_stale(kind, at)
        .expect("Failed to reconcile");
    (sync, reconcile)
}

/// Panics with every issue found if the ledger of `kind` is inconsistent.
pub fn assert_ledger_ok<S: SnapshotStore, C: Clock>(engine: &SyncEngine<S, C>, kind: &ResourceKind) {
    let report = engine.verify(kind).expect("Failed to verify ledger");
    assert!(
        report.is_ok(),
        "ledger of {} is inconsistent:\n{}",
        kind,
        report
            .issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    );
}

/// Number of history intervals a sequence of observations should produce:
/// one for the first observation and one per change.
pub fn expected_intervals(states: &[InstanceState]) -> usize {
    if states.is_empty() {
        return 0;
    }
    1 + states.windows(2).filter(|pair| !same_state(&pair[0], &pair[1])).count()
}

/// Equality as the differ sees it for the instance schema: null fields are
/// the same as missing ones and label order does not matter.
fn same_state(a: &InstanceState, b: &InstanceState) -> bool {
    let present = |state: &InstanceState| -> Vec<(String, FieldValue)> {
        state
            .fields
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    };
    let mut a_labels = a.labels.clone();
    let mut b_labels = b.labels.clone();
    a_labels.sort();
    b_labels.sort();
    a.status == b.status && present(a) == present(b) && a_labels == b_labels
}
