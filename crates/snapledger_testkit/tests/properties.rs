//! Ledger properties checked against generated observation sequences.

use proptest::prelude::*;
use proptest::strategy::ValueTree;
use snapledger_core::diff;
use snapledger_storage::{CanonicalSnapshot, CurrentRecord};
use snapledger_testkit::prelude::*;

fn config() -> ProptestConfig {
    PropTestConfig::quick().to_proptest_config()
}

proptest! {
    #![proptest_config(config())]

    /// Re-syncing an identical state only refreshes `collected_at`.
    #[test]
    fn unchanged_resync_is_idempotent(state in instance_state_strategy(), gap in 1i64..10_000) {
        let engine = TestEngine::memory();
        let kind = instance_kind();
        let t1 = ts(1);
        let t2 = ts(1 + gap);

        run_pass(&engine, &kind, t1, vec![state.snapshot("vm-1", t1)]);
        let (report, _) = run_pass(&engine, &kind, t2, vec![state.snapshot("vm-1", t2)]);
        prop_assert_eq!(report.unchanged, 1);

        let current = engine.current(&kind, "vm-1").unwrap().unwrap();
        prop_assert_eq!(current.collected_at, t2);
        prop_assert_eq!(current.first_collected_at, t1);
        prop_assert_eq!(&current.fields, &state.snapshot("vm-1", t1).fields);

        let history = engine.history(&kind, "vm-1").unwrap();
        prop_assert_eq!(history.len(), 1);
        prop_assert!(history[0].is_open());
    }

    /// One interval per observed state, exactly one open, closed ones
    /// contiguous and ordered.
    #[test]
    fn history_intervals_are_complete(states in state_sequence_strategy(1, 12)) {
        let engine = TestEngine::memory();
        let kind = instance_kind();
        for (step, state) in states.iter().enumerate() {
            let at = ts(step as i64 * 60);
            run_pass(&engine, &kind, at, vec![state.snapshot("vm-1", at)]);
        }

        let history = engine.history(&kind, "vm-1").unwrap();
        prop_assert_eq!(history.len(), expected_intervals(&states));
        prop_assert_eq!(history.iter().filter(|h| h.is_open()).count(), 1);
        prop_assert!(history.last().unwrap().is_open());
        for pair in history.windows(2) {
            prop_assert_eq!(pair[0].valid_to, Some(pair[1].valid_from));
            prop_assert!(pair[0].valid_from <= pair[1].valid_from);
        }
        assert_ledger_ok(&engine, &kind);
    }

    /// `first_collected_at` never moves while the lineage is unbroken.
    #[test]
    fn provenance_is_preserved(states in state_sequence_strategy(1, 12)) {
        let engine = TestEngine::memory();
        let kind = instance_kind();
        let first = ts(0);
        for (step, state) in states.iter().enumerate() {
            let at = ts(step as i64 * 60);
            run_pass(&engine, &kind, at, vec![state.snapshot("vm-1", at)]);
        }

        let current = engine.current(&kind, "vm-1").unwrap().unwrap();
        prop_assert_eq!(current.first_collected_at, first);
        for row in engine.history(&kind, "vm-1").unwrap() {
            prop_assert_eq!(row.first_collected_at, first);
        }
    }

    /// Resources missing from a run are retired at processing time, once.
    #[test]
    fn stale_resources_are_retired_once(
        inventory in inventory_strategy(8),
        keep in prop::collection::vec(any::<bool>(), 8),
    ) {
        let engine = TestEngine::memory();
        let kind = instance_kind();
        let t1 = ts(1);
        let t2 = ts(100);
        let snapshots = |at| {
            inventory
                .iter()
                .map(|(id, state)| state.snapshot(id, at))
                .collect::<Vec<CanonicalSnapshot>>()
        };
        run_pass(&engine, &kind, t1, snapshots(t1));

        let kept: Vec<CanonicalSnapshot> = snapshots(t2)
            .into_iter()
            .zip(keep.iter().copied())
            .filter_map(|(snapshot, keep)| keep.then_some(snapshot))
            .collect();
        let kept_ids: Vec<String> = kept.iter().map(|s| s.resource_id.clone()).collect();
        let expected_retired: Vec<String> = inventory
            .keys()
            .filter(|id| !kept_ids.contains(id))
            .cloned()
            .collect();

        let processing = ts(150);
        engine.clock.set(processing);
        engine
            .sync(&kind, &snapledger_core::SyncBatch::from_snapshots(t2, kept))
            .unwrap();
        let report = engine.reconcile_stale(&kind, t2).unwrap();
        let mut retired = report.retired.clone();
        retired.sort();
        prop_assert_eq!(&retired, &expected_retired);

        for id in &expected_retired {
            prop_assert!(engine.current(&kind, id).unwrap().is_none());
            let history = engine.history(&kind, id).unwrap();
            prop_assert_eq!(history.last().unwrap().valid_to, Some(processing));
        }

        let again = engine.reconcile_stale(&kind, t2).unwrap();
        prop_assert!(again.retired.is_empty());
        assert_ledger_ok(&engine, &kind);
    }

    /// Child order never makes a snapshot look changed.
    #[test]
    fn child_order_does_not_matter((labels, shuffled) in shuffled_labels_strategy()) {
        let schema = instance_schema();
        let mut first = instance("vm-1", ts(1), "RUNNING");
        let mut second = instance("vm-1", ts(2), "RUNNING");
        first.children.insert("labels".to_string(), labels);
        second.children.insert("labels".to_string(), shuffled);

        let current = CurrentRecord::from_snapshot(&first);
        let result = diff(&schema, Some(&current), &second);
        prop_assert!(!result.is_changed);
        prop_assert!(result.is_unchanged());
    }
}

#[test]
fn file_store_ledger_survives_reopen_after_generated_runs() {
    let mut runner = proptest::test_runner::TestRunner::new(config());
    let states = state_sequence_strategy(2, 6)
        .new_tree(&mut runner)
        .expect("Failed to generate states")
        .current();

    let engine = TestEngine::file();
    let kind = instance_kind();
    for (step, state) in states.iter().enumerate() {
        let at = ts(step as i64 * 60);
        run_pass(&engine, &kind, at, vec![state.snapshot("vm-1", at)]);
    }
    let before = engine.history(&kind, "vm-1").unwrap();

    let engine = engine.reopen();
    assert_eq!(engine.history(&kind, "vm-1").unwrap(), before);
    assert_eq!(before.len(), expected_intervals(&states));
    assert_ledger_ok(&engine, &kind);
}
