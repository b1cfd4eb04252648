//! Benchmark utilities.

use chrono::{Duration, TimeZone, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use snapledger_core::{ChildSpec, FieldEquality, FieldSpec, ResourceSchema};
use snapledger_storage::{CanonicalSnapshot, ChildRecord, FieldValue, Timestamp};

/// Kind every benchmark syncs.
pub const BENCH_KIND: &str = "compute.instance";

/// Returns the `n`th collection run timestamp, one hour apart.
pub fn run_at(n: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::hours(n)
}

/// Schema with a handful of declared fields and keyed labels.
pub fn bench_schema() -> ResourceSchema {
    ResourceSchema::new(BENCH_KIND)
        .with_field(FieldSpec::new("status").required())
        .with_field(FieldSpec::new("zone").equality(FieldEquality::CaseInsensitive))
        .with_field(FieldSpec::new("etag").equality(FieldEquality::Ignore))
        .with_children(ChildSpec::new("labels", ["key"]))
}

/// Generate `count` labels with random values.
pub fn random_labels(count: usize) -> Vec<ChildRecord> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            ChildRecord::from([
                ("key".to_string(), FieldValue::from(format!("k{i:04}"))),
                (
                    "value".to_string(),
                    FieldValue::Integer(rng.gen_range(0..1_000_000)),
                ),
            ])
        })
        .collect()
}

/// Returns the same labels in random order.
pub fn shuffled(labels: &[ChildRecord]) -> Vec<ChildRecord> {
    let mut labels = labels.to_vec();
    labels.shuffle(&mut rand::thread_rng());
    labels
}

/// Builds one instance snapshot with `labels` label children.
pub fn instance(id: usize, at: Timestamp, status: &str, labels: usize) -> CanonicalSnapshot {
    let mut rng = rand::thread_rng();
    let mut snapshot = CanonicalSnapshot::new(format!("vm-{id:06}"), at)
        .with_field("status", status)
        .with_field("zone", "europe-west1-b")
        .with_field("etag", rng.gen::<i64>())
        .with_field("cpus", 4i64)
        .with_field("metadata", vec![0u8; 256]);
    if labels > 0 {
        snapshot
            .children
            .insert("labels".to_string(), random_labels(labels));
    }
    snapshot
}

/// Builds a whole inventory run of `count` instances.
pub fn inventory(count: usize, at: Timestamp, status: &str) -> Vec<CanonicalSnapshot> {
    (0..count).map(|id| instance(id, at, status, 8)).collect()
}

/// Moves an inventory to a later run without changing any state.
pub fn recollect(snapshots: &[CanonicalSnapshot], at: Timestamp) -> Vec<CanonicalSnapshot> {
    snapshots
        .iter()
        .map(|snapshot| CanonicalSnapshot {
            collected_at: at,
            ..snapshot.clone()
        })
        .collect()
}
