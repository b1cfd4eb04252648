//! Property-based test generators using proptest.
//!
//! Snapshots produced here always satisfy [`instance_schema`]: `status` is
//! present and label keys are unique within a snapshot.
//!
//! [`instance_schema`]: crate::fixtures::instance_schema

use proptest::prelude::*;
use snapledger_storage::{CanonicalSnapshot, ChildRecord, FieldValue, Fields, Timestamp};
use std::collections::BTreeMap;

use crate::fixtures::label;

/// Strategy for generating resource ids.
pub fn resource_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,3}-[0-9]{1,3}").expect("Invalid regex")
}

/// Strategy for generating any field value, NaN floats included.
pub fn field_value_strategy() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        Just(FieldValue::Null),
        any::<bool>().prop_map(FieldValue::Bool),
        any::<i64>().prop_map(FieldValue::Integer),
        any::<f64>().prop_map(FieldValue::Float),
        "[ -~]{0,12}".prop_map(FieldValue::Text),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(FieldValue::Blob),
    ]
}

/// Strategy for generating optional instance fields. Names are prefixed so
/// they never collide with the declared `status` and `etag`.
pub fn extra_fields_strategy() -> impl Strategy<Value = Fields> {
    prop::collection::btree_map("x_[a-z]{1,5}", field_value_strategy(), 0..6)
}

/// Strategy for generating a `labels` collection with unique keys.
pub fn labels_strategy() -> impl Strategy<Value = Vec<ChildRecord>> {
    prop::collection::btree_map("[a-z]{1,4}", "[a-z0-9]{0,4}", 0..6).prop_map(|pairs| {
        pairs
            .iter()
            .map(|(key, value)| label(key, value))
            .collect()
    })
}

/// Strategy for generating one `labels` collection in two different orders.
pub fn shuffled_labels_strategy() -> impl Strategy<Value = (Vec<ChildRecord>, Vec<ChildRecord>)> {
    labels_strategy().prop_flat_map(|labels| (Just(labels.clone()), Just(labels).prop_shuffle()))
}

/// Observable state of one instance, without id or timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceState {
    /// Value of the required `status` field.
    pub status: String,
    /// Optional fields.
    pub fields: Fields,
    /// The `labels` collection.
    pub labels: Vec<ChildRecord>,
}

impl InstanceState {
    /// Builds the snapshot of this state.
    pub fn snapshot(&self, resource_id: &str, collected_at: Timestamp) -> CanonicalSnapshot {
        let mut snapshot = CanonicalSnapshot::new(resource_id, collected_at);
        snapshot.fields = self.fields.clone();
        snapshot
            .fields
            .insert("status".to_string(), FieldValue::from(self.status.as_str()));
        if !self.labels.is_empty() {
            snapshot.children.insert("labels".to_string(), self.labels.clone());
        }
        snapshot
    }
}

/// Strategy for generating an instance state.
pub fn instance_state_strategy() -> impl Strategy<Value = InstanceState> {
    (
        prop::sample::select(vec!["RUNNING", "STOPPED", "TERMINATED"]),
        extra_fields_strategy(),
        labels_strategy(),
    )
        .prop_map(|(status, fields, labels)| InstanceState {
            status: status.to_string(),
            fields,
            labels,
        })
}

/// Strategy for generating a sequence of observed states of one instance.
///
/// States are drawn from a small pool so consecutive repeats, which must
/// not produce history, are common.
pub fn state_sequence_strategy(
    min_len: usize,
    max_len: usize,
) -> impl Strategy<Value = Vec<InstanceState>> {
    prop::collection::vec(instance_state_strategy(), 1..4).prop_flat_map(move |pool| {
        prop::collection::vec(prop::sample::select(pool), min_len..max_len)
    })
}

/// Strategy for generating the inventory of one collection run: instance
/// ids mapped to their states.
pub fn inventory_strategy(max_len: usize) -> impl Strategy<Value = BTreeMap<String, InstanceState>> {
    prop::collection::btree_map(resource_id_strategy(), instance_state_strategy(), 0..max_len)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
