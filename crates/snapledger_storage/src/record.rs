//! Records kept by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::value::{ChildRecord, FieldValue, Fields};

/// Point in time used for watermarks and validity intervals.
pub type Timestamp = DateTime<Utc>;

/// Named, unordered child collections of one record.
pub type Children = BTreeMap<String, Vec<ChildRecord>>;

/// Name of one resource type, e.g. `compute.instance`.
///
/// Every table is partitioned by kind; two kinds never share rows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKind(String);

impl ResourceKind {
    /// Creates a resource kind.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the kind name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One observation of an external resource, already converted from the
/// provider's wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSnapshot {
    /// Identifier, stable across observations of the same real-world object.
    pub resource_id: String,
    /// Scalar and blob fields.
    pub fields: Fields,
    /// Unordered child collections.
    pub children: Children,
    /// When this observation was collected.
    pub collected_at: Timestamp,
}

impl CanonicalSnapshot {
    /// Creates a snapshot with no fields or children.
    pub fn new(resource_id: impl Into<String>, collected_at: Timestamp) -> Self {
        Self {
            resource_id: resource_id.into(),
            fields: Fields::new(),
            children: Children::new(),
            collected_at,
        }
    }

    /// Sets a field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Appends a child record to the named collection.
    #[must_use]
    pub fn with_child(mut self, collection: impl Into<String>, child: ChildRecord) -> Self {
        self.children.entry(collection.into()).or_default().push(child);
        self
    }
}

/// The latest known state of one live resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentRecord {
    /// Resource identifier (primary key within the kind).
    pub resource_id: String,
    /// Latest fields.
    pub fields: Fields,
    /// Latest child collections.
    pub children: Children,
    /// Last time this resource was observed, changed or not.
    pub collected_at: Timestamp,
    /// When this resource was first observed. Never rewritten.
    pub first_collected_at: Timestamp,
}

impl CurrentRecord {
    /// Creates the current record for a first observation.
    #[must_use]
    pub fn from_snapshot(snapshot: &CanonicalSnapshot) -> Self {
        Self {
            resource_id: snapshot.resource_id.clone(),
            fields: snapshot.fields.clone(),
            children: snapshot.children.clone(),
            collected_at: snapshot.collected_at,
            first_collected_at: snapshot.collected_at,
        }
    }

    /// Returns a field, reading a missing field as [`FieldValue::Null`].
    #[must_use]
    pub fn field(&self, name: &str) -> &FieldValue {
        const NULL: FieldValue = FieldValue::Null;
        self.fields.get(name).unwrap_or(&NULL)
    }
}

/// One closed or open interval of a resource's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Row identifier.
    pub history_id: Uuid,
    /// Resource identifier.
    pub resource_id: String,
    /// Fields during this interval.
    pub fields: Fields,
    /// Child collections during this interval.
    pub children: Children,
    /// Start of the interval (inclusive).
    pub valid_from: Timestamp,
    /// End of the interval (exclusive); `None` while the interval is open.
    pub valid_to: Option<Timestamp>,
    /// When the lineage this interval belongs to was first observed.
    pub first_collected_at: Timestamp,
}

impl HistoryRecord {
    /// Returns true while the interval has no end.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.valid_to.is_none()
    }

    /// Returns true if `at` falls inside `[valid_from, valid_to)`.
    #[must_use]
    pub fn contains(&self, at: Timestamp) -> bool {
        self.valid_from <= at && self.valid_to.map_or(true, |end| at < end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn current_from_snapshot_sets_provenance() {
        let snap = CanonicalSnapshot::new("vm-1", ts(100)).with_field("status", "active");
        let current = CurrentRecord::from_snapshot(&snap);
        assert_eq!(current.first_collected_at, ts(100));
        assert_eq!(current.collected_at, ts(100));
        assert_eq!(current.field("status"), &FieldValue::from("active"));
        assert!(current.field("zone").is_null());
    }

    #[test]
    fn interval_contains_is_half_open() {
        let record = HistoryRecord {
            history_id: Uuid::new_v4(),
            resource_id: "vm-1".into(),
            fields: Fields::new(),
            children: Children::new(),
            valid_from: ts(10),
            valid_to: Some(ts(20)),
            first_collected_at: ts(10),
        };
        assert!(record.contains(ts(10)));
        assert!(record.contains(ts(19)));
        assert!(!record.contains(ts(20)));
        assert!(!record.contains(ts(9)));
        assert!(!record.is_open());
    }

    #[test]
    fn kind_display() {
        assert_eq!(ResourceKind::from("iam.policy").to_string(), "iam.policy");
    }
}
