//! Differ: classifies a fresh snapshot against the stored current record.

use snapledger_storage::{CanonicalSnapshot, ChildRecord, CurrentRecord, FieldValue};
use std::collections::{BTreeMap, BTreeSet};

use crate::schema::ResourceSchema;

/// Result of comparing a stored record with a new observation.
///
/// `is_new` and `is_changed` are never both true. Both false means the
/// resource was observed but nothing about it changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// No record was stored for this resource id.
    pub is_new: bool,
    /// A compared field or child collection differs.
    pub is_changed: bool,
    /// Top-level fields that differ, in name order.
    pub changed_fields: Vec<String>,
    /// One entry per compared child collection: `true` if it differs.
    pub child_diffs: BTreeMap<String, bool>,
}

impl Diff {
    /// Returns true if the record exists and nothing changed.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        !self.is_new && !self.is_changed
    }

    /// Names of the child collections that differ.
    pub fn changed_children(&self) -> impl Iterator<Item = &str> {
        self.child_diffs
            .iter()
            .filter(|(_, changed)| **changed)
            .map(|(name, _)| name.as_str())
    }
}

/// Compares `old` with `new` under `schema`.
///
/// Pure and total. Missing fields read as `Null`, missing collections read
/// as empty. Child collections compare as multisets keyed by the schema's
/// key fields, so order never matters.
#[must_use]
pub fn diff(schema: &ResourceSchema, old: Option<&CurrentRecord>, new: &CanonicalSnapshot) -> Diff {
    let Some(old) = old else {
        return Diff {
            is_new: true,
            ..Diff::default()
        };
    };

    const NULL: FieldValue = FieldValue::Null;

    let mut changed_fields = Vec::new();
    let names: BTreeSet<&String> = old.fields.keys().chain(new.fields.keys()).collect();
    for name in names {
        let before = old.fields.get(name).unwrap_or(&NULL);
        let after = new.fields.get(name).unwrap_or(&NULL);
        if !schema.equality_of(name).equal(before, after) {
            changed_fields.push(name.clone());
        }
    }

    let mut child_diffs = BTreeMap::new();
    let collections: BTreeSet<&String> = old.children.keys().chain(new.children.keys()).collect();
    for name in collections {
        let before = old.children.get(name).map_or(&[][..], Vec::as_slice);
        let after = new.children.get(name).map_or(&[][..], Vec::as_slice);
        child_diffs.insert(name.clone(), collection_differs(schema, name, before, after));
    }

    let is_changed = !changed_fields.is_empty() || child_diffs.values().any(|changed| *changed);
    Diff {
        is_new: false,
        is_changed,
        changed_fields,
        child_diffs,
    }
}

fn collection_differs(
    schema: &ResourceSchema,
    name: &str,
    before: &[ChildRecord],
    after: &[ChildRecord],
) -> bool {
    if before.len() != after.len() {
        return true;
    }
    schema.keyed_children(name, before) != schema.keyed_children(name, after)
}
