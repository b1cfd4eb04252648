//! Resource schema descriptors.
//!
//! A [`ResourceSchema`] tells the generic engine how to compare and validate
//! the snapshots of one resource kind:
//!
//! - which fields are required,
//! - how each field is compared ([`FieldEquality`]),
//! - which fields identify a child record inside a collection ([`ChildSpec`]).
//!
//! Fields not declared in the schema compare exactly. A child collection not
//! declared in the schema is keyed by the whole child record.

use snapledger_storage::{CanonicalSnapshot, ChildRecord, FieldValue, ResourceKind};
use std::collections::BTreeSet;

use crate::error::{CoreError, CoreResult};

/// How a field is compared between two observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldEquality {
    /// Byte-exact comparison.
    #[default]
    Exact,
    /// Text compares case-insensitively; other values compare exactly.
    CaseInsensitive,
    /// Never compared. Volatile fields (etags, fetch counters) use this so
    /// they don't cause history churn.
    Ignore,
}

impl FieldEquality {
    /// Returns true if `old` and `new` are equal under this rule.
    #[must_use]
    pub fn equal(self, old: &FieldValue, new: &FieldValue) -> bool {
        match self {
            FieldEquality::Exact => old == new,
            FieldEquality::CaseInsensitive => match (old, new) {
                (FieldValue::Text(a), FieldValue::Text(b)) => a
                    .chars()
                    .flat_map(char::to_lowercase)
                    .eq(b.chars().flat_map(char::to_lowercase)),
                _ => old == new,
            },
            FieldEquality::Ignore => true,
        }
    }
}

/// Declaration of one top-level field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Whether every snapshot must carry a non-null value.
    pub required: bool,
    /// Comparison rule.
    pub equality: FieldEquality,
}

impl FieldSpec {
    /// Declares an optional, exactly-compared field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            equality: FieldEquality::Exact,
        }
    }

    /// Marks the field as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the comparison rule.
    #[must_use]
    pub fn equality(mut self, equality: FieldEquality) -> Self {
        self.equality = equality;
        self
    }
}

/// Declaration of one child collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSpec {
    /// Collection name.
    pub name: String,
    /// Fields whose values identify a child record. The remaining fields
    /// form the child's associated value.
    pub key_fields: Vec<String>,
}

impl ChildSpec {
    /// Declares a collection keyed by `key_fields`.
    pub fn new<I, K>(name: impl Into<String>, key_fields: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            name: name.into(),
            key_fields: key_fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// A child record split into its key and its associated value.
pub(crate) type KeyedChild = (ChildRecord, ChildRecord);

/// Schema for one resource kind.
///
/// # Example
///
/// ```
/// use snapledger_core::{ChildSpec, FieldEquality, FieldSpec, ResourceSchema};
///
/// let schema = ResourceSchema::new("compute.instance")
///     .with_field(FieldSpec::new("status").required())
///     .with_field(FieldSpec::new("etag").equality(FieldEquality::Ignore))
///     .with_children(ChildSpec::new("labels", ["key"]));
/// assert!(schema.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSchema {
    /// Kind this schema describes.
    pub kind: ResourceKind,
    /// Declared fields.
    pub fields: Vec<FieldSpec>,
    /// Declared child collections.
    pub children: Vec<ChildSpec>,
}

impl ResourceSchema {
    /// Creates a schema with no declarations.
    pub fn new(kind: impl Into<ResourceKind>) -> Self {
        Self {
            kind: kind.into(),
            fields: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds a field declaration.
    #[must_use]
    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a child collection declaration.
    #[must_use]
    pub fn with_children(mut self, child: ChildSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Checks that the schema itself is well formed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` for empty or repeated field names, repeated
    /// collection names, and collections without key fields.
    pub fn validate(&self) -> CoreResult<()> {
        if self.kind.as_str().is_empty() {
            return Err(CoreError::invalid_schema(&self.kind, "kind name is empty"));
        }

        let mut names = BTreeSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(CoreError::invalid_schema(&self.kind, "field name is empty"));
            }
            if !names.insert(field.name.as_str()) {
                return Err(CoreError::invalid_schema(
                    &self.kind,
                    format!("field {} declared twice", field.name),
                ));
            }
        }

        let mut collections = BTreeSet::new();
        for child in &self.children {
            if !collections.insert(child.name.as_str()) {
                return Err(CoreError::invalid_schema(
                    &self.kind,
                    format!("collection {} declared twice", child.name),
                ));
            }
            if child.key_fields.is_empty() {
                return Err(CoreError::invalid_schema(
                    &self.kind,
                    format!("collection {} has no key fields", child.name),
                ));
            }
        }
        Ok(())
    }

    /// Returns the declaration of a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the comparison rule of a field (`Exact` if undeclared).
    #[must_use]
    pub fn equality_of(&self, name: &str) -> FieldEquality {
        self.field(name).map_or(FieldEquality::Exact, |f| f.equality)
    }

    /// Returns the declaration of a child collection.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&ChildSpec> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Splits a child into key and value.
    ///
    /// Missing key fields read as `Null`. An undeclared collection puts the
    /// whole record in the key.
    pub(crate) fn split_child(&self, collection: &str, child: &ChildRecord) -> KeyedChild {
        match self.child(collection) {
            Some(spec) => {
                let mut key = ChildRecord::new();
                let mut value = child.clone();
                for name in &spec.key_fields {
                    let field = value.remove(name).unwrap_or_default();
                    key.insert(name.clone(), field);
                }
                (key, value)
            }
            None => (child.clone(), ChildRecord::new()),
        }
    }

    /// Returns a collection as a sorted multiset of (key, value) pairs.
    pub(crate) fn keyed_children(&self, collection: &str, children: &[ChildRecord]) -> Vec<KeyedChild> {
        let mut keyed: Vec<KeyedChild> = children
            .iter()
            .map(|child| self.split_child(collection, child))
            .collect();
        keyed.sort();
        keyed
    }

    /// Checks one snapshot against the schema.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSnapshot` for an empty resource id, a missing or null
    /// required field, or two children sharing a key in a declared
    /// collection.
    pub fn check_snapshot(&self, snapshot: &CanonicalSnapshot) -> CoreResult<()> {
        let id = snapshot.resource_id.as_str();
        if id.trim().is_empty() {
            return Err(CoreError::invalid_snapshot(&self.kind, id, "resource id is empty"));
        }

        for field in self.fields.iter().filter(|f| f.required) {
            if snapshot.fields.get(&field.name).map_or(true, FieldValue::is_null) {
                return Err(CoreError::invalid_snapshot(
                    &self.kind,
                    id,
                    format!("required field {} is missing", field.name),
                ));
            }
        }

        for spec in &self.children {
            let Some(children) = snapshot.children.get(&spec.name) else {
                continue;
            };
            let mut seen = BTreeSet::new();
            for child in children {
                let (key, _) = self.split_child(&spec.name, child);
                if !seen.insert(key) {
                    return Err(CoreError::invalid_snapshot(
                        &self.kind,
                        id,
                        format!("duplicate child key in collection {}", spec.name),
                    ));
                }
            }
        }
        Ok(())
    }
}
