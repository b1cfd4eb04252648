//! Scalar and blob field values.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Named field values of one record, ordered by field name.
pub type Fields = BTreeMap<String, FieldValue>;

/// One child sub-record, e.g. a single key/value label pair.
pub type ChildRecord = BTreeMap<String, FieldValue>;

/// A single scalar or blob field.
///
/// Nested provider structures arrive already serialized as [`FieldValue::Blob`].
/// Equality is byte-exact: floats compare by bit pattern, so `NaN == NaN`
/// and `0.0 != -0.0`. This keeps equality reflexive, which the differ
/// depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldValue {
    /// Absent or explicitly empty value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// IEEE-754 double, compared bitwise.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Opaque serialized bytes.
    Blob(Vec<u8>),
}

impl FieldValue {
    /// Returns true for [`FieldValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Returns the text content, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer value.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Short type name used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::Blob(_) => "blob",
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a == b,
            (FieldValue::Float(a), FieldValue::Float(b)) => a.to_bits() == b.to_bits(),
            (FieldValue::Text(a), FieldValue::Text(b)) => a == b,
            (FieldValue::Blob(a), FieldValue::Blob(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl FieldValue {
    fn rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Bool(_) => 1,
            FieldValue::Integer(_) => 2,
            FieldValue::Float(_) => 3,
            FieldValue::Text(_) => 4,
            FieldValue::Blob(_) => 5,
        }
    }
}

/// Total order consistent with the bitwise equality above: variants order
/// by kind first, floats by `f64::total_cmp`.
impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.total_cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (FieldValue::Blob(a), FieldValue::Blob(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for FieldValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            FieldValue::Null => {}
            FieldValue::Bool(b) => b.hash(state),
            FieldValue::Integer(i) => i.hash(state),
            FieldValue::Float(x) => x.to_bits().hash(state),
            FieldValue::Text(s) => s.hash(state),
            FieldValue::Blob(bytes) => bytes.hash(state),
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Null
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Text(s) => write!(f, "{s:?}"),
            FieldValue::Blob(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Blob(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_equality_is_bitwise() {
        assert_eq!(FieldValue::Float(f64::NAN), FieldValue::Float(f64::NAN));
        assert_ne!(FieldValue::Float(0.0), FieldValue::Float(-0.0));
        assert_eq!(FieldValue::Float(1.5), FieldValue::Float(1.5));
    }

    #[test]
    fn different_variants_never_equal() {
        assert_ne!(FieldValue::Integer(1), FieldValue::Float(1.0));
        assert_ne!(FieldValue::Text("1".into()), FieldValue::Blob(b"1".to_vec()));
        assert_ne!(FieldValue::Null, FieldValue::Text(String::new()));
    }

    #[test]
    fn ordering_groups_by_variant() {
        let mut values = vec![
            FieldValue::from("b"),
            FieldValue::Integer(7),
            FieldValue::Null,
            FieldValue::from("a"),
            FieldValue::Integer(-1),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                FieldValue::Null,
                FieldValue::Integer(-1),
                FieldValue::Integer(7),
                FieldValue::from("a"),
                FieldValue::from("b"),
            ]
        );
        assert_eq!(
            FieldValue::Float(f64::NAN).cmp(&FieldValue::Float(f64::NAN)),
            Ordering::Equal
        );
    }

    #[test]
    fn option_conversion() {
        assert_eq!(FieldValue::from(None::<i64>), FieldValue::Null);
        assert_eq!(FieldValue::from(Some("eu-west-1")), FieldValue::from("eu-west-1"));
    }

    #[test]
    fn display() {
        assert_eq!(FieldValue::from("on").to_string(), "\"on\"");
        assert_eq!(FieldValue::Blob(vec![1, 2, 3]).to_string(), "<3 bytes>");
    }
}
