//! Row snapshots
//!
//! A snapshot is the full column-value map of a row at one point in time.
//! Values are a closed sum over JSON-like shapes so the diff has a single
//! equality rule: structural, with arrays compared element by element and
//! maps compared by contents regardless of key order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{AuditError, AuditResult};

/// A single column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<SnapshotValue>),
    Map(Snapshot),
}

impl SnapshotValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SnapshotValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SnapshotValue::Null)
    }

    /// Convert back into a plain JSON value
    pub fn to_json(&self) -> Value {
        match self {
            SnapshotValue::Null => Value::Null,
            SnapshotValue::Bool(b) => Value::Bool(*b),
            SnapshotValue::Number(n) => Value::Number(n.clone()),
            SnapshotValue::String(s) => Value::String(s.clone()),
            SnapshotValue::Array(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            SnapshotValue::Map(map) => map.to_json(),
        }
    }
}

impl From<Value> for SnapshotValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SnapshotValue::Null,
            Value::Bool(b) => SnapshotValue::Bool(b),
            Value::Number(n) => SnapshotValue::Number(n),
            Value::String(s) => SnapshotValue::String(s),
            Value::Array(items) => {
                SnapshotValue::Array(items.into_iter().map(SnapshotValue::from).collect())
            }
            Value::Object(map) => SnapshotValue::Map(Snapshot(
                map.into_iter()
                    .map(|(k, v)| (k, SnapshotValue::from(v)))
                    .collect(),
            )),
        }
    }
}

impl From<&str> for SnapshotValue {
    fn from(s: &str) -> Self {
        SnapshotValue::String(s.to_string())
    }
}

impl From<String> for SnapshotValue {
    fn from(s: String) -> Self {
        SnapshotValue::String(s)
    }
}

/// Column-name to value map of a row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, SnapshotValue>);

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a JSON object
    ///
    /// Anything other than an object is rejected: a row is always a map.
    pub fn from_json(value: Value) -> AuditResult<Self> {
        match SnapshotValue::from(value) {
            SnapshotValue::Map(map) => Ok(map),
            other => Err(AuditError::Validation(format!(
                "Row snapshot must be a JSON object, got {}",
                other.to_json()
            ))),
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&SnapshotValue> {
        self.0.get(key)
    }

    /// Get a column only when it holds a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(SnapshotValue::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SnapshotValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<SnapshotValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SnapshotValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply a column patch, returning the post-image
    ///
    /// Columns in `patch` overwrite or add; all other columns are kept.
    pub fn merged(&self, patch: &Snapshot) -> Snapshot {
        let mut next = self.clone();
        for (key, value) in patch.iter() {
            next.0.insert(key.clone(), value.clone());
        }
        next
    }
}

impl FromIterator<(String, SnapshotValue)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, SnapshotValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_object() {
        let snap = Snapshot::from_json(json!({"status": "pending", "tags": ["a", "b"]})).unwrap();
        assert_eq!(snap.get_str("status"), Some("pending"));
        assert!(matches!(snap.get("tags"), Some(SnapshotValue::Array(items)) if items.len() == 2));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = Snapshot::from_json(json!([1, 2])).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_structural_equality_ignores_key_order() {
        let a = Snapshot::from_json(json!({"a": 1, "nested": {"x": true, "y": null}})).unwrap();
        let b = Snapshot::from_json(json!({"nested": {"y": null, "x": true}, "a": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_arrays_compared_by_value() {
        let a = SnapshotValue::from(json!([1, 2, 3]));
        let b = SnapshotValue::from(json!([1, 2, 3]));
        let c = SnapshotValue::from(json!([3, 2, 1]));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_serde_shape_is_plain_json() {
        let snap = Snapshot::from_json(json!({"n": 5, "s": "x", "z": null})).unwrap();
        let text = serde_json::to_string(&snap).unwrap();
        assert_eq!(text, r#"{"n":5,"s":"x","z":null}"#);

        let back: Snapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(back, snap);
        assert!(back.get("z").unwrap().is_null());
    }

    #[test]
    fn test_merged_keeps_untouched_columns() {
        let row = Snapshot::from_json(json!({"title": "Dev", "status": "pending"})).unwrap();
        let patch = Snapshot::from_json(json!({"status": "approved", "approved_by": "U1"})).unwrap();
        let next = row.merged(&patch);

        assert_eq!(next.get_str("title"), Some("Dev"));
        assert_eq!(next.get_str("status"), Some("approved"));
        assert_eq!(next.get_str("approved_by"), Some("U1"));
        assert_eq!(row.get_str("status"), Some("pending"));
    }
}
