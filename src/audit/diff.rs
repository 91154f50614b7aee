//! Diff generation between row snapshots
//!
//! Works on the full pre- and post-images stored with an `updated` event and
//! reduces them to the keys whose values actually differ.

use std::collections::BTreeSet;

use crate::models::{Snapshot, SnapshotValue};

/// Longest string shown before truncation
const MAX_STRING_LEN: usize = 50;

/// Keys whose values differ between `old` and `new`
///
/// A key missing on one side differs from an explicit null on the other.
/// Values are compared structurally, so arrays and nested maps are equal only
/// when all their contents are.
pub fn changed_keys(old: &Snapshot, new: &Snapshot) -> BTreeSet<String> {
    old.keys()
        .chain(new.keys())
        .filter(|key| old.get(key) != new.get(key))
        .cloned()
        .collect()
}

/// Generate a one-line, human-readable diff between two snapshots
///
/// Returns `None` when nothing changed.
pub fn generate_diff(old: &Snapshot, new: &Snapshot) -> Option<String> {
    let changes: Vec<String> = changed_keys(old, new)
        .into_iter()
        .map(|key| {
            format!(
                "{}: {} -> {}",
                key,
                format_side(old.get(&key), "(added)"),
                format_side(new.get(&key), "(removed)")
            )
        })
        .collect();

    if changes.is_empty() {
        None
    } else {
        Some(changes.join(", "))
    }
}

fn format_side(value: Option<&SnapshotValue>, absent: &str) -> String {
    value.map(format_value).unwrap_or_else(|| absent.to_string())
}

/// Format a snapshot value for human-readable display
pub fn format_value(value: &SnapshotValue) -> String {
    match value {
        SnapshotValue::Null => "null".to_string(),
        SnapshotValue::Bool(b) => b.to_string(),
        SnapshotValue::Number(n) => n.to_string(),
        SnapshotValue::String(s) => {
            if s.chars().count() > MAX_STRING_LEN {
                let head: String = s.chars().take(MAX_STRING_LEN - 3).collect();
                format!("\"{}...\"", head)
            } else {
                format!("\"{}\"", s)
            }
        }
        SnapshotValue::Array(items) => format!("[{} items]", items.len()),
        SnapshotValue::Map(fields) => format!("{{{} fields}}", fields.len()),
    }
}
