//! Read-side rendering of events
//!
//! Updates render as the set of changed fields only; creates and deletes
//! render the allow-listed display fields of their single row. Identity
//! references are shown as their resolved summary when one is available.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::config::AuditSettings;
use crate::models::{
    AuditAction, AuditDetails, AuditEvent, EnrichedReference, EventWithActor, Snapshot,
    SnapshotValue,
};

use super::diff::{changed_keys, format_value};

/// A value as it should be shown
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DisplayValue {
    /// Key not present on this side
    Absent,
    Raw(SnapshotValue),
    Reference(EnrichedReference),
}

impl fmt::Display for DisplayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayValue::Absent => write!(f, "(none)"),
            DisplayValue::Raw(value) => write!(f, "{}", format_value(value)),
            DisplayValue::Reference(reference) => match &reference.email {
                Some(email) if *email != reference.display_name => {
                    write!(f, "{} <{}>", reference.display_name, email)
                }
                _ => write!(f, "{}", reference.display_name),
            },
        }
    }
}

/// One changed field of an update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old: DisplayValue,
    pub new: DisplayValue,
}

/// One shown field of a created or deleted row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedField {
    pub field: String,
    pub value: DisplayValue,
}

/// Result of rendering an update
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "fields", rename_all = "snake_case")]
pub enum RenderedChange {
    /// Old and new images are structurally identical
    NoVisibleChanges,
    /// Something changed, but only in hidden fields
    AllFiltered,
    /// Changed fields ordered by key
    Fields(Vec<FieldChange>),
}

/// Rendered payload of any event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RenderedDetails {
    Change(RenderedChange),
    Row(Vec<RenderedField>),
}

/// Resolve how one field value is shown
pub fn display_value(
    key: &str,
    value: Option<&SnapshotValue>,
    references: &BTreeMap<String, EnrichedReference>,
    policy: &AuditSettings,
) -> DisplayValue {
    let Some(value) = value else {
        return DisplayValue::Absent;
    };

    if policy.is_reference_field(key) {
        if let Some(reference) = value.as_str().and_then(|id| references.get(id.trim())) {
            return DisplayValue::Reference(reference.clone());
        }
    }
    DisplayValue::Raw(value.clone())
}

/// Render the delta between two images
pub fn render_change(
    old: &Snapshot,
    new: &Snapshot,
    references: &BTreeMap<String, EnrichedReference>,
    policy: &AuditSettings,
) -> RenderedChange {
    let changed = changed_keys(old, new);
    if changed.is_empty() {
        return RenderedChange::NoVisibleChanges;
    }

    let fields: Vec<FieldChange> = changed
        .into_iter()
        .filter(|key| !policy.is_hidden_field(key))
        .map(|key| FieldChange {
            old: display_value(&key, old.get(&key), references, policy),
            new: display_value(&key, new.get(&key), references, policy),
            field: key,
        })
        .collect();

    if fields.is_empty() {
        RenderedChange::AllFiltered
    } else {
        RenderedChange::Fields(fields)
    }
}

/// Render the allow-listed fields of a single row, in allow-list order
pub fn render_row(
    row: &Snapshot,
    references: &BTreeMap<String, EnrichedReference>,
    policy: &AuditSettings,
) -> Vec<RenderedField> {
    policy
        .display_fields
        .iter()
        .filter_map(|key| {
            row.get(key).map(|value| RenderedField {
                field: key.clone(),
                value: display_value(key, Some(value), references, policy),
            })
        })
        .collect()
}

/// Render an event's payload according to its action
///
/// Only updates render as a delta. Creates and deletes always go through
/// the display allow-list, whatever shape the payload has.
pub fn render_details(
    event: &AuditEvent,
    references: &BTreeMap<String, EnrichedReference>,
    policy: &AuditSettings,
) -> RenderedDetails {
    match (event.action, &event.details) {
        (AuditAction::Updated, AuditDetails::Change(set)) => {
            RenderedDetails::Change(render_change(&set.old, &set.new, references, policy))
        }
        (_, AuditDetails::Row(row)) => RenderedDetails::Row(render_row(row, references, policy)),
        (AuditAction::Deleted, AuditDetails::Change(set)) => {
            RenderedDetails::Row(render_row(&set.old, references, policy))
        }
        (_, AuditDetails::Change(set)) => {
            RenderedDetails::Row(render_row(&set.new, references, policy))
        }
    }
}

/// Group a feed by action, keeping feed order inside each group
pub fn group_by_action(events: &[EventWithActor]) -> BTreeMap<AuditAction, Vec<&EventWithActor>> {
    let mut groups: BTreeMap<AuditAction, Vec<&EventWithActor>> = BTreeMap::new();
    for event in events {
        groups.entry(event.event.action).or_default().push(event);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CapturedEvent;
    use chrono::Utc;
    use serde_json::json;

    fn snap(value: serde_json::Value) -> Snapshot {
        Snapshot::from_json(value).unwrap()
    }

    fn ada() -> BTreeMap<String, EnrichedReference> {
        let mut refs = BTreeMap::new();
        refs.insert(
            "U1".to_string(),
            EnrichedReference {
                id: "U1".into(),
                display_name: "Ada Admin".into(),
                email: Some("ada@x.io".into()),
            },
        );
        refs
    }

    #[test]
    fn test_approval_renders_two_fields_enriched() {
        let old = snap(json!({"status": "pending"}));
        let new = snap(json!({"status": "approved", "approved_by": "U1"}));

        match render_change(&old, &new, &ada(), &AuditSettings::default()) {
            RenderedChange::Fields(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].field, "approved_by");
                assert_eq!(fields[0].old, DisplayValue::Absent);
                assert!(matches!(&fields[0].new, DisplayValue::Reference(r) if r.id == "U1"));
                assert_eq!(fields[1].field, "status");
            }
            other => panic!("expected fields, got {:?}", other),
        }
    }

    #[test]
    fn test_approval_renders_raw_when_unresolved() {
        let old = snap(json!({"status": "pending"}));
        let new = snap(json!({"status": "approved", "approved_by": "U1"}));

        match render_change(&old, &new, &BTreeMap::new(), &AuditSettings::default()) {
            RenderedChange::Fields(fields) => {
                assert_eq!(fields[0].new, DisplayValue::Raw(SnapshotValue::from("U1")));
                assert_eq!(fields[0].new.to_string(), "\"U1\"");
            }
            other => panic!("expected fields, got {:?}", other),
        }
    }

    #[test]
    fn test_no_visible_changes_vs_all_filtered() {
        let old = snap(json!({"title": "Dev", "updated_at": "2025-01-01"}));
        let policy = AuditSettings::default();

        assert_eq!(
            render_change(&old, &old.clone(), &BTreeMap::new(), &policy),
            RenderedChange::NoVisibleChanges
        );

        let touched = snap(json!({"title": "Dev", "updated_at": "2025-01-02"}));
        assert_eq!(
            render_change(&old, &touched, &BTreeMap::new(), &policy),
            RenderedChange::AllFiltered
        );
    }

    #[test]
    fn test_render_row_uses_allow_list() {
        let row = snap(json!({
            "title": "Dev",
            "status": "open",
            "password_hash": "secret",
            "internal_notes": "x"
        }));
        let fields = render_row(&row, &BTreeMap::new(), &AuditSettings::default());
        let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(names, vec!["title", "status"]);
    }

    #[test]
    fn test_reference_display() {
        let value = DisplayValue::Reference(ada()["U1"].clone());
        assert_eq!(value.to_string(), "Ada Admin <ada@x.io>");
        assert_eq!(DisplayValue::Absent.to_string(), "(none)");
    }

    #[test]
    fn test_created_event_uses_allow_list_whatever_the_payload() {
        let captured = CapturedEvent {
            action: AuditAction::Created,
            target_table: "configs".into(),
            target_id: Some("C1".into()),
            target_role: None,
            details: AuditDetails::change(
                snap(json!({"password_hash": "aaa"})),
                snap(json!({"password_hash": "bbb", "name": "main"})),
            ),
            actor_id: None,
            actor_role: None,
        };
        let event = AuditEvent::from_captured(captured, 1, Utc::now());

        match render_details(&event, &BTreeMap::new(), &AuditSettings::default()) {
            RenderedDetails::Row(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "name");
            }
            other => panic!("expected row rendering, got {:?}", other),
        }
    }

    #[test]
    fn test_group_by_action_preserves_order() {
        let make = |action, id: &str, seq| {
            let captured = CapturedEvent {
                action,
                target_table: "jobs".into(),
                target_id: Some(id.into()),
                target_role: None,
                details: AuditDetails::Row(Snapshot::new()),
                actor_id: None,
                actor_role: None,
            };
            EventWithActor::new(AuditEvent::from_captured(captured, seq, Utc::now()), None)
        };
        let feed = vec![
            make(AuditAction::Updated, "J3", 3),
            make(AuditAction::Created, "J2", 2),
            make(AuditAction::Updated, "J1", 1),
        ];

        let groups = group_by_action(&feed);
        assert_eq!(groups.len(), 2);
        let updated: Vec<_> = groups[&AuditAction::Updated]
            .iter()
            .map(|e| e.event.target_id.as_deref().unwrap())
            .collect();
        assert_eq!(updated, vec!["J3", "J1"]);
    }
}
