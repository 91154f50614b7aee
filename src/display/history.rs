//! History display formatting
//!
//! Formats an event feed for terminal output: grouped by action, one header
//! line per event followed by its rendered delta.

use std::collections::BTreeMap;

use crate::audit::render::{group_by_action, render_details, RenderedChange, RenderedDetails};
use crate::config::AuditSettings;
use crate::models::{EnrichedReference, EventFeed, EventWithActor, Snapshot};

/// Format a page of history grouped by action
pub fn format_event_feed(feed: &EventFeed, policy: &AuditSettings) -> String {
    if feed.events.is_empty() {
        return "No audit events found.\n".to_string();
    }

    let target_width = feed
        .events
        .iter()
        .map(|e| target_label(e).len())
        .max()
        .unwrap_or(6)
        .max(6);

    let mut output = String::new();
    for (action, events) in group_by_action(&feed.events) {
        output.push_str(&format!("{} ({})\n", action, events.len()));
        output.push_str(&format!("{:-<width$}\n", "", width = target_width + 50));

        for event in events {
            output.push_str(&format!(
                "{}  {:<id_width$}  {:<target_width$}  {}\n",
                event.event.created_at.format("%Y-%m-%d %H:%M:%S"),
                event.event.id.to_string(),
                target_label(event),
                actor_line(event),
                id_width = 12,
                target_width = target_width,
            ));
            push_details(&mut output, event, &feed.enriched, policy, "    ");
        }
        output.push('\n');
    }

    output
}

/// Format one event with every rendered field
pub fn format_event_details(
    event: &EventWithActor,
    references: &BTreeMap<String, EnrichedReference>,
    policy: &AuditSettings,
) -> String {
    let mut output = String::new();

    output.push_str(&format!("Event:   {}\n", event.event.id));
    output.push_str(&format!("Action:  {}\n", event.event.action));
    output.push_str(&format!("Target:  {}\n", target_label(event)));
    if let Some(role) = &event.event.target_role {
        output.push_str(&format!("Role:    {}\n", role));
    }
    output.push_str(&format!("Actor:   {}\n", actor_line(event)));
    output.push_str(&format!(
        "At:      {}\n",
        event.event.created_at.format("%Y-%m-%d %H:%M:%S%.3f UTC")
    ));
    output.push_str("Changes:\n");
    push_details(&mut output, event, references, policy, "  ");

    output
}

/// Format a stored row as aligned `column: value` lines
pub fn format_row(table: &str, row_id: &str, row: &Snapshot) -> String {
    let mut output = format!("{}/{}\n", table, row_id);

    let key_width = row.keys().map(|k| k.len()).max().unwrap_or(0);
    for (key, value) in row.iter() {
        output.push_str(&format!(
            "  {:<key_width$}  {}\n",
            key,
            value.to_json(),
            key_width = key_width
        ));
    }

    output
}

fn push_details(
    output: &mut String,
    event: &EventWithActor,
    references: &BTreeMap<String, EnrichedReference>,
    policy: &AuditSettings,
    indent: &str,
) {
    match render_details(&event.event, references, policy) {
        RenderedDetails::Change(RenderedChange::NoVisibleChanges) => {
            output.push_str(&format!("{}(no visible changes)\n", indent));
        }
        RenderedDetails::Change(RenderedChange::AllFiltered) => {
            output.push_str(&format!("{}(only hidden fields changed)\n", indent));
        }
        RenderedDetails::Change(RenderedChange::Fields(fields)) => {
            for change in fields {
                output.push_str(&format!(
                    "{}{}: {} -> {}\n",
                    indent, change.field, change.old, change.new
                ));
            }
        }
        RenderedDetails::Row(fields) if fields.is_empty() => {
            output.push_str(&format!("{}(no display fields)\n", indent));
        }
        RenderedDetails::Row(fields) => {
            for field in fields {
                output.push_str(&format!("{}{}: {}\n", indent, field.field, field.value));
            }
        }
    }
}

fn target_label(event: &EventWithActor) -> String {
    match &event.event.target_id {
        Some(id) => format!("{}/{}", event.event.target_table, id),
        None => event.event.target_table.clone(),
    }
}

fn actor_line(event: &EventWithActor) -> String {
    match &event.event.actor_role {
        Some(role) => format!("by {} ({})", event.actor_label(), role),
        None => format!("by {}", event.actor_label()),
    }
}
