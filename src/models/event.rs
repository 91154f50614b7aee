//! Audit event data structures
//!
//! An [`AuditEvent`] is the immutable record of one row mutation. Events are
//! produced by change capture, appended to the event store and never edited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::EventId;
use super::snapshot::Snapshot;

/// Kind of mutation that was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum AuditAction {
    /// Row was inserted
    Created,
    /// Row was updated
    Updated,
    /// Row was deleted
    Deleted,
}

impl AuditAction {
    /// Parse an action from a string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "created" | "create" | "insert" => Some(Self::Created),
            "updated" | "update" => Some(Self::Updated),
            "deleted" | "delete" => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::Created => write!(f, "CREATED"),
            AuditAction::Updated => write!(f, "UPDATED"),
            AuditAction::Deleted => write!(f, "DELETED"),
        }
    }
}

/// Pre- and post-image of an updated row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeSet {
    pub old: Snapshot,
    pub new: Snapshot,
}

/// Event payload
///
/// Serialized with an explicit `kind` so a row whose own columns happen to
/// be `old` and `new` never reads back as a change set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum AuditDetails {
    Change(ChangeSet),
    Row(Snapshot),
}

impl AuditDetails {
    pub fn change(old: Snapshot, new: Snapshot) -> Self {
        AuditDetails::Change(ChangeSet { old, new })
    }

    /// All snapshots carried by the payload, old image first
    pub fn snapshots(&self) -> Vec<&Snapshot> {
        match self {
            AuditDetails::Change(set) => vec![&set.old, &set.new],
            AuditDetails::Row(row) => vec![row],
        }
    }
}

/// An event produced by change capture, not yet appended
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
    pub action: AuditAction,
    pub target_table: String,
    pub target_id: Option<String>,
    pub target_role: Option<String>,
    pub details: AuditDetails,
    pub actor_id: Option<String>,
    pub actor_role: Option<String>,
}

/// A single persisted audit event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: EventId,

    /// Append sequence, breaks `created_at` ties
    pub seq: u64,

    pub action: AuditAction,

    pub target_table: String,

    pub target_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_role: Option<String>,

    pub details: AuditDetails,

    pub actor_id: Option<String>,

    /// Role at the time of the action, never re-resolved
    pub actor_role: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Stamp a captured event with its identity in the log
    pub fn from_captured(captured: CapturedEvent, seq: u64, created_at: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            seq,
            action: captured.action,
            target_table: captured.target_table,
            target_id: captured.target_id,
            target_role: captured.target_role,
            details: captured.details,
            actor_id: captured.actor_id,
            actor_role: captured.actor_role,
            created_at,
        }
    }

    /// Display ordering: newest first, higher sequence first on a tie
    pub fn newest_first(a: &AuditEvent, b: &AuditEvent) -> std::cmp::Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.seq.cmp(&a.seq))
    }

    /// Format the event for a one-line human-readable summary
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} {}",
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.action,
            self.target_table
        );

        if let Some(target_id) = &self.target_id {
            output.push_str(&format!("/{}", target_id));
        }

        match (&self.actor_id, &self.actor_role) {
            (Some(actor), Some(role)) => output.push_str(&format!(" by {} ({})", actor, role)),
            (Some(actor), None) => output.push_str(&format!(" by {}", actor)),
            _ => output.push_str(" by system"),
        }

        output
    }
}
