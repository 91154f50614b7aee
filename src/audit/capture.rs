//! Change capture
//!
//! Turns one row mutation into at most one [`CapturedEvent`]. Capture runs
//! inside the transaction that performs the write; the transaction appends
//! the staged events on commit and fails the commit if the append fails.
//!
//! Updates always carry the full pre- and post-image. The delta is computed
//! at read time by the diff renderer.

use tracing::debug;

use crate::config::AuditSettings;
use crate::models::{AuditAction, AuditDetails, CapturedEvent, Snapshot};

use super::context::ActorContext;

/// Column copied into `target_role` when the target row carries one
const ROLE_COLUMN: &str = "role";

/// A row-level change as seen by the store's trigger point
#[derive(Debug, Clone, PartialEq)]
pub enum RowMutation {
    Insert {
        table: String,
        row_id: String,
        new: Snapshot,
    },
    Update {
        table: String,
        row_id: String,
        old: Snapshot,
        new: Snapshot,
    },
    Delete {
        table: String,
        row_id: String,
        old: Snapshot,
    },
}

impl RowMutation {
    pub fn table(&self) -> &str {
        match self {
            RowMutation::Insert { table, .. }
            | RowMutation::Update { table, .. }
            | RowMutation::Delete { table, .. } => table,
        }
    }

    pub fn row_id(&self) -> &str {
        match self {
            RowMutation::Insert { row_id, .. }
            | RowMutation::Update { row_id, .. }
            | RowMutation::Delete { row_id, .. } => row_id,
        }
    }

    pub fn action(&self) -> AuditAction {
        match self {
            RowMutation::Insert { .. } => AuditAction::Created,
            RowMutation::Update { .. } => AuditAction::Updated,
            RowMutation::Delete { .. } => AuditAction::Deleted,
        }
    }

    /// The image that describes the row's classification
    fn current_image(&self) -> &Snapshot {
        match self {
            RowMutation::Insert { new, .. } | RowMutation::Update { new, .. } => new,
            RowMutation::Delete { old, .. } => old,
        }
    }

    fn details(&self) -> AuditDetails {
        match self {
            RowMutation::Insert { new, .. } => AuditDetails::Row(new.clone()),
            RowMutation::Update { old, new, .. } => AuditDetails::change(old.clone(), new.clone()),
            RowMutation::Delete { old, .. } => AuditDetails::Row(old.clone()),
        }
    }
}

/// Produce the event for a mutation, or `None` when nothing is recorded
///
/// Nothing is recorded when the bound context asks to skip capture or the
/// table is not audited. Without a bound context the event has no actor.
pub fn capture(
    context: Option<&ActorContext>,
    mutation: &RowMutation,
    policy: &AuditSettings,
) -> Option<CapturedEvent> {
    if context.is_some_and(|ctx| ctx.skip) {
        debug!(
            table = mutation.table(),
            row_id = mutation.row_id(),
            "Capture skipped by actor context"
        );
        return None;
    }

    if !policy.is_audited(mutation.table()) {
        return None;
    }

    let target_role = mutation
        .current_image()
        .get_str(ROLE_COLUMN)
        .map(str::to_string);

    Some(CapturedEvent {
        action: mutation.action(),
        target_table: mutation.table().to_string(),
        target_id: Some(mutation.row_id().to_string()),
        target_role,
        details: mutation.details(),
        actor_id: context.and_then(|ctx| ctx.actor_id.clone()),
        actor_role: context.and_then(|ctx| ctx.actor_role.clone()),
    })
}
