//! Write transactions
//!
//! A [`Transaction`] is the unit of work: it holds the database's writer
//! locks, the actor binding and the staged row changes with their captured
//! events. Nothing is visible to readers until [`Transaction::commit`]. The
//! events are written first, the row files second, and a commit marker
//! seals the events last; a failure at any step leaves neither behind.

use std::collections::HashMap;
use std::sync::MutexGuard;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::audit::capture::{capture, RowMutation};
use crate::audit::context::ActorContext;
use crate::error::{AuditError, AuditResult};
use crate::models::{CapturedEvent, EventId, Snapshot};

use super::lock::WriteLock;
use super::rows::{validate_table_name, Table};
use super::Database;

/// Outcome of a successful commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Events appended by this transaction, in capture order
    pub event_ids: Vec<EventId>,
    /// Tables whose files were rewritten
    pub tables: Vec<String>,
}

/// A single unit of work against the database
pub struct Transaction<'db> {
    db: &'db Database,
    _lock: WriteLock,
    _writer: MutexGuard<'db, ()>,
    actor: Option<ActorContext>,
    started_at: DateTime<Utc>,
    previous: HashMap<String, Table>,
    working: HashMap<String, Table>,
    staged: Vec<CapturedEvent>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: &'db Database, writer: MutexGuard<'db, ()>, lock: WriteLock) -> Self {
        Self {
            db,
            _lock: lock,
            _writer: writer,
            actor: None,
            started_at: Utc::now(),
            previous: HashMap::new(),
            working: HashMap::new(),
            staged: Vec::new(),
        }
    }

    /// Attribute subsequent writes in this transaction to an actor
    ///
    /// Must be called before the writes it should attribute. A `skip`
    /// binding suppresses capture for the writes that follow.
    pub fn bind_actor(
        &mut self,
        actor_id: &str,
        actor_role: Option<&str>,
        skip: bool,
    ) -> AuditResult<()> {
        let context = ActorContext::new(actor_id, actor_role, skip)?;
        debug!(
            actor_id = context.actor_id.as_deref(),
            actor_role = context.actor_role.as_deref(),
            skip = context.skip,
            "Bound actor context"
        );
        self.actor = Some(context);
        Ok(())
    }

    /// Best-effort binding: a failure is logged and the writes go ahead
    /// without an actor
    pub fn bind_actor_or_warn(&mut self, actor_id: &str, actor_role: Option<&str>, skip: bool) {
        if let Err(e) = self.bind_actor(actor_id, actor_role, skip) {
            warn!(error = %e, "Proceeding without actor attribution");
            self.actor = None;
        }
    }

    /// Remove the binding; later writes are recorded without an actor
    pub fn clear_actor(&mut self) {
        self.actor = None;
    }

    pub fn actor(&self) -> Option<&ActorContext> {
        self.actor.as_ref()
    }

    /// Read a row, including this transaction's own uncommitted writes
    pub fn get(&self, table: &str, row_id: &str) -> AuditResult<Option<Snapshot>> {
        match self.working.get(table) {
            Some(rows) => Ok(rows.get(row_id).cloned()),
            None => self.db.rows().get(table, row_id),
        }
    }

    /// Insert a new row
    pub fn insert(&mut self, table: &str, row_id: &str, row: Snapshot) -> AuditResult<()> {
        validate_row_id(row_id)?;
        let rows = self.table_mut(table)?;

        if rows.contains_key(row_id) {
            return Err(AuditError::Validation(format!(
                "Row already exists: {}/{}",
                table, row_id
            )));
        }
        rows.insert(row_id.to_string(), row.clone());

        self.record(RowMutation::Insert {
            table: table.to_string(),
            row_id: row_id.to_string(),
            new: row,
        });
        Ok(())
    }

    /// Apply a column patch to an existing row, returning the post-image
    pub fn update(&mut self, table: &str, row_id: &str, patch: &Snapshot) -> AuditResult<Snapshot> {
        let rows = self.table_mut(table)?;

        let old = rows
            .get(row_id)
            .cloned()
            .ok_or_else(|| AuditError::row_not_found(table, row_id))?;
        let new = old.merged(patch);
        rows.insert(row_id.to_string(), new.clone());

        self.record(RowMutation::Update {
            table: table.to_string(),
            row_id: row_id.to_string(),
            old,
            new: new.clone(),
        });
        Ok(new)
    }

    /// Delete a row, returning its last image
    pub fn delete(&mut self, table: &str, row_id: &str) -> AuditResult<Snapshot> {
        let rows = self.table_mut(table)?;

        let old = rows
            .remove(row_id)
            .ok_or_else(|| AuditError::row_not_found(table, row_id))?;

        self.record(RowMutation::Delete {
            table: table.to_string(),
            row_id: row_id.to_string(),
            old: old.clone(),
        });
        Ok(old)
    }

    /// Number of events this transaction will append on commit
    pub fn staged_events(&self) -> usize {
        self.staged.len()
    }

    /// Persist the staged events and rows together
    pub fn commit(self) -> AuditResult<CommitReceipt> {
        if self.working.is_empty() {
            return Ok(CommitReceipt::default());
        }

        let Transaction {
            db,
            _lock,
            _writer,
            started_at,
            previous,
            working,
            staged,
            ..
        } = self;

        let batch = db.events().write_batch(staged, started_at)?;

        let mut tables: Vec<String> = working.keys().cloned().collect();
        tables.sort();

        if let Err(e) = db.rows().replace_tables(working.clone(), &previous) {
            db.events().discard_batch(&batch)?;
            return Err(e);
        }

        let event_ids = match db.events().commit_batch(&batch) {
            Ok(ids) => ids,
            Err(e) => {
                if let Err(restore_err) = db.rows().replace_tables(previous, &working) {
                    return Err(AuditError::StoreUnavailable(format!(
                        "Failed to restore tables after unsealed commit ({}): {}",
                        e, restore_err
                    )));
                }
                db.events().discard_batch(&batch)?;
                return Err(e);
            }
        };

        info!(
            events = event_ids.len(),
            tables = ?tables,
            "Committed transaction"
        );

        Ok(CommitReceipt { event_ids, tables })
    }

    /// Discard all staged changes
    pub fn rollback(self) {
        debug!(
            staged_events = self.staged.len(),
            "Rolled back transaction"
        );
    }

    fn table_mut(&mut self, table: &str) -> AuditResult<&mut Table> {
        validate_table_name(table)?;

        if !self.working.contains_key(table) {
            let mut committed = self.db.rows().snapshot_tables([table])?;
            let rows = committed.remove(table).unwrap_or_default();
            self.previous.insert(table.to_string(), rows.clone());
            self.working.insert(table.to_string(), rows);
        }

        self.working
            .get_mut(table)
            .ok_or_else(|| AuditError::Storage(format!("Table '{}' not staged", table)))
    }

    fn record(&mut self, mutation: RowMutation) {
        if let Some(event) = capture(self.actor.as_ref(), &mutation, &self.db.settings().audit) {
            self.staged.push(event);
        }
    }
}

fn validate_row_id(row_id: &str) -> AuditResult<()> {
    if row_id.trim().is_empty() {
        return Err(AuditError::Validation("Row id cannot be empty".into()));
    }
    Ok(())
}
