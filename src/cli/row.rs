//! Row CLI commands
//!
//! Domain writes for administration and testing. Each command runs in its
//! own transaction with the actor given on the command line.

use clap::{Args, Subcommand};
use tracing::warn;

use crate::display::history::format_row;
use crate::error::{AuditError, AuditResult};
use crate::models::Snapshot;
use crate::storage::{Database, Transaction};

/// Who the write is attributed to
#[derive(Args, Debug, Clone, Default)]
pub struct ActorArgs {
    /// Acting user id
    #[arg(long, env = "AUDIT_TRAIL_ACTOR")]
    pub actor: Option<String>,
    /// Acting user's role
    #[arg(long)]
    pub role: Option<String>,
    /// Write without recording an audit event
    #[arg(long)]
    pub skip: bool,
}

/// Row subcommands
#[derive(Subcommand)]
pub enum RowCommands {
    /// Insert a row
    Insert {
        /// Table name
        table: String,
        /// Row id
        id: String,
        /// Row columns as a JSON object
        data: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Update columns of a row
    Update {
        /// Table name
        table: String,
        /// Row id
        id: String,
        /// Changed columns as a JSON object
        patch: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Delete a row
    Delete {
        /// Table name
        table: String,
        /// Row id
        id: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Show a row
    Show {
        /// Table name
        table: String,
        /// Row id
        id: String,
    },
    /// List row ids of a table
    List {
        /// Table name
        table: String,
    },
}

/// Handle a row command
pub fn handle_row_command(db: &Database, cmd: RowCommands) -> AuditResult<()> {
    match cmd {
        RowCommands::Insert {
            table,
            id,
            data,
            actor,
        } => {
            let row = parse_row(&data)?;
            let mut tx = db.begin()?;
            bind(&mut tx, &actor)?;
            tx.insert(&table, &id, row)?;
            let receipt = tx.commit()?;
            println!(
                "Inserted {}/{} ({} audit event(s))",
                table,
                id,
                receipt.event_ids.len()
            );
        }

        RowCommands::Update {
            table,
            id,
            patch,
            actor,
        } => {
            let patch = parse_row(&patch)?;
            let mut tx = db.begin()?;
            bind(&mut tx, &actor)?;
            tx.update(&table, &id, &patch)?;
            let receipt = tx.commit()?;
            println!(
                "Updated {}/{} ({} audit event(s))",
                table,
                id,
                receipt.event_ids.len()
            );
        }

        RowCommands::Delete { table, id, actor } => {
            let mut tx = db.begin()?;
            bind(&mut tx, &actor)?;
            tx.delete(&table, &id)?;
            let receipt = tx.commit()?;
            println!(
                "Deleted {}/{} ({} audit event(s))",
                table,
                id,
                receipt.event_ids.len()
            );
        }

        RowCommands::Show { table, id } => {
            let row = db
                .rows()
                .get(&table, &id)?
                .ok_or_else(|| AuditError::row_not_found(&table, &id))?;
            print!("{}", format_row(&table, &id, &row));
        }

        RowCommands::List { table } => {
            let rows = db.rows().list(&table)?;
            if rows.is_empty() {
                println!("No rows in '{}'.", table);
            }
            for (id, _) in rows {
                println!("{}", id);
            }
        }
    }

    Ok(())
}

fn parse_row(raw: &str) -> AuditResult<Snapshot> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| AuditError::Validation(format!("Invalid JSON for row: {}", e)))?;
    Snapshot::from_json(value)
}

/// Bind the command-line actor; a bad actor id is logged, not fatal
fn bind(tx: &mut Transaction<'_>, args: &ActorArgs) -> AuditResult<()> {
    if args.actor.is_none() {
        if let Some(role) = &args.role {
            warn!(role = %role, "Ignoring --role without --actor");
        }
    }

    match &args.actor {
        Some(actor) => tx.bind_actor_or_warn(actor, args.role.as_deref(), args.skip),
        None if args.skip => tx.bind_actor("", None, true)?,
        None => {}
    }
    Ok(())
}
