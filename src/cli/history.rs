//! History CLI commands
//!
//! The administrator's read endpoint: a filtered, paginated event feed.

use std::collections::BTreeSet;
use std::iter;

use clap::Subcommand;

use crate::audit::enrichment::enrich;
use crate::display::history::{format_event_details, format_event_feed};
use crate::error::{AuditError, AuditResult};
use crate::models::{ActorSummary, EventFeed, EventFilter, EventWithActor, PageRequest};
use crate::repository::IdentityDirectory;
use crate::storage::Database;

/// History subcommands
#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List audit events, newest first
    List {
        /// Only events on this table
        #[arg(short, long)]
        table: Option<String>,
        /// Only events on this row id
        #[arg(long)]
        target_id: Option<String>,
        /// Only events whose target row has this role
        #[arg(short, long)]
        role: Option<String>,
        /// Page number (starts at 1)
        #[arg(short, long, allow_hyphen_values = true)]
        page: Option<String>,
        /// Events per page (at most 200)
        #[arg(short, long, allow_hyphen_values = true)]
        limit: Option<String>,
        /// Print the feed as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one event with all rendered fields
    Show {
        /// Event ID or prefix
        event: String,
        /// Print the event as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Handle a history command
pub fn handle_history_command(db: &Database, cmd: HistoryCommands) -> AuditResult<()> {
    let policy = &db.settings().audit;

    match cmd {
        HistoryCommands::List {
            table,
            target_id,
            role,
            page,
            limit,
            json,
        } => {
            let mut filter = EventFilter::new();
            if let Some(table) = table {
                filter = filter.table(table);
            }
            if let Some(target_id) = target_id {
                filter = filter.target_id(target_id);
            }
            if let Some(role) = role {
                filter = filter.role(role);
            }

            let default_limit = db.settings().pagination.effective_default_limit().to_string();
            let request = PageRequest::parse(
                page.as_deref(),
                Some(limit.as_deref().unwrap_or(&default_limit)),
            );

            let feed = db.history().list_events(&filter, request)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&feed)?);
            } else {
                print!("{}", format_event_feed(&feed, policy));
                println!(
                    "Page {} ({} per page), {} event(s)",
                    request.page(),
                    request.limit(),
                    feed.events.len()
                );
            }
        }

        HistoryCommands::Show { event, json } => {
            let found = db
                .events()
                .find(&event)?
                .ok_or_else(|| AuditError::event_not_found(&event))?;

            let actor = match &found.actor_id {
                Some(id) => {
                    let ids = BTreeSet::from([id.clone()]);
                    db.lookup(&ids)?.get(id).map(ActorSummary::from)
                }
                None => None,
            };
            let enriched = enrich(iter::once(&found), db, policy);
            let with_actor = EventWithActor::new(found, actor);

            if json {
                let feed = EventFeed {
                    events: vec![with_actor],
                    enriched,
                };
                println!("{}", serde_json::to_string_pretty(&feed)?);
            } else {
                print!("{}", format_event_details(&with_actor, &enriched, policy));
            }
        }
    }

    Ok(())
}
