//! Storage layer for the audit trail
//!
//! Provides JSON file storage for domain tables, the append-only event log
//! and the transaction that ties a write to its captured events.

pub mod events;
pub mod file_io;
mod lock;
pub mod rows;
pub mod transaction;

pub use events::EventStore;
pub use file_io::{read_json, write_json_atomic};
pub use rows::{validate_table_name, RowRepository, Table};
pub use transaction::{CommitReceipt, Transaction};

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::audit::query::AuditQueryService;
use crate::config::paths::AuditPaths;
use crate::config::settings::{Relationship, Settings};
use crate::error::{AuditError, AuditResult};
use crate::models::{
    ActorSummary, AuditAction, AuditDetails, AuditEvent, EventFilter, EventWithActor, Identity,
    PageRequest, Snapshot,
};
use crate::repository::{AuditEventSource, IdentityDirectory};

use lock::WriteLock;

/// Main storage coordinator
///
/// Readers go through the repositories directly. Writers go through
/// [`Database::begin`]; only one transaction is open at a time across every
/// handle on the same data directory.
pub struct Database {
    paths: AuditPaths,
    settings: Settings,
    rows: RowRepository,
    events: EventStore,
    writer: Mutex<()>,
}

impl Database {
    /// Open the database, creating directories and loading all data
    pub fn open(paths: AuditPaths, settings: Settings) -> AuditResult<Self> {
        paths.ensure_directories()?;

        let rows = RowRepository::new(paths.clone());
        rows.load()?;
        let events = EventStore::open(paths.event_log())?;

        debug!(
            base_dir = %paths.base_dir().display(),
            events = events.count()?,
            "Opened audit database"
        );

        Ok(Self {
            paths,
            settings,
            rows,
            events,
            writer: Mutex::new(()),
        })
    }

    /// Start a write transaction
    ///
    /// Blocks until any other open transaction finishes, in this process or
    /// another. Tables and the event log are reloaded under the lock, so the
    /// transaction always starts from what was last committed.
    pub fn begin(&self) -> AuditResult<Transaction<'_>> {
        let guard = self.writer.lock().map_err(|e| {
            AuditError::Storage(format!("Failed to acquire writer lock: {}", e))
        })?;
        let lock = WriteLock::acquire(&self.paths.lock_file())?;

        self.rows.load()?;
        self.recover()?;

        Ok(Transaction::new(self, guard, lock))
    }

    /// Resolve events an interrupted writer left unsealed
    ///
    /// If the rows already show every change the batch describes, only the
    /// commit marker was lost and the batch is sealed. Otherwise the write
    /// never landed and the events are cut off.
    fn recover(&self) -> AuditResult<()> {
        let Some(batch) = self.events.refresh()? else {
            return Ok(());
        };

        if batch.is_complete() && !batch.events().is_empty() && self.rows_match(batch.events())? {
            warn!(
                events = batch.events().len(),
                "Sealing audit events of an interrupted commit"
            );
            self.events.commit_batch(&batch)?;
        } else {
            warn!(
                events = batch.events().len(),
                "Discarding audit events of an unfinished write"
            );
            self.events.discard_batch(&batch)?;
        }
        Ok(())
    }

    /// Whether the committed rows equal the last image each event left
    fn rows_match(&self, events: &[AuditEvent]) -> AuditResult<bool> {
        let mut last: HashMap<(&str, &str), &AuditEvent> = HashMap::new();
        for event in events {
            if let Some(id) = event.target_id.as_deref() {
                last.insert((event.target_table.as_str(), id), event);
            }
        }

        for ((table, id), event) in last {
            let expected: Option<&Snapshot> = match (event.action, &event.details) {
                (AuditAction::Deleted, _) => None,
                (_, AuditDetails::Change(set)) => Some(&set.new),
                (_, AuditDetails::Row(row)) => Some(row),
            };
            if self.rows.get(table, id)?.as_ref() != expected {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Read service over this database
    pub fn history(&self) -> AuditQueryService<'_, Self, Self> {
        AuditQueryService::new(self, self, &self.settings)
    }

    pub fn paths(&self) -> &AuditPaths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn rows(&self) -> &RowRepository {
        &self.rows
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    fn identities(&self, ids: &BTreeSet<String>) -> AuditResult<HashMap<String, Identity>> {
        Ok(self
            .rows
            .get_many(&self.settings.identity_table, ids.iter())?
            .into_iter()
            .map(|(id, row)| {
                let identity = Identity::from_row(&id, &row);
                (id, identity)
            })
            .collect())
    }
}

impl AuditEventSource for Database {
    fn query(&self, filter: &EventFilter, page: PageRequest) -> AuditResult<Vec<AuditEvent>> {
        self.events.query(filter, page)
    }

    fn query_joined(
        &self,
        filter: &EventFilter,
        page: PageRequest,
    ) -> AuditResult<Vec<EventWithActor>> {
        if !self.settings.has_actor_relationship() {
            return Err(AuditError::SchemaRelationshipMissing {
                relationship: Relationship::actor_join(&self.settings.identity_table).to_string(),
            });
        }

        let events = self.events.query(filter, page)?;
        let actor_ids: BTreeSet<String> =
            events.iter().filter_map(|e| e.actor_id.clone()).collect();
        let actors = self
            .identities(&actor_ids)
            .map_err(AuditError::into_store_unavailable)?;

        Ok(events
            .into_iter()
            .map(|event| {
                let actor = event
                    .actor_id
                    .as_ref()
                    .and_then(|id| actors.get(id))
                    .map(ActorSummary::from);
                EventWithActor::new(event, actor)
            })
            .collect())
    }
}

impl IdentityDirectory for Database {
    fn lookup(&self, ids: &BTreeSet<String>) -> AuditResult<HashMap<String, Identity>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.identities(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn open_db(settings: Settings) -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let paths = AuditPaths::with_base_dir(temp_dir.path().to_path_buf());
        let db = Database::open(paths, settings).unwrap();
        (temp_dir, db)
    }

    fn seed(db: &Database) {
        let mut tx = db.begin().unwrap();
        tx.bind_actor("", None, true).unwrap();
        tx.insert(
            "profiles",
            "U1",
            Snapshot::from_json(json!({"full_name": "Ada Admin", "email": "ada@x.io", "role": "admin"}))
                .unwrap(),
        )
        .unwrap();
        tx.commit().unwrap();

        let mut tx = db.begin().unwrap();
        tx.bind_actor("U1", Some("admin"), false).unwrap();
        tx.insert("jobs", "J1", Snapshot::from_json(json!({"title": "Dev"})).unwrap())
            .unwrap();
        tx.commit().unwrap();

        let mut tx = db.begin().unwrap();
        tx.insert("jobs", "J2", Snapshot::from_json(json!({"title": "Ops"})).unwrap())
            .unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn test_joined_query_attaches_actor() {
        let (_temp, db) = open_db(Settings::default());
        seed(&db);

        let rows = db
            .query_joined(&EventFilter::new(), PageRequest::default())
            .unwrap();
        assert_eq!(rows.len(), 2);
        // Newest first: J2 was written without an actor.
        assert!(rows[0].actor.is_none());
        assert_eq!(
            rows[1].actor.as_ref().and_then(|a| a.full_name.as_deref()),
            Some("Ada Admin")
        );
    }

    #[test]
    fn test_joined_query_requires_relationship() {
        let settings = Settings {
            relationships: Vec::new(),
            ..Settings::default()
        };
        let (_temp, db) = open_db(settings);
        seed(&db);

        let err = db
            .query_joined(&EventFilter::new(), PageRequest::default())
            .unwrap_err();
        assert!(err.is_relationship_missing());

        // The plain query is unaffected.
        assert_eq!(db.query(&EventFilter::new(), PageRequest::default()).unwrap().len(), 2);
    }

    #[test]
    fn test_lookup_returns_only_known_ids() {
        let (_temp, db) = open_db(Settings::default());
        seed(&db);

        let ids: BTreeSet<String> = ["U1".to_string(), "U404".to_string()].into();
        let found = db.lookup(&ids).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["U1"].email.as_deref(), Some("ada@x.io"));
        assert!(db.lookup(&BTreeSet::new()).unwrap().is_empty());
    }

    fn reopen(temp: &TempDir) -> Database {
        let paths = AuditPaths::with_base_dir(temp.path().to_path_buf());
        Database::open(paths, Settings::default()).unwrap()
    }

    fn snap(value: serde_json::Value) -> Snapshot {
        Snapshot::from_json(value).unwrap()
    }

    #[test]
    fn test_row_shaped_like_a_change_reloads_as_a_row() {
        use crate::audit::render::{render_details, RenderedDetails};

        let (temp, db) = open_db(Settings::default());
        let mut tx = db.begin().unwrap();
        tx.insert(
            "configs",
            "C1",
            snap(json!({"old": {"password_hash": "aaa"}, "new": {"password_hash": "bbb"}})),
        )
        .unwrap();
        tx.commit().unwrap();
        drop(db);

        let db = reopen(&temp);
        let events = db.query(&EventFilter::new(), PageRequest::default()).unwrap();
        assert_eq!(events[0].action, AuditAction::Created);
        assert!(matches!(events[0].details, AuditDetails::Row(_)));

        let policy = &db.settings().audit;
        assert_eq!(
            render_details(&events[0], &Default::default(), policy),
            RenderedDetails::Row(Vec::new())
        );
    }

    #[test]
    fn test_two_handles_share_one_sequence() {
        let (temp, first) = open_db(Settings::default());
        let second = reopen(&temp);

        let mut tx = first.begin().unwrap();
        tx.insert("jobs", "J1", snap(json!({"title": "Dev"}))).unwrap();
        tx.commit().unwrap();

        let mut tx = second.begin().unwrap();
        tx.insert("jobs", "J2", snap(json!({"title": "Ops"}))).unwrap();
        tx.commit().unwrap();

        let fresh = reopen(&temp);
        let events = fresh.query(&EventFilter::new(), PageRequest::default()).unwrap();
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 1]);
        assert!(fresh.rows().get("jobs", "J1").unwrap().is_some());
        assert!(fresh.rows().get("jobs", "J2").unwrap().is_some());
    }

    #[test]
    fn test_stale_handle_updates_from_latest_row() {
        let (temp, first) = open_db(Settings::default());
        let second = reopen(&temp);

        let mut tx = first.begin().unwrap();
        tx.insert("jobs", "J1", snap(json!({"status": "pending"}))).unwrap();
        tx.commit().unwrap();

        let mut tx = second.begin().unwrap();
        tx.update("jobs", "J1", &snap(json!({"status": "approved"}))).unwrap();
        tx.commit().unwrap();

        let events = second.query(&EventFilter::new(), PageRequest::default()).unwrap();
        assert_eq!(events.len(), 2);
        match &events[0].details {
            AuditDetails::Change(set) => {
                assert_eq!(set.old.get_str("status"), Some("pending"));
                assert_eq!(set.new.get_str("status"), Some("approved"));
            }
            other => panic!("expected change set, got {:?}", other),
        }
    }

    fn created(table: &str, id: &str, row: &Snapshot) -> crate::models::CapturedEvent {
        crate::models::CapturedEvent {
            action: AuditAction::Created,
            target_table: table.into(),
            target_id: Some(id.into()),
            target_role: None,
            details: AuditDetails::Row(row.clone()),
            actor_id: None,
            actor_role: None,
        }
    }

    #[test]
    fn test_begin_seals_batch_whose_rows_landed() {
        let (temp, db) = open_db(Settings::default());
        let job = snap(json!({"title": "Dev"}));

        // Events and rows on disk, commit marker never written
        db.events()
            .write_batch(vec![created("jobs", "J1", &job)], chrono::Utc::now())
            .unwrap();
        let mut jobs = Table::new();
        jobs.insert("J1".into(), job);
        db.rows()
            .replace_tables(HashMap::from([("jobs".to_string(), jobs)]), &HashMap::new())
            .unwrap();
        drop(db);

        let db = reopen(&temp);
        assert_eq!(db.events().count().unwrap(), 0);

        db.begin().unwrap().rollback();
        assert_eq!(db.events().count().unwrap(), 1);
        assert_eq!(reopen(&temp).events().count().unwrap(), 1);
    }

    #[test]
    fn test_begin_discards_batch_whose_rows_never_landed() {
        let (temp, db) = open_db(Settings::default());
        db.events()
            .write_batch(
                vec![created("jobs", "J1", &snap(json!({"title": "Dev"})))],
                chrono::Utc::now(),
            )
            .unwrap();
        drop(db);

        let db = reopen(&temp);
        let mut tx = db.begin().unwrap();
        tx.insert("jobs", "J2", snap(json!({"title": "Ops"}))).unwrap();
        tx.commit().unwrap();

        let events = reopen(&temp)
            .query(&EventFilter::new(), PageRequest::default())
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target_id.as_deref(), Some("J2"));
        assert_eq!(events[0].seq, 1);
    }

    #[test]
    fn test_reopen_sees_committed_data() {
        let (temp, db) = open_db(Settings::default());
        seed(&db);
        drop(db);

        let paths = AuditPaths::with_base_dir(temp.path().to_path_buf());
        let db = Database::open(paths, Settings::default()).unwrap();
        assert_eq!(db.events().count().unwrap(), 2);
        assert!(db.rows().get("jobs", "J2").unwrap().is_some());
    }
}
