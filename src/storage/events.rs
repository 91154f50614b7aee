//! Append-only audit event store
//!
//! The log file is line-delimited JSON (JSONL). A transaction appends its
//! events and then one commit marker that seals them:
//!
//! ```text
//! {"id":"…","seq":7,"action":"created",…}
//! {"id":"…","seq":8,"action":"updated",…}
//! {"commit":{"through_seq":8,"events":2}}
//! ```
//!
//! Only sealed events are ever visible. Lines after the last marker belong
//! to a write that never finished; [`EventStore::open`] ignores them and
//! [`Database::begin`](super::Database::begin) resolves them under the
//! writer lock.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AuditError, AuditResult};
use crate::models::{AuditEvent, CapturedEvent, EventFilter, EventId, PageRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct CommitMarker {
    through_seq: u64,
    events: usize,
}

/// One line of the log; events serialize as themselves
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LogLine {
    Commit { commit: CommitMarker },
    Event(Box<AuditEvent>),
}

/// Events on disk but not yet sealed by a commit marker
#[derive(Debug)]
pub(crate) struct StagedBatch {
    events: Vec<AuditEvent>,
    /// File offset where the batch starts
    start: u64,
    /// File offset just past the batch
    end: u64,
    end_line: usize,
    /// False when the last line was cut short
    complete: bool,
}

impl StagedBatch {
    pub(crate) fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.complete
    }
}

#[derive(Debug, Default)]
struct LogState {
    events: Vec<AuditEvent>,
    /// Bytes of the file covered by commit markers
    sealed_len: u64,
    sealed_lines: usize,
    next_seq: u64,
}

/// Store for audit events
pub struct EventStore {
    log_path: PathBuf,
    state: RwLock<LogState>,
}

impl EventStore {
    /// Open the store, reading the sealed part of any existing log
    pub fn open(log_path: PathBuf) -> AuditResult<Self> {
        let scan = scan_log(&log_path, &LogState::fresh())?;
        if let Some(pending) = &scan.pending {
            debug!(
                events = pending.events.len(),
                "Ignoring unsealed audit events at end of log"
            );
        }

        Ok(Self {
            log_path,
            state: RwLock::new(LogState {
                events: scan.sealed,
                sealed_len: scan.sealed_len,
                sealed_lines: scan.sealed_lines,
                next_seq: scan.next_seq,
            }),
        })
    }

    /// Write the events of one transaction without making them visible
    ///
    /// Every event shares the transaction timestamp; the sequence number
    /// keeps their order. The lines are synced to disk on return. The
    /// caller must hold the writer lock and finish with either
    /// [`commit_batch`](Self::commit_batch) or
    /// [`discard_batch`](Self::discard_batch).
    pub(crate) fn write_batch(
        &self,
        captured: Vec<CapturedEvent>,
        created_at: DateTime<Utc>,
    ) -> AuditResult<StagedBatch> {
        let (start, start_line, mut next_seq) = {
            let state = self.read_state()?;
            (state.sealed_len, state.sealed_lines, state.next_seq)
        };

        let mut events = Vec::with_capacity(captured.len());
        for event in captured {
            events.push(AuditEvent::from_captured(event, next_seq, created_at));
            next_seq += 1;
        }

        let mut batch = StagedBatch {
            start,
            end: start,
            end_line: start_line + events.len(),
            complete: true,
            events,
        };
        if batch.events.is_empty() {
            return Ok(batch);
        }

        let mut buf = String::new();
        for event in &batch.events {
            buf.push_str(&to_line(event)?);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.log_path)
            .map_err(|e| AuditError::Io(format!("Failed to open audit log: {}", e)))?;

        if let Err(e) = write_at(&mut file, start, buf.as_bytes()) {
            file.set_len(start).map_err(|trunc_err| {
                AuditError::StoreUnavailable(format!(
                    "Failed to truncate audit log after failed append ({}): {}",
                    e, trunc_err
                ))
            })?;
            return Err(AuditError::Io(format!("Failed to write audit events: {}", e)));
        }

        batch.end = start + buf.len() as u64;
        debug!(count = batch.events.len(), "Wrote audit events");
        Ok(batch)
    }

    /// Seal a written batch and publish its events to readers
    pub(crate) fn commit_batch(&self, batch: &StagedBatch) -> AuditResult<Vec<EventId>> {
        let Some(last) = batch.events.last() else {
            return Ok(Vec::new());
        };

        let marker = to_line(&LogLine::Commit {
            commit: CommitMarker {
                through_seq: last.seq,
                events: batch.events.len(),
            },
        })?;

        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.log_path)
            .map_err(|e| AuditError::Io(format!("Failed to open audit log: {}", e)))?;
        write_at(&mut file, batch.end, marker.as_bytes())
            .map_err(|e| AuditError::Io(format!("Failed to seal audit events: {}", e)))?;

        let ids = batch.events.iter().map(|e| e.id).collect();

        let mut state = self.write_state()?;
        state.sealed_len = batch.end + marker.len() as u64;
        state.sealed_lines = batch.end_line + 1;
        state.next_seq = state.next_seq.max(last.seq + 1);
        state.events.extend(batch.events.iter().cloned());

        debug!(count = batch.events.len(), "Committed audit events");
        Ok(ids)
    }

    /// Cut an unsealed batch off the end of the log
    ///
    /// Fails with `StoreUnavailable`; the tail then stays on disk until the
    /// next writer resolves it.
    pub(crate) fn discard_batch(&self, batch: &StagedBatch) -> AuditResult<()> {
        OpenOptions::new()
            .write(true)
            .open(&self.log_path)
            .and_then(|file| {
                file.set_len(batch.start)?;
                file.sync_all()
            })
            .map_err(|e| {
                AuditError::StoreUnavailable(format!(
                    "Failed to discard unsealed audit events: {}",
                    e
                ))
            })?;

        debug!(count = batch.events.len(), "Discarded audit events");
        Ok(())
    }

    /// Catch up with batches sealed by other handles on the same log
    ///
    /// Returns whatever unsealed tail follows the last marker. Only
    /// meaningful while holding the writer lock.
    pub(crate) fn refresh(&self) -> AuditResult<Option<StagedBatch>> {
        let known = {
            let state = self.read_state()?;
            LogState {
                events: Vec::new(),
                sealed_len: state.sealed_len,
                sealed_lines: state.sealed_lines,
                next_seq: state.next_seq,
            }
        };

        let file_len = match std::fs::metadata(&self.log_path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(AuditError::Io(format!("Failed to stat audit log: {}", e))),
        };

        // A shorter file means the log was replaced; read it again in full
        let rescan = file_len < known.sealed_len;
        let from = if rescan { LogState::fresh() } else { known };
        let scan = scan_log(&self.log_path, &from)?;

        let mut state = self.write_state()?;
        if rescan {
            warn!(path = %self.log_path.display(), "Audit log shrank, reloading");
            state.events = scan.sealed;
        } else {
            state.events.extend(scan.sealed);
        }
        state.sealed_len = scan.sealed_len;
        state.sealed_lines = scan.sealed_lines;
        state.next_seq = scan.next_seq;

        Ok(scan.pending)
    }

    /// Events matching `filter`, newest first, paged
    pub fn query(&self, filter: &EventFilter, page: PageRequest) -> AuditResult<Vec<AuditEvent>> {
        let state = self.read_state()?;

        let mut matching: Vec<&AuditEvent> =
            state.events.iter().filter(|e| filter.matches(e)).collect();
        matching.sort_by(|a, b| AuditEvent::newest_first(a, b));

        Ok(matching
            .into_iter()
            .skip(page.offset())
            .take(page.limit() as usize)
            .cloned()
            .collect())
    }

    /// Find one event by full id or a unique display prefix
    pub fn find(&self, identifier: &str) -> AuditResult<Option<AuditEvent>> {
        let state = self.read_state()?;

        if let Ok(id) = identifier.parse::<EventId>() {
            return Ok(state.events.iter().find(|e| e.id == id).cloned());
        }

        let mut candidates = state.events.iter().filter(|e| e.id.matches_prefix(identifier));
        match (candidates.next(), candidates.next()) {
            (Some(event), None) => Ok(Some(event.clone())),
            (None, _) => Ok(None),
            (Some(_), Some(_)) => Err(AuditError::Validation(format!(
                "Event id '{}' is ambiguous",
                identifier
            ))),
        }
    }

    /// Get the number of events in the store
    pub fn count(&self) -> AuditResult<usize> {
        Ok(self.read_state()?.events.len())
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    fn read_state(&self) -> AuditResult<RwLockReadGuard<'_, LogState>> {
        self.state.read().map_err(|e| {
            AuditError::StoreUnavailable(format!("Failed to acquire read lock: {}", e))
        })
    }

    fn write_state(&self) -> AuditResult<RwLockWriteGuard<'_, LogState>> {
        self.state
            .write()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire write lock: {}", e)))
    }
}

impl LogState {
    fn fresh() -> Self {
        Self {
            next_seq: 1,
            ..Self::default()
        }
    }
}

fn to_line<T: Serialize>(line: &T) -> AuditResult<String> {
    let mut json = serde_json::to_string(line)
        .map_err(|e| AuditError::Json(format!("Failed to serialize audit log line: {}", e)))?;
    json.push('\n');
    Ok(json)
}

/// Replace everything from `offset` on with `bytes`, then sync
fn write_at(file: &mut File, offset: u64, bytes: &[u8]) -> io::Result<()> {
    file.set_len(offset)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}

struct LogScan {
    sealed: Vec<AuditEvent>,
    sealed_len: u64,
    sealed_lines: usize,
    next_seq: u64,
    pending: Option<StagedBatch>,
}

/// Read the log from the end of what `known` already covers
fn scan_log(path: &Path, known: &LogState) -> AuditResult<LogScan> {
    let mut scan = LogScan {
        sealed: Vec::new(),
        sealed_len: known.sealed_len,
        sealed_lines: known.sealed_lines,
        next_seq: known.next_seq,
        pending: None,
    };

    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(scan),
        Err(e) => return Err(AuditError::Io(format!("Failed to open audit log: {}", e))),
    };
    let mut reader = BufReader::new(file);
    reader
        .seek(SeekFrom::Start(known.sealed_len))
        .map_err(|e| AuditError::Io(format!("Failed to seek audit log: {}", e)))?;

    let mut offset = known.sealed_len;
    let mut line_num = known.sealed_lines;
    let mut pending: Vec<AuditEvent> = Vec::new();
    let mut complete = true;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).map_err(|e| {
            AuditError::Io(format!("Failed to read audit log line {}: {}", line_num + 1, e))
        })?;
        if read == 0 {
            break;
        }
        line_num += 1;
        offset += read as u64;

        // Every line is written with its newline; one without was cut short
        if buf.last() != Some(&b'\n') {
            complete = false;
            break;
        }

        let text = std::str::from_utf8(&buf).map_err(|e| {
            AuditError::Json(format!("Invalid UTF-8 in audit log at line {}: {}", line_num, e))
        })?;
        if text.trim().is_empty() {
            if pending.is_empty() {
                scan.sealed_len = offset;
                scan.sealed_lines = line_num;
            }
            continue;
        }

        let line: LogLine = serde_json::from_str(text).map_err(|e| {
            AuditError::Json(format!(
                "Failed to parse audit event at line {}: {}",
                line_num, e
            ))
        })?;

        match line {
            LogLine::Event(event) => pending.push(*event),
            LogLine::Commit { commit } => {
                let through = pending.last().map(|e| e.seq);
                if commit.events != pending.len() || through != Some(commit.through_seq) {
                    return Err(AuditError::Json(format!(
                        "Commit marker at line {} does not match the {} event(s) before it",
                        line_num,
                        pending.len()
                    )));
                }
                scan.next_seq = scan.next_seq.max(commit.through_seq + 1);
                scan.sealed.append(&mut pending);
                scan.sealed_len = offset;
                scan.sealed_lines = line_num;
            }
        }
    }

    if offset > scan.sealed_len {
        scan.pending = Some(StagedBatch {
            events: pending,
            start: scan.sealed_len,
            end: offset,
            end_line: line_num,
            complete,
        });
    }

    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditAction, AuditDetails, Snapshot};
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (EventStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = EventStore::open(temp_dir.path().join("events.jsonl")).unwrap();
        (store, temp_dir)
    }

    fn captured(table: &str, target_id: &str) -> CapturedEvent {
        CapturedEvent {
            action: AuditAction::Created,
            target_table: table.into(),
            target_id: Some(target_id.into()),
            target_role: None,
            details: AuditDetails::Row(Snapshot::from_json(json!({"id": target_id})).unwrap()),
            actor_id: None,
            actor_role: None,
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, minute, 0).unwrap()
    }

    fn append(store: &EventStore, batch: Vec<CapturedEvent>, created_at: DateTime<Utc>) -> Vec<EventId> {
        let staged = store.write_batch(batch, created_at).unwrap();
        store.commit_batch(&staged).unwrap()
    }

    #[test]
    fn test_append_and_reopen() {
        let (store, temp) = create_test_store();
        let ids = append(&store, vec![captured("jobs", "J1"), captured("jobs", "J2")], at(0));
        assert_eq!(ids.len(), 2);

        let reopened = EventStore::open(temp.path().join("events.jsonl")).unwrap();
        assert_eq!(reopened.count().unwrap(), 2);

        let contents = std::fs::read_to_string(temp.path().join("events.jsonl")).unwrap();
        assert!(contents.ends_with("{\"commit\":{\"through_seq\":2,\"events\":2}}\n"));
    }

    #[test]
    fn test_sequence_continues_after_reopen() {
        let (store, temp) = create_test_store();
        append(&store, vec![captured("jobs", "J1")], at(0));

        let reopened = EventStore::open(temp.path().join("events.jsonl")).unwrap();
        append(&reopened, vec![captured("jobs", "J2")], at(1));

        let events = reopened.query(&EventFilter::new(), PageRequest::default()).unwrap();
        assert_eq!(events[0].seq, 2);
        assert_eq!(events[1].seq, 1);
    }

    #[test]
    fn test_query_newest_first_with_ties() {
        let (store, _temp) = create_test_store();
        append(&store, vec![captured("jobs", "J1"), captured("jobs", "J2")], at(5));
        append(&store, vec![captured("jobs", "J3")], at(1));

        let events = store.query(&EventFilter::new(), PageRequest::default()).unwrap();
        let targets: Vec<_> = events.iter().map(|e| e.target_id.clone().unwrap()).collect();
        assert_eq!(targets, vec!["J2", "J1", "J3"]);
    }

    #[test]
    fn test_query_filter_and_paging() {
        let (store, _temp) = create_test_store();
        for i in 0..7u32 {
            let table = if i % 2 == 0 { "jobs" } else { "profiles" };
            append(
                &store,
                vec![captured(table, &format!("R{}", i))],
                at(0) + Duration::seconds(i.into()),
            );
        }

        let jobs = EventFilter::new().table("jobs");
        let page1 = store.query(&jobs, PageRequest::new(1, 3)).unwrap();
        let page2 = store.query(&jobs, PageRequest::new(2, 3)).unwrap();
        assert_eq!(page1.len(), 3);
        assert_eq!(page2.len(), 1);
        assert_eq!(page1[0].target_id.as_deref(), Some("R6"));
        assert_eq!(page2[0].target_id.as_deref(), Some("R0"));
    }

    #[test]
    fn test_unsealed_batch_is_invisible_and_ignored_on_reopen() {
        let (store, temp) = create_test_store();
        append(&store, vec![captured("jobs", "J1")], at(0));

        let staged = store.write_batch(vec![captured("jobs", "J2")], at(1)).unwrap();
        assert_eq!(staged.events().len(), 1);

        // Readers keep working while the batch sits on disk unsealed
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.find(&staged.events()[0].id.to_string()).unwrap().is_none());

        let reopened = EventStore::open(temp.path().join("events.jsonl")).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);

        let pending = reopened.refresh().unwrap().unwrap();
        assert!(pending.is_complete());
        assert_eq!(pending.events()[0].target_id.as_deref(), Some("J2"));
    }

    #[test]
    fn test_discarded_batch_leaves_no_trace() {
        let (store, temp) = create_test_store();
        append(&store, vec![captured("jobs", "J1")], at(0));
        let len_before = std::fs::metadata(temp.path().join("events.jsonl")).unwrap().len();

        let staged = store.write_batch(vec![captured("jobs", "J2")], at(1)).unwrap();
        store.discard_batch(&staged).unwrap();

        assert_eq!(
            std::fs::metadata(temp.path().join("events.jsonl")).unwrap().len(),
            len_before
        );
        assert!(store.refresh().unwrap().is_none());

        append(&store, vec![captured("jobs", "J3")], at(2));
        let reopened = EventStore::open(temp.path().join("events.jsonl")).unwrap();
        let events = reopened.query(&EventFilter::new(), PageRequest::default()).unwrap();
        let targets: Vec<_> = events.iter().map(|e| e.target_id.clone().unwrap()).collect();
        assert_eq!(targets, vec!["J3", "J1"]);
        assert_eq!(events[0].seq, 2);
    }

    #[test]
    fn test_torn_last_line_is_pending_not_an_error() {
        let (store, temp) = create_test_store();
        append(&store, vec![captured("jobs", "J1")], at(0));

        let path = temp.path().join("events.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"id\":\"9f").unwrap();
        drop(file);

        let reopened = EventStore::open(path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);

        let pending = reopened.refresh().unwrap().unwrap();
        assert!(!pending.is_complete());
        assert!(pending.events().is_empty());
    }

    #[test]
    fn test_refresh_sees_batches_sealed_by_another_handle() {
        let (first, temp) = create_test_store();
        let second = EventStore::open(temp.path().join("events.jsonl")).unwrap();

        append(&first, vec![captured("jobs", "J1")], at(0));
        assert_eq!(second.count().unwrap(), 0);

        assert!(second.refresh().unwrap().is_none());
        assert_eq!(second.count().unwrap(), 1);

        append(&second, vec![captured("jobs", "J2")], at(1));
        let events = second.query(&EventFilter::new(), PageRequest::default()).unwrap();
        assert_eq!(events[0].seq, 2);
    }

    #[test]
    fn test_find_by_prefix() {
        let (store, _temp) = create_test_store();
        let ids = append(&store, vec![captured("jobs", "J1")], at(0));

        let found = store.find(&ids[0].to_string()).unwrap().unwrap();
        assert_eq!(found.id, ids[0]);
        assert!(store.find("evt-zzzzzzzz").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_line_reported_with_line_number() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");
        std::fs::write(&path, "\n{not json}\n").unwrap();

        match EventStore::open(path) {
            Err(AuditError::Json(msg)) => assert!(msg.contains("line 2")),
            other => panic!("expected JSON error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_marker_must_match_its_batch() {
        let (store, temp) = create_test_store();
        append(&store, vec![captured("jobs", "J1")], at(0));

        let path = temp.path().join("events.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"commit\":{\"through_seq\":5,\"events\":3}}\n").unwrap();
        drop(file);

        match EventStore::open(path) {
            Err(AuditError::Json(msg)) => assert!(msg.contains("line 3")),
            other => panic!("expected JSON error, got {:?}", other.map(|_| ())),
        }
    }
}
