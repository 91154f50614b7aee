//! Table rows for JSON storage
//!
//! Each table lives in `data/<table>.json` as `{"rows": {row_id: {..}}}`.
//! Tables are cached in memory behind an `RwLock`; writes arrive only as
//! whole-transaction batches from [`Transaction::commit`](super::Transaction::commit).

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::paths::AuditPaths;
use crate::config::settings::EVENTS_TABLE;
use crate::error::{AuditError, AuditResult};
use crate::models::Snapshot;

use super::file_io::{read_json, write_json_atomic};

pub type Table = BTreeMap<String, Snapshot>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TableData {
    rows: Table,
}

/// Check that a name can be used as a table name and a file stem
pub fn validate_table_name(table: &str) -> AuditResult<()> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if !valid {
        return Err(AuditError::Validation(format!(
            "Invalid table name '{}': use lowercase letters, digits and '_'",
            table
        )));
    }
    if table == EVENTS_TABLE {
        return Err(AuditError::Validation(format!(
            "'{}' is reserved for the audit log",
            EVENTS_TABLE
        )));
    }
    Ok(())
}

/// Repository for all domain tables
pub struct RowRepository {
    paths: AuditPaths,
    tables: RwLock<HashMap<String, Table>>,
}

impl RowRepository {
    pub fn new(paths: AuditPaths) -> Self {
        Self {
            paths,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Load every table file in the data directory
    pub fn load(&self) -> AuditResult<()> {
        let mut loaded = HashMap::new();
        let data_dir = self.paths.data_dir();

        if data_dir.exists() {
            let entries = std::fs::read_dir(&data_dir)
                .map_err(|e| AuditError::Storage(format!("Failed to list data directory: {}", e)))?;

            for entry in entries {
                let path = entry
                    .map_err(|e| AuditError::Storage(format!("Failed to read entry: {}", e)))?
                    .path();

                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Some(table) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if validate_table_name(table).is_err() {
                    warn!(file = %path.display(), "Ignoring file that is not a table");
                    continue;
                }

                let data: TableData = read_json(&path)?;
                loaded.insert(table.to_string(), data.rows);
            }
        }

        let mut tables = self.tables.write().map_err(|e| {
            AuditError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        *tables = loaded;
        Ok(())
    }

    /// Get a committed row
    pub fn get(&self, table: &str, row_id: &str) -> AuditResult<Option<Snapshot>> {
        let tables = self.tables.read().map_err(|e| {
            AuditError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(tables.get(table).and_then(|rows| rows.get(row_id)).cloned())
    }

    /// Get many rows of one table under a single read lock
    pub fn get_many<'a, I>(&self, table: &str, row_ids: I) -> AuditResult<Vec<(String, Snapshot)>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let tables = self.tables.read().map_err(|e| {
            AuditError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;

        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };

        Ok(row_ids
            .into_iter()
            .filter_map(|id| rows.get(id).map(|row| (id.clone(), row.clone())))
            .collect())
    }

    /// All rows of a table, ordered by row id
    pub fn list(&self, table: &str) -> AuditResult<Vec<(String, Snapshot)>> {
        let tables = self.tables.read().map_err(|e| {
            AuditError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(tables
            .get(table)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    /// Names of all known tables
    pub fn table_names(&self) -> AuditResult<Vec<String>> {
        let tables = self.tables.read().map_err(|e| {
            AuditError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;

        let mut names: Vec<_> = tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Snapshot the current contents of the given tables
    pub(crate) fn snapshot_tables<'a, I>(&self, names: I) -> AuditResult<HashMap<String, Table>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let tables = self.tables.read().map_err(|e| {
            AuditError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(names
            .into_iter()
            .map(|name| (name.to_string(), tables.get(name).cloned().unwrap_or_default()))
            .collect())
    }

    /// Persist whole tables, then publish them to readers
    ///
    /// If any file write fails, files already rewritten in this call are
    /// restored from `previous` and the in-memory cache is left untouched.
    pub(crate) fn replace_tables(
        &self,
        updated: HashMap<String, Table>,
        previous: &HashMap<String, Table>,
    ) -> AuditResult<()> {
        let mut written: Vec<&str> = Vec::new();

        for (name, rows) in &updated {
            let data = TableData { rows: rows.clone() };
            if let Err(e) = write_json_atomic(self.paths.table_file(name), &data) {
                for restored in written {
                    let old = TableData {
                        rows: previous.get(restored).cloned().unwrap_or_default(),
                    };
                    if let Err(restore_err) =
                        write_json_atomic(self.paths.table_file(restored), &old)
                    {
                        warn!(table = restored, error = %restore_err, "Failed to restore table file");
                    }
                }
                return Err(e);
            }
            written.push(name.as_str());
        }

        let mut tables = self.tables.write().map_err(|e| {
            AuditError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        for (name, rows) in updated {
            tables.insert(name, rows);
        }
        Ok(())
    }
}
