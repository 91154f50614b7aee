//! Settings for the audit trail
//!
//! Holds the schema catalog (declared relationships), the capture policy,
//! the rendering allow-lists and the pagination defaults.

use serde::{Deserialize, Serialize};

use super::paths::AuditPaths;
use crate::error::AuditError;
use crate::models::page::{DEFAULT_LIMIT, MAX_LIMIT};

/// Table name the event log is exposed under in the schema catalog
pub const EVENTS_TABLE: &str = "audit_events";

/// A declared foreign-key relationship between two tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

impl Relationship {
    pub fn new(from_table: &str, from_column: &str, to_table: &str, to_column: &str) -> Self {
        Self {
            from_table: from_table.to_string(),
            from_column: from_column.to_string(),
            to_table: to_table.to_string(),
            to_column: to_column.to_string(),
        }
    }

    /// The relationship the joined query path needs
    pub fn actor_join(identity_table: &str) -> Self {
        Self::new(EVENTS_TABLE, "actor_id", identity_table, "id")
    }
}

impl std::fmt::Display for Relationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.from_table, self.from_column, self.to_table, self.to_column
        )
    }
}

/// Capture and rendering policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Tables whose mutations are captured; `*` captures every table
    #[serde(default = "default_audited_tables")]
    pub audited_tables: Vec<String>,

    /// Key suffixes that mark a field as an identity reference
    #[serde(default = "default_reference_suffixes")]
    pub reference_suffixes: Vec<String>,

    /// Additional field names that hold identity references
    #[serde(default)]
    pub reference_fields: Vec<String>,

    /// Fields shown for created/deleted rows
    #[serde(default = "default_display_fields")]
    pub display_fields: Vec<String>,

    /// Fields never shown in an update diff
    #[serde(default = "default_hidden_fields")]
    pub hidden_fields: Vec<String>,
}

impl AuditSettings {
    /// Check whether mutations on `table` should produce events
    pub fn is_audited(&self, table: &str) -> bool {
        self.audited_tables
            .iter()
            .any(|t| t == "*" || t.eq_ignore_ascii_case(table))
    }

    /// Check whether `key` names an identity reference
    pub fn is_reference_field(&self, key: &str) -> bool {
        self.reference_fields.iter().any(|f| f == key)
            || self
                .reference_suffixes
                .iter()
                .any(|suffix| key.len() > suffix.len() && key.ends_with(suffix.as_str()))
    }

    pub fn is_display_field(&self, key: &str) -> bool {
        self.display_fields.iter().any(|f| f == key)
    }

    pub fn is_hidden_field(&self, key: &str) -> bool {
        self.hidden_fields.iter().any(|f| f == key)
    }
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            audited_tables: default_audited_tables(),
            reference_suffixes: default_reference_suffixes(),
            reference_fields: Vec::new(),
            display_fields: default_display_fields(),
            hidden_fields: default_hidden_fields(),
        }
    }
}

/// Pagination defaults for the read endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationSettings {
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    /// Never exceeds the hard maximum, whatever the file says
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

impl PaginationSettings {
    pub fn effective_max_limit(&self) -> u32 {
        self.max_limit.clamp(1, MAX_LIMIT)
    }

    pub fn effective_default_limit(&self) -> u32 {
        self.default_limit.clamp(1, self.effective_max_limit())
    }
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

/// Settings for the audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Table acting as the identity directory
    #[serde(default = "default_identity_table")]
    pub identity_table: String,

    /// Declared relationships (the schema catalog)
    #[serde(default = "default_relationships")]
    pub relationships: Vec<Relationship>,

    #[serde(default)]
    pub audit: AuditSettings,

    #[serde(default)]
    pub pagination: PaginationSettings,
}

fn default_schema_version() -> u32 {
    1
}

fn default_identity_table() -> String {
    "profiles".to_string()
}

fn default_relationships() -> Vec<Relationship> {
    vec![Relationship::actor_join(&default_identity_table())]
}

fn default_audited_tables() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_reference_suffixes() -> Vec<String> {
    vec!["_by".to_string()]
}

fn default_display_fields() -> Vec<String> {
    ["title", "name", "full_name", "email", "status", "role", "company"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_hidden_fields() -> Vec<String> {
    vec!["updated_at".to_string()]
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

fn default_max_limit() -> u32 {
    MAX_LIMIT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            identity_table: default_identity_table(),
            relationships: default_relationships(),
            audit: AuditSettings::default(),
            pagination: PaginationSettings::default(),
        }
    }
}

impl Settings {
    /// Check whether the catalog declares the actor join
    pub fn has_actor_relationship(&self) -> bool {
        let wanted = Relationship::actor_join(&self.identity_table);
        self.relationships.iter().any(|r| *r == wanted)
    }

    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &AuditPaths) -> Result<Self, AuditError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| AuditError::Io(format!("Failed to read settings file: {}", e)))?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                AuditError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &AuditPaths) -> Result<(), AuditError> {
        paths.ensure_directories()?;

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| AuditError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(paths.settings_file(), contents)
            .map_err(|e| AuditError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.identity_table, "profiles");
        assert!(settings.has_actor_relationship());
        assert!(settings.audit.is_audited("jobs"));
        assert_eq!(settings.pagination.default_limit, 50);
        assert_eq!(settings.pagination.max_limit, 200);
    }

    #[test]
    fn test_reference_field_detection() {
        let mut audit = AuditSettings::default();
        assert!(audit.is_reference_field("approved_by"));
        assert!(audit.is_reference_field("reviewed_by"));
        assert!(!audit.is_reference_field("_by"));
        assert!(!audit.is_reference_field("status"));

        audit.reference_fields.push("owner_id".into());
        assert!(audit.is_reference_field("owner_id"));
    }

    #[test]
    fn test_audited_tables_allow_list() {
        let audit = AuditSettings {
            audited_tables: vec!["jobs".into()],
            ..AuditSettings::default()
        };
        assert!(audit.is_audited("jobs"));
        assert!(!audit.is_audited("sessions"));
    }

    #[test]
    fn test_pagination_clamped_to_hard_max() {
        let pagination = PaginationSettings {
            default_limit: 900,
            max_limit: 5000,
        };
        assert_eq!(pagination.effective_max_limit(), 200);
        assert_eq!(pagination.effective_default_limit(), 200);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = AuditPaths::with_base_dir(temp_dir.path().to_path_buf());

        let mut settings = Settings::default();
        settings.relationships.clear();
        settings.audit.hidden_fields.push("internal_notes".into());
        settings.save(&paths).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert!(!loaded.has_actor_relationship());
        assert!(loaded.audit.is_hidden_field("internal_notes"));
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"identity_table": "users"}"#).unwrap();
        assert_eq!(settings.identity_table, "users");
        // The default catalog points at profiles, so the users join is absent.
        assert!(!settings.has_actor_relationship());
        assert!(settings.audit.is_display_field("status"));
    }
}
