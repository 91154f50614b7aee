//! Configuration module for the audit trail
//!
//! - Path resolution for the settings file, table files and event log
//! - Settings persistence (schema catalog, capture and rendering policy)

pub mod paths;
pub mod settings;

pub use paths::AuditPaths;
pub use settings::{AuditSettings, PaginationSettings, Relationship, Settings};
