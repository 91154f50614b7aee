//! audit-trail - change-history engine
//!
//! Records who changed what on which row, and renders a reconstructable
//! before/after trail for administrators.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `models`: Events, snapshots, identities and paging types
//! - `repository`: Traits the read path queries through
//! - `storage`: JSON file storage, the event log and write transactions
//! - `audit`: Actor context, change capture, query, enrichment and diffs
//! - `display`: Terminal formatting
//! - `cli`: Command handlers
//!
//! # Example
//!
//! ```rust,ignore
//! use audit_trail::config::{paths::AuditPaths, settings::Settings};
//! use audit_trail::storage::Database;
//!
//! let paths = AuditPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let db = Database::open(paths, settings)?;
//! ```

pub mod audit;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod models;
pub mod repository;
pub mod storage;

pub use error::{AuditError, AuditResult};
