//! Error types for the audit trail engine
//!
//! The first four variants form the audit taxonomy. Only `StoreUnavailable`
//! is ever surfaced to a reader; the others are absorbed by the component
//! that encounters them and degrade the result instead.

use thiserror::Error;

/// The main error type for audit trail operations
#[derive(Error, Debug)]
pub enum AuditError {
    /// The store is unreachable or failed mid-query
    #[error("Audit store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store has no declared relationship for an embedded join
    #[error("Schema relationship missing: {relationship}")]
    SchemaRelationshipMissing { relationship: String },

    /// A reference-shaped id in a snapshot has no matching identity
    #[error("Reference unresolved: {id}")]
    ReferenceUnresolved { id: String },

    /// The actor context could not be bound to the unit of work
    #[error("Actor binding failed: {0}")]
    ActorBindingFailed(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Validation errors for input values
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AuditError {
    /// Create a "not found" error for table rows
    pub fn row_not_found(table: &str, row_id: &str) -> Self {
        Self::NotFound {
            entity_type: "Row",
            identifier: format!("{}/{}", table, row_id),
        }
    }

    /// Create a "not found" error for audit events
    pub fn event_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Audit event",
            identifier: identifier.into(),
        }
    }

    /// Check if this is the expected "relationship missing" join failure
    pub fn is_relationship_missing(&self) -> bool {
        matches!(self, Self::SchemaRelationshipMissing { .. })
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Collapse any failure into the single reader-facing taxonomy value
    pub fn into_store_unavailable(self) -> Self {
        match self {
            Self::StoreUnavailable(_) => self,
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for audit trail operations
pub type AuditResult<T> = Result<T, AuditError>;
