//! Identity directory views
//!
//! [`Identity`] is a row of the identity table. [`ActorSummary`] is what the
//! query service attaches to each event; [`EnrichedReference`] is what the
//! enrichment pass substitutes for a raw id found inside a snapshot.

use serde::{Deserialize, Serialize};

use super::snapshot::Snapshot;

/// A user known to the identity directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl Identity {
    /// Read an identity out of a directory row
    pub fn from_row(id: &str, row: &Snapshot) -> Self {
        Self {
            id: id.to_string(),
            full_name: row.get_str("full_name").map(str::to_string),
            email: row.get_str("email").map(str::to_string),
            role: row.get_str("role").map(str::to_string),
        }
    }

    /// Best available human label: name, then email, then the raw id
    pub fn display_name(&self) -> String {
        self.full_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.email.as_deref().filter(|s| !s.trim().is_empty()))
            .unwrap_or(&self.id)
            .to_string()
    }
}

/// Inline actor attached to an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorSummary {
    pub id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

impl From<&Identity> for ActorSummary {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            full_name: identity.full_name.clone(),
            email: identity.email.clone(),
        }
    }
}

/// Display-ready substitute for a raw identity reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedReference {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
}

impl From<&Identity> for EnrichedReference {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            display_name: identity.display_name(),
            email: identity.email.clone(),
        }
    }
}
