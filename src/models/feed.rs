//! Read endpoint output
//!
//! Every event in a feed has an `actor` field, resolved or null, no matter
//! which query strategy produced it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::event::AuditEvent;
use super::identity::{ActorSummary, EnrichedReference};

/// An event with its acting user attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventWithActor {
    #[serde(flatten)]
    pub event: AuditEvent,
    pub actor: Option<ActorSummary>,
}

impl EventWithActor {
    pub fn new(event: AuditEvent, actor: Option<ActorSummary>) -> Self {
        Self { event, actor }
    }

    /// Label for the acting user as shown to an administrator
    pub fn actor_label(&self) -> String {
        match (&self.actor, &self.event.actor_id) {
            (Some(actor), _) => actor
                .full_name
                .clone()
                .or_else(|| actor.email.clone())
                .unwrap_or_else(|| actor.id.clone()),
            (None, Some(id)) => id.clone(),
            (None, None) => "system".to_string(),
        }
    }
}

/// One page of history plus the resolved references found in it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFeed {
    pub events: Vec<EventWithActor>,
    /// Raw referenced id -> display summary; unresolved ids are absent
    pub enriched: BTreeMap<String, EnrichedReference>,
}
