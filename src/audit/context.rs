//! Actor session context
//!
//! The "who is performing this write" binding. A context is a plain value
//! owned by one [`Transaction`](crate::storage::Transaction); it is read by
//! change capture at the moment each row mutation is staged and dropped with
//! the transaction. Nothing here is shared between units of work.

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};

/// Actor bound to a unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: Option<String>,
    pub actor_role: Option<String>,
    /// Suppress capture entirely (system and bootstrap writes)
    pub skip: bool,
}

impl ActorContext {
    /// Validate and build a binding
    ///
    /// A blank actor id is only acceptable when capture is skipped.
    pub fn new(actor_id: &str, actor_role: Option<&str>, skip: bool) -> AuditResult<Self> {
        let actor_id = actor_id.trim();
        if actor_id.is_empty() && !skip {
            return Err(AuditError::ActorBindingFailed(
                "actor id cannot be empty".into(),
            ));
        }

        let actor_role = actor_role
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        Ok(Self {
            actor_id: (!actor_id.is_empty()).then(|| actor_id.to_string()),
            actor_role,
            skip,
        })
    }

    /// A binding that suppresses capture for bootstrap writes
    pub fn system_skip() -> Self {
        Self {
            actor_id: None,
            actor_role: None,
            skip: true,
        }
    }
}
