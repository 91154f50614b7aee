//! Store-facing traits used by the read path
//!
//! The query service only sees these two traits, so the joined and fallback
//! strategies can be exercised against any store. [`crate::storage::Database`]
//! is the file-backed implementation.

use std::collections::{BTreeSet, HashMap};

use crate::error::AuditResult;
use crate::models::{AuditEvent, EventFilter, EventWithActor, Identity, PageRequest};

/// Ordered, filtered access to the audit event log
pub trait AuditEventSource: Send + Sync {
    /// Events matching `filter`, newest first, one page at a time
    fn query(&self, filter: &EventFilter, page: PageRequest) -> AuditResult<Vec<AuditEvent>>;

    /// Same as [`query`](Self::query) with the actor's identity joined in
    ///
    /// Fails with `SchemaRelationshipMissing` when the store does not declare
    /// the relationship from `actor_id` to the identity table.
    fn query_joined(
        &self,
        filter: &EventFilter,
        page: PageRequest,
    ) -> AuditResult<Vec<EventWithActor>>;
}

/// Batched access to the identity directory
pub trait IdentityDirectory: Send + Sync {
    /// Resolve every id in `ids` with a single round-trip
    ///
    /// Ids without a matching identity are simply absent from the result.
    fn lookup(&self, ids: &BTreeSet<String>) -> AuditResult<HashMap<String, Identity>>;
}
