//! Audit query service
//!
//! Serves one page of history with the acting user attached to every event.
//! Two strategies produce the same result shape:
//!
//! - **joined**: the store joins the identity table itself;
//! - **fallback**: plain query, then one batched identity lookup for the
//!   distinct actor ids of the page, stitched in memory.
//!
//! The fallback runs only when the store reports the join relationship as
//! missing. Any other failure is surfaced as `StoreUnavailable`.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{AuditError, AuditResult};
use crate::models::{ActorSummary, EventFeed, EventFilter, EventWithActor, PageRequest};
use crate::repository::{AuditEventSource, IdentityDirectory};

use super::enrichment::enrich;

/// Which strategy served a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStrategy {
    Joined,
    Fallback,
}

impl std::fmt::Display for QueryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryStrategy::Joined => write!(f, "joined"),
            QueryStrategy::Fallback => write!(f, "fallback"),
        }
    }
}

/// Read service over an event source and an identity directory
pub struct AuditQueryService<'a, S: ?Sized, D: ?Sized> {
    source: &'a S,
    directory: &'a D,
    settings: &'a Settings,
}

impl<'a, S, D> AuditQueryService<'a, S, D>
where
    S: AuditEventSource + ?Sized,
    D: IdentityDirectory + ?Sized,
{
    pub fn new(source: &'a S, directory: &'a D, settings: &'a Settings) -> Self {
        Self {
            source,
            directory,
            settings,
        }
    }

    /// One page of history with actors attached and references enriched
    pub fn list_events(&self, filter: &EventFilter, page: PageRequest) -> AuditResult<EventFeed> {
        let page = page.with_max_limit(self.settings.pagination.effective_max_limit());
        let (events, strategy) = self.list_with_actors(filter, page)?;

        let enriched = enrich(
            events.iter().map(|e| &e.event),
            self.directory,
            &self.settings.audit,
        );

        info!(
            strategy = %strategy,
            page = page.page(),
            limit = page.limit(),
            events = events.len(),
            references = enriched.len(),
            "Listed audit events"
        );

        Ok(EventFeed { events, enriched })
    }

    /// Actor-attached events, choosing the strategy by the joined result
    pub fn list_with_actors(
        &self,
        filter: &EventFilter,
        page: PageRequest,
    ) -> AuditResult<(Vec<EventWithActor>, QueryStrategy)> {
        match self.source.query_joined(filter, page) {
            Ok(events) => Ok((events, QueryStrategy::Joined)),
            Err(e) if e.is_relationship_missing() => {
                debug!(reason = %e, "Joined query unavailable, stitching actors");
                let events = self.list_fallback(filter, page)?;
                Ok((events, QueryStrategy::Fallback))
            }
            Err(e) => Err(e.into_store_unavailable()),
        }
    }

    /// Joined strategy only
    pub fn list_joined(
        &self,
        filter: &EventFilter,
        page: PageRequest,
    ) -> AuditResult<Vec<EventWithActor>> {
        self.source
            .query_joined(filter, page)
            .map_err(AuditError::into_store_unavailable)
    }

    /// Fallback strategy only: plain query plus one batched actor lookup
    pub fn list_fallback(
        &self,
        filter: &EventFilter,
        page: PageRequest,
    ) -> AuditResult<Vec<EventWithActor>> {
        let events = self
            .source
            .query(filter, page)
            .map_err(AuditError::into_store_unavailable)?;

        let actor_ids: BTreeSet<String> =
            events.iter().filter_map(|e| e.actor_id.clone()).collect();

        let actors = if actor_ids.is_empty() {
            Default::default()
        } else {
            self.directory
                .lookup(&actor_ids)
                .map_err(AuditError::into_store_unavailable)?
        };

        debug!(
            events = events.len(),
            actors = actor_ids.len(),
            resolved = actors.len(),
            "Stitched actors"
        );

        Ok(events
            .into_iter()
            .map(|event| {
                let actor = event
                    .actor_id
                    .as_ref()
                    .and_then(|id| actors.get(id))
                    .map(ActorSummary::from);
                EventWithActor::new(event, actor)
            })
            .collect())
    }
}
