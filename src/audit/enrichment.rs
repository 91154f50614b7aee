//! Reference enrichment
//!
//! Finds identity references inside event snapshots (an `approved_by` id in
//! an update, say) and resolves them in one batched directory lookup. The raw
//! ids stay in the snapshots; the resolved summaries are returned alongside,
//! keyed by id, for the renderer to substitute.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::config::AuditSettings;
use crate::error::AuditError;
use crate::models::{AuditEvent, EnrichedReference};
use crate::repository::IdentityDirectory;

/// Distinct reference ids found in the snapshots of `events`
///
/// Only top-level keys are considered, and only non-empty string values.
pub fn collect_reference_ids<'a, I>(events: I, policy: &AuditSettings) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a AuditEvent>,
{
    let mut ids = BTreeSet::new();
    for event in events {
        for snapshot in event.details.snapshots() {
            for (key, value) in snapshot.iter() {
                if !policy.is_reference_field(key) {
                    continue;
                }
                if let Some(id) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) {
                    ids.insert(id.to_string());
                }
            }
        }
    }
    ids
}

/// Resolve every reference in a page of events
///
/// Never fails: ids that no longer resolve are left out, and a failed lookup
/// yields an empty map so the page is still served with raw ids.
pub fn enrich<'a, I, D>(
    events: I,
    directory: &D,
    policy: &AuditSettings,
) -> BTreeMap<String, EnrichedReference>
where
    I: IntoIterator<Item = &'a AuditEvent>,
    D: IdentityDirectory + ?Sized,
{
    let ids = collect_reference_ids(events, policy);
    if ids.is_empty() {
        return BTreeMap::new();
    }

    let identities = match directory.lookup(&ids) {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %e, references = ids.len(), "Reference enrichment skipped");
            return BTreeMap::new();
        }
    };

    let mut enriched = BTreeMap::new();
    for id in ids {
        match identities.get(&id) {
            Some(identity) => {
                enriched.insert(id, EnrichedReference::from(identity));
            }
            None => {
                let unresolved = AuditError::ReferenceUnresolved { id };
                debug!(reason = %unresolved, "Leaving reference un-enriched");
            }
        }
    }
    enriched
}
