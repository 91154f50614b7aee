//! Core data models for the audit trail
//!
//! Events, snapshots, identity views and read-side paging types.

pub mod event;
pub mod feed;
pub mod identity;
pub mod ids;
pub mod page;
pub mod snapshot;

pub use event::{AuditAction, AuditDetails, AuditEvent, CapturedEvent, ChangeSet};
pub use feed::{EventFeed, EventWithActor};
pub use identity::{ActorSummary, EnrichedReference, Identity};
pub use ids::EventId;
pub use page::{EventFilter, PageRequest, DEFAULT_LIMIT, DEFAULT_PAGE, MAX_LIMIT};
pub use snapshot::{Snapshot, SnapshotValue};
