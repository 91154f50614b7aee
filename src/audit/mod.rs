//! Audit trail engine
//!
//! Records who changed what and renders the trail for administrators.
//!
//! # Architecture
//!
//! Writes flow through capture, reads through query, enrichment and render:
//!
//! - `context`: the actor bound to a transaction, or a request to skip capture.
//! - `capture`: turns one staged row mutation into at most one event.
//! - `query`: serves a page of events with the acting user attached, using
//!   the store's join when declared and a batched lookup otherwise.
//! - `enrichment`: resolves identity references found inside snapshots.
//! - `diff` / `render`: reduce update images to changed fields and pick the
//!   displayable fields of created and deleted rows.
//!
//! # Example
//!
//! ```rust,ignore
//! use audit_trail::models::{EventFilter, PageRequest};
//!
//! let mut tx = db.begin()?;
//! tx.bind_actor("U1", Some("admin"), false)?;
//! tx.update("jobs", "J1", &patch)?;
//! tx.commit()?;
//!
//! let feed = db.history().list_events(&EventFilter::new().table("jobs"), PageRequest::default())?;
//! ```

pub mod capture;
pub mod context;
pub mod diff;
pub mod enrichment;
pub mod query;
pub mod render;

pub use capture::{capture, RowMutation};
pub use context::ActorContext;
pub use diff::{changed_keys, format_value, generate_diff};
pub use enrichment::{collect_reference_ids, enrich};
pub use query::{AuditQueryService, QueryStrategy};
pub use render::{
    display_value, group_by_action, render_change, render_details, render_row, DisplayValue,
    FieldChange, RenderedChange, RenderedDetails, RenderedField,
};
