//! Display formatting for terminal output
//!
//! Provides utilities for formatting audit history and stored rows for
//! terminal display.

pub mod history;

pub use history::{format_event_details, format_event_feed, format_row};
