//! Read-side filter and pagination
//!
//! Page and limit inputs are coerced, never rejected: anything missing,
//! unparsable or non-positive falls back to the defaults, and the limit is
//! clamped to a hard maximum so a caller cannot request an unbounded page.

use serde::{Deserialize, Serialize};

use super::event::AuditEvent;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 200;

/// A coerced page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    /// Coerce raw caller input into a valid page request
    pub fn new(page: i64, limit: i64) -> Self {
        let page = if page <= 0 {
            DEFAULT_PAGE
        } else {
            u32::try_from(page).unwrap_or(u32::MAX)
        };

        let limit = if limit <= 0 {
            DEFAULT_LIMIT
        } else {
            u32::try_from(limit).unwrap_or(u32::MAX).min(MAX_LIMIT)
        };

        Self { page, limit }
    }

    /// Coerce raw query-string values
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Self {
        let parse = |raw: Option<&str>| {
            raw.and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(0)
        };
        Self::new(parse(page), parse(limit))
    }

    /// Apply a configured ceiling below the hard maximum
    pub fn with_max_limit(self, max_limit: u32) -> Self {
        Self {
            page: self.page,
            limit: self.limit.min(max_limit.clamp(1, MAX_LIMIT)),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of rows to skip
    pub fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.limit as usize)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Exact-match filter on event targets; all set fields must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub target_table: Option<String>,
    pub target_id: Option<String>,
    pub target_role: Option<String>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.target_table = Some(table.into());
        self
    }

    pub fn target_id(mut self, id: impl Into<String>) -> Self {
        self.target_id = Some(id.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.target_role = Some(role.into());
        self
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        fn field_matches(wanted: &Option<String>, actual: Option<&str>) -> bool {
            match wanted {
                Some(wanted) => actual == Some(wanted.as_str()),
                None => true,
            }
        }

        field_matches(&self.target_table, Some(event.target_table.as_str()))
            && field_matches(&self.target_id, event.target_id.as_deref())
            && field_matches(&self.target_role, event.target_role.as_deref())
    }
}
