//! Cross-process writer lock
//!
//! The in-process `Mutex` on [`Database`](super::Database) only orders
//! transactions of one handle. Every handle on the same data directory also
//! takes an exclusive OS lock on `audit/write.lock` for the lifetime of a
//! transaction, so sequence numbers and table rewrites never interleave
//! between processes.

use std::fs::{File, OpenOptions};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{AuditError, AuditResult};

/// Held for the duration of one transaction; released on drop
#[derive(Debug)]
pub(crate) struct WriteLock {
    file: File,
}

impl WriteLock {
    /// Block until the exclusive lock on `path` is ours
    pub(crate) fn acquire(path: &Path) -> AuditResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| AuditError::Io(format!("Failed to open write lock: {}", e)))?;

        file.lock()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        debug!(path = %path.display(), "Acquired write lock");
        Ok(Self { file })
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock as well
        if let Err(e) = self.file.unlock() {
            warn!(error = %e, "Failed to release write lock");
        }
    }
}
