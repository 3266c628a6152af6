//! Hooks for reporting recoverable events during a copy.
//!
//! Conversions never abort a copy. Substituted values and file lifecycle
//! events are forwarded to a [`CopyObserver`] so callers can count or log
//! them without the conversion code knowing about either.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::ConversionError;

pub trait CopyObserver: Send + Sync {
    /// A value in `column` could not be represented and was written as null.
    fn null_substituted(&self, column: &str, error: &ConversionError) {
        let _ = (column, error);
    }

    fn file_opened(&self, path: &Path) {
        let _ = path;
    }

    fn file_closed(&self, path: &Path, rows: u64, bytes: u64) {
        let _ = (path, rows, bytes);
    }
}

/// Default observer: everything goes to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CopyObserver for TracingObserver {
    fn null_substituted(&self, column: &str, error: &ConversionError) {
        warn!(column, error = %error, "Substituted null for unconvertible value");
    }

    fn file_opened(&self, path: &Path) {
        debug!(path = %path.display(), "Opened parquet file");
    }

    fn file_closed(&self, path: &Path, rows: u64, bytes: u64) {
        info!(path = %path.display(), rows, bytes, "Closed parquet file");
    }
}
