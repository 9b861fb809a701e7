//! Error types for the monitor service.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from monitor operations.
///
/// Nothing here is fatal to the hosting process: watch failures are
/// logged and the path skipped, queue overflow degrades to a coarse
/// refresh, and subscriber panics are isolated at dispatch.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("failed to initialize native watcher: {reason}")]
    Init { reason: String },

    #[error("cannot watch {path}: {source}")]
    WatchFailed {
        path: PathBuf,
        source: notify::Error,
    },
}

impl From<notify::Error> for MonitorError {
    fn from(e: notify::Error) -> Self {
        MonitorError::Init {
            reason: e.to_string(),
        }
    }
}

/// Result type for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;
