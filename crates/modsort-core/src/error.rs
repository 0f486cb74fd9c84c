//! Error types for modsort.
//!
//! Per-file failures (`Io`, `NotFound`, `Transient`) are recorded in the run
//! report and never stop a batch. `Auth` and the cache-log failures abort the
//! whole run.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the modsort library.
#[derive(Debug, Error)]
pub enum SortError {
    // Remote lookup errors
    #[error("No remote record for {name}")]
    NotFound { name: String },

    #[error("Transient remote failure: {message}")]
    Transient {
        message: String,
        /// HTTP status, when the failure came from a response
        status: Option<u16>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by remote service, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Credentials rejected by remote service (HTTP {status})")]
    Auth { status: u16 },

    // Cache log errors
    #[error("Cache log {0} is in use by another run")]
    CacheLocked(PathBuf),

    #[error("Cache log error at {path}: {message}")]
    CacheLog {
        message: String,
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for modsort operations.
pub type Result<T> = std::result::Result<T, SortError>;

impl From<std::io::Error> for SortError {
    fn from(err: std::io::Error) -> Self {
        SortError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SortError {
    fn from(err: serde_json::Error) -> Self {
        SortError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl SortError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SortError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a cache-log error for `path`.
    pub fn cache_log(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SortError::CacheLog {
            message: err.to_string(),
            path: path.into(),
            source: Some(err),
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SortError::Transient { .. } | SortError::Timeout(_) | SortError::RateLimited { .. }
        )
    }

    /// Check if this error aborts the whole run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SortError::Auth { .. } | SortError::CacheLocked(_) | SortError::CacheLog { .. }
        )
    }
}
