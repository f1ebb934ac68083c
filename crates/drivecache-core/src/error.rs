//! Error types for drivecache.
//!
//! Configuration problems are reported at construction time, before any network
//! call. Remote and transport failures are surfaced verbatim to the caller; nothing
//! in this crate retries.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for drivecache.
#[derive(Debug, Error)]
pub enum DriveCacheError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Remote API errors
    #[error("Remote API error during {operation}: HTTP {status}: {body}")]
    RemoteApi {
        operation: String,
        status: u16,
        /// Raw error body returned by the remote store.
        body: String,
    },

    // Transport errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout: {message}")]
    Timeout { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Invalid argument {field}: {message}")]
    Validation { field: String, message: String },
}

/// Result type alias for drivecache operations.
pub type Result<T> = std::result::Result<T, DriveCacheError>;

impl From<std::io::Error> for DriveCacheError {
    fn from(err: std::io::Error) -> Self {
        DriveCacheError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for DriveCacheError {
    fn from(err: serde_json::Error) -> Self {
        DriveCacheError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for DriveCacheError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DriveCacheError::Timeout {
                message: err.to_string(),
            }
        } else {
            DriveCacheError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl DriveCacheError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        DriveCacheError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        DriveCacheError::Config {
            message: message.into(),
        }
    }

    /// Network-level failure (connection, DNS, timeout).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DriveCacheError::Network { .. } | DriveCacheError::Timeout { .. }
        )
    }

    /// The remote store answered with a non-success status.
    pub fn is_remote(&self) -> bool {
        matches!(self, DriveCacheError::RemoteApi { .. })
    }

    /// HTTP status carried by a remote error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            DriveCacheError::RemoteApi { status, .. } => Some(*status),
            _ => None,
        }
    }
}
