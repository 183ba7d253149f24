//! Error types for deploy-mirror
//!
//! One error enum covers the whole engine. HTTP status signalling from the
//! deployment API is mapped onto dedicated variants so the retry policy can
//! classify failures without inspecting message text.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::FailedFile;

/// Result type alias for deploy-mirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for deploy-mirror
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_attempts")
        key: Option<String>,
    },

    /// The API rejected our credentials (HTTP 401). Never retried.
    #[error("authentication failed: {message}")]
    Authentication {
        /// Message returned by the API, or a generic description
        message: String,
    },

    /// The API is throttling us (HTTP 429)
    #[error("rate limited by server (HTTP {status})")]
    RateLimited {
        /// Status code returned by the server
        status: u16,
    },

    /// The API reported storage/resource exhaustion (HTTP 507)
    #[error("server resources exhausted (HTTP 507)")]
    ResourceExhausted,

    /// Any other non-success HTTP status
    #[error("server error: HTTP {status}")]
    Server {
        /// Status code returned by the server
        status: u16,
    },

    /// Transport-level failure (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A response body could not be decoded into file content
    #[error("decode error: {0}")]
    Decode(String),

    /// A single file could not be downloaded after exhausting its attempts
    #[error("failed to download {} after {attempts} attempt(s): {source}", path.display())]
    DownloadFailed {
        /// Path of the file relative to the mirror root
        path: PathBuf,
        /// Number of attempts made before giving up
        attempts: u32,
        /// The last failure observed
        #[source]
        source: Box<Error>,
    },

    /// The API returned a tree with no nodes at all
    #[error("no files found for deployment {deployment_id}")]
    EmptyTree {
        /// Deployment whose tree was empty
        deployment_id: String,
    },

    /// None of the listed deployments has finished building
    #[error("no ready deployment among the {scanned} most recent")]
    NoReadyDeployment {
        /// Number of deployments inspected
        scanned: usize,
    },

    /// The run was cancelled or hit its deadline
    #[error("operation cancelled")]
    Cancelled,

    /// The walk finished but some files failed permanently
    #[error("mirror incomplete: {} file(s) failed, {downloaded} downloaded", failed.len())]
    Incomplete {
        /// Files that failed after exhausting their attempts
        failed: Vec<FailedFile>,
        /// Number of files written successfully
        downloaded: usize,
    },
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Map a non-success HTTP status onto the matching variant
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            401 => Error::Authentication {
                message: "API rejected the access token".to_string(),
            },
            429 => Error::RateLimited { status: 429 },
            507 => Error::ResourceExhausted,
            code => Error::Server { status: code },
        }
    }
}
