//! Core types for deploy-mirror

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One file scheduled for download
///
/// Built by the tree walker and consumed by the leaf fetcher; it does not
/// outlive its own attempt sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadTask {
    /// Opaque handle addressing the file's bytes at the download endpoint
    pub remote_id: String,
    /// Absolute destination on local storage
    pub destination: PathBuf,
    /// Path relative to the mirror root, used in logs and reports
    pub relative_path: PathBuf,
    /// Unix mode reported by the API, if any
    pub mode: Option<u32>,
}

/// A file written successfully
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedFile {
    /// Path relative to the mirror root
    pub path: PathBuf,
    /// Number of bytes written
    pub bytes: u64,
}

/// A file that failed after exhausting its retry attempts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    /// Path relative to the mirror root
    pub path: PathBuf,
    /// Attempts made before giving up
    pub attempts: u32,
    /// Display form of the last error
    pub error: String,
}

/// Why a node was not mirrored
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Node kind the engine does not fetch (serverless function output, unknown kinds)
    Unsupported {
        /// Kind string reported by the API
        kind: String,
    },
    /// Name is not a single safe path segment
    UnsafeName,
    /// Lies below a directory skipped for its unsafe name
    UnsafeAncestor,
}

/// A node left out of the mirror
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedNode {
    /// Path relative to the mirror root (as the API named it)
    pub path: PathBuf,
    /// Why it was skipped
    pub reason: SkipReason,
}

/// Outcome of mirroring one tree
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorReport {
    /// Directories created (or already present), relative to the mirror root
    pub directories: Vec<PathBuf>,
    /// Files written successfully
    pub downloaded: Vec<DownloadedFile>,
    /// Files that failed permanently
    pub failed: Vec<FailedFile>,
    /// Nodes skipped without any request
    pub skipped: Vec<SkippedNode>,
    /// Most downloads that were ever in flight at once during the run
    pub peak_in_flight: usize,
}

impl MirrorReport {
    /// Number of files written
    pub fn downloaded_count(&self) -> usize {
        self.downloaded.len()
    }

    /// Total bytes written across all files
    pub fn total_bytes(&self) -> u64 {
        self.downloaded.iter().map(|f| f.bytes).sum()
    }

    /// True when no file failed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
