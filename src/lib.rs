//! # deploy-mirror
//!
//! Mirror a remote deployment's file tree onto local disk.
//!
//! The deployment API describes files as a nested tree; every file's bytes
//! live behind an authenticated endpoint addressed by an opaque handle.
//! deploy-mirror walks that tree, recreates the directory structure, and
//! downloads every file:
//! - **Bounded** - at most `max_concurrent_downloads` requests in flight (default 2)
//! - **Retrying** - exponential backoff for throttling and server errors, harder
//!   backoff for storage exhaustion, no retry at all for rejected credentials
//! - **Contained failures** - one file failing does not stop its siblings; the
//!   [`MirrorReport`] lists what was written, what failed and what was skipped
//! - **Cancellable** - via [`TreeDownloader::cancel`] or a configured run deadline
//!
//! ## Quick Start
//!
//! ```no_run
//! use deploy_mirror::{Config, TreeDownloader};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = TreeDownloader::new(Config::with_token("my-api-token"))?;
//!
//!     let report = downloader
//!         .mirror_deployment("dpl_123", Path::new("./mirror"))
//!         .await?;
//!
//!     println!(
//!         "{} files downloaded, {} failed, {} skipped",
//!         report.downloaded_count(),
//!         report.failed.len(),
//!         report.skipped.len()
//!     );
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Deployment API client
pub mod client;
/// Configuration types
pub mod config;
/// Deployment metadata
pub mod deployment;
/// Tree download engine
pub mod downloader;
/// Error types
pub mod error;
/// Concurrency limiting
pub mod limiter;
/// Retry logic with exponential backoff
pub mod retry;
/// Remote tree model
pub mod tree;
/// Core types and reports
pub mod types;

// Re-export commonly used types
pub use config::{ApiConfig, Config, DownloadConfig, FailurePolicy, RetryConfig};
pub use deployment::{Deployment, DeploymentState};
pub use downloader::TreeDownloader;
pub use error::{Error, Result};
pub use tree::{NodeKind, RemoteNode};
pub use types::{DownloadedFile, FailedFile, MirrorReport, SkipReason, SkippedNode};
