//! Leaf fetcher: download one file and persist it.
//!
//! A fetch holds one limiter slot for its whole attempt sequence, backoff
//! included. Content goes to a uniquely named hidden temp file in the same
//! directory and is renamed into place, so observers see either the full
//! payload or nothing.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::client::ApiClient;
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::limiter::ConcurrencyLimiter;
use crate::retry::retry_with_backoff;
use crate::types::DownloadTask;

const TEMP_PREFIX: &str = ".deploy-mirror-";
const TEMP_SUFFIX: &str = ".part";

/// Permission bits for files the API reports no mode for
const DEFAULT_FILE_MODE: u32 = 0o644;

/// Downloads single files through the shared limiter
#[derive(Clone, Debug)]
pub(crate) struct LeafFetcher {
    client: ApiClient,
    limiter: ConcurrencyLimiter,
    retry: RetryConfig,
}

impl LeafFetcher {
    pub(crate) fn new(client: ApiClient, limiter: ConcurrencyLimiter, retry: RetryConfig) -> Self {
        Self {
            client,
            limiter,
            retry,
        }
    }

    /// Fetch `task` and write it to its destination, returning the byte count
    ///
    /// The parent directory of the destination must already exist.
    pub(crate) async fn fetch(&self, task: &DownloadTask, cancel: &CancellationToken) -> Result<u64> {
        let _permit = self.limiter.acquire(cancel).await?;

        retry_with_backoff(&self.retry, cancel, task.relative_path.clone(), || {
            self.attempt(task)
        })
        .await
    }

    async fn attempt(&self, task: &DownloadTask) -> Result<u64> {
        let content = self.client.fetch_file(&task.remote_id).await?;
        write_atomic(&task.destination, &content, task.mode).await?;
        Ok(content.len() as u64)
    }
}

/// Write `content` to `destination`, replacing any existing file
///
/// The temp file gets a random name next to the destination, so it never
/// clashes with a sibling from the tree. Dropping the future before the
/// rename removes it.
async fn write_atomic(destination: &Path, content: &[u8], mode: Option<u32>) -> Result<()> {
    let parent = destination.parent().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("destination has no parent: {}", destination.display()),
        ))
    })?;
    let temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(parent)?;

    tokio::fs::write(temp.path(), content).await?;
    apply_mode(temp.path(), mode).await?;
    temp.persist(destination).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(unix)]
async fn apply_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    // Only the permission bits; the API reports full st_mode values.
    // Temp files start out as 0600, so a missing mode still gets set.
    let bits = match mode.map(|m| m & 0o777) {
        Some(bits) if bits != 0 => bits,
        _ => DEFAULT_FILE_MODE,
    };
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(bits)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn apply_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}
