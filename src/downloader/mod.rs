//! Hierarchical download engine.
//!
//! [`TreeDownloader`] is the public entry point. The work is split into:
//! - [`fetcher`] - single-file download with retry and atomic write
//! - [`walker`] - directory mirroring and chunked dispatch of file downloads

mod fetcher;
mod walker;

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::{CancellationToken, DropGuard};

use crate::client::ApiClient;
use crate::config::{Config, FailurePolicy};
use crate::deployment::{Deployment, latest_ready};
use crate::error::{Error, Result};
use crate::limiter::ConcurrencyLimiter;
use crate::retry::retry_with_backoff;
use crate::tree::RemoteNode;
use crate::types::MirrorReport;

use fetcher::LeafFetcher;
use walker::TreeWalker;

/// How many recent deployments [`TreeDownloader::latest_deployment`] inspects
pub const LATEST_SCAN_LIMIT: usize = 10;

/// Mirrors deployment trees onto local disk (cloneable - all fields are Arc-wrapped)
#[derive(Clone, Debug)]
pub struct TreeDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    config: Arc<Config>,
    /// HTTP access to the deployment API
    client: ApiClient,
    /// Parent token for every run; cancelling it stops all runs
    cancel_token: CancellationToken,
}

impl TreeDownloader {
    /// Create a downloader after validating `config`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = ApiClient::new(&config.api)?;
        Ok(Self {
            config: Arc::new(config),
            client,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Token that cancels every current and future run when triggered
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Stop issuing new downloads; running calls return [`Error::Cancelled`]
    pub fn cancel(&self) {
        tracing::info!("Cancellation requested");
        self.cancel_token.cancel();
    }

    /// Fetch one deployment's metadata, retrying transient failures
    pub async fn fetch_deployment(&self, deployment_id: &str) -> Result<Deployment> {
        let (run_cancel, _guard) = self.start_run();
        let resource = format!("deployments/{deployment_id}");
        retry_with_backoff(&self.config.retry, &run_cancel, resource, || {
            self.client.fetch_deployment(deployment_id)
        })
        .await
    }

    /// List up to `limit` recent deployments, retrying transient failures
    pub async fn list_deployments(&self, limit: usize) -> Result<Vec<Deployment>> {
        let (run_cancel, _guard) = self.start_run();
        self.list_deployments_with(limit, &run_cancel).await
    }

    /// Newest deployment that finished building
    ///
    /// Looks at the [`LATEST_SCAN_LIMIT`] most recent deployments and fails
    /// with [`Error::NoReadyDeployment`] if none of them is ready.
    pub async fn latest_deployment(&self) -> Result<Deployment> {
        let (run_cancel, _guard) = self.start_run();
        let deployments = self
            .list_deployments_with(LATEST_SCAN_LIMIT, &run_cancel)
            .await?;
        let scanned = deployments.len();
        let latest = latest_ready(deployments).ok_or(Error::NoReadyDeployment { scanned })?;
        tracing::info!(
            deployment_id = %latest.id,
            url = %latest.url,
            created_at = latest.created_at,
            "Resolved latest ready deployment"
        );
        Ok(latest)
    }

    /// Fetch the file tree of a deployment, retrying transient failures
    pub async fn fetch_tree(&self, deployment_id: &str) -> Result<Vec<RemoteNode>> {
        let (run_cancel, _guard) = self.start_run();
        self.fetch_tree_with(deployment_id, &run_cancel).await
    }

    /// Download `tree` into `dest`, creating `dest` if needed
    pub async fn download_tree(&self, tree: &[RemoteNode], dest: &Path) -> Result<MirrorReport> {
        let (run_cancel, _guard) = self.start_run();
        self.download_tree_with(tree, dest, &run_cancel).await
    }

    /// Fetch a deployment's tree and mirror it into `dest`
    ///
    /// The configured run timeout covers both steps.
    pub async fn mirror_deployment(
        &self,
        deployment_id: &str,
        dest: &Path,
    ) -> Result<MirrorReport> {
        let (run_cancel, _guard) = self.start_run();
        let tree = self.fetch_tree_with(deployment_id, &run_cancel).await?;
        self.download_tree_with(&tree, dest, &run_cancel).await
    }

    /// Child token for one run, cancelled by the deadline if one is configured
    ///
    /// The guard cancels the token when the run ends, which also retires the
    /// deadline task.
    fn start_run(&self) -> (CancellationToken, DropGuard) {
        let run_cancel = self.cancel_token.child_token();
        if let Some(timeout) = self.config.download.run_timeout {
            let token = run_cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        tracing::warn!(timeout_secs = timeout.as_secs(), "Run deadline reached, cancelling");
                        token.cancel();
                    }
                }
            });
        }
        (run_cancel.clone(), run_cancel.drop_guard())
    }

    async fn list_deployments_with(
        &self,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Deployment>> {
        retry_with_backoff(&self.config.retry, cancel, "deployments", || {
            self.client.list_deployments(limit)
        })
        .await
    }

    async fn fetch_tree_with(
        &self,
        deployment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<RemoteNode>> {
        let resource = format!("deployments/{deployment_id}/files");
        let tree = retry_with_backoff(&self.config.retry, cancel, resource, || {
            self.client.fetch_tree(deployment_id)
        })
        .await?;

        if tree.is_empty() {
            return Err(Error::EmptyTree {
                deployment_id: deployment_id.to_string(),
            });
        }
        Ok(tree)
    }

    async fn download_tree_with(
        &self,
        tree: &[RemoteNode],
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<MirrorReport> {
        let capacity = self.config.download.max_concurrent_downloads;
        let limiter = ConcurrencyLimiter::new(capacity);
        let fetcher = LeafFetcher::new(
            self.client.clone(),
            limiter.clone(),
            self.config.retry.clone(),
        );

        tracing::info!(
            dest = %dest.display(),
            files = tree.iter().map(RemoteNode::file_count).sum::<usize>(),
            max_concurrent = capacity,
            "Starting tree download"
        );

        let mut report = TreeWalker::new(&fetcher, cancel, capacity)
            .mirror(tree, dest)
            .await?;
        report.peak_in_flight = limiter.peak_in_flight();

        tracing::info!(
            downloaded = report.downloaded_count(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            bytes = report.total_bytes(),
            peak_in_flight = report.peak_in_flight,
            "Tree download finished"
        );
        for failed in &report.failed {
            tracing::error!(
                path = %failed.path.display(),
                attempts = failed.attempts,
                error = %failed.error,
                "File permanently failed"
            );
        }

        match self.config.download.failure_policy {
            FailurePolicy::FailRun if !report.failed.is_empty() => Err(Error::Incomplete {
                downloaded: report.downloaded_count(),
                failed: report.failed,
            }),
            _ => Ok(report),
        }
    }
}
