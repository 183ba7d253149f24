//! Tree walker: mirror directories, then dispatch files in chunks.
//!
//! The walk runs in two phases:
//! 1. A depth-first pass over the tree creates every local directory and
//!    collects all `File` nodes into one flat task list. Directories therefore
//!    always exist before anything is written beneath them.
//! 2. The task list is cut into chunks of the limiter's capacity. Each chunk
//!    is dispatched concurrently and awaited as a whole before the next one
//!    starts, which bounds how many download futures exist at once.
//!
//! A file that fails after its retries is recorded and the walk continues.
//! An authentication failure cancels the run token immediately so no sibling
//! issues another request, and the walk stops scheduling.

use std::path::{Component, Path, PathBuf};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use super::fetcher::LeafFetcher;
use crate::error::{Error, Result};
use crate::tree::{NodeKind, RemoteNode};
use crate::types::{
    DownloadTask, DownloadedFile, FailedFile, MirrorReport, SkipReason, SkippedNode,
};

pub(crate) struct TreeWalker<'a> {
    fetcher: &'a LeafFetcher,
    cancel: &'a CancellationToken,
    chunk_size: usize,
}

impl<'a> TreeWalker<'a> {
    pub(crate) fn new(
        fetcher: &'a LeafFetcher,
        cancel: &'a CancellationToken,
        chunk_size: usize,
    ) -> Self {
        Self {
            fetcher,
            cancel,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Mirror `forest` into `root`
    ///
    /// Returns `Err` only for run-level failures (authentication, cancellation,
    /// local directory creation). Per-file failures end up in the report.
    pub(crate) async fn mirror(&self, forest: &[RemoteNode], root: &Path) -> Result<MirrorReport> {
        let mut report = MirrorReport::default();
        tokio::fs::create_dir_all(root).await?;

        let tasks = collect_tasks(forest, root, &mut report).await?;
        tracing::info!(
            files = tasks.len(),
            directories = report.directories.len(),
            skipped = report.skipped.len(),
            "Directory structure created, dispatching downloads"
        );

        self.dispatch(&tasks, &mut report).await?;
        Ok(report)
    }

    async fn dispatch(&self, tasks: &[DownloadTask], report: &mut MirrorReport) -> Result<()> {
        let mut fatal: Option<Error> = None;

        for chunk in tasks.chunks(self.chunk_size) {
            if self.cancel.is_cancelled() {
                break;
            }
            let results = join_all(chunk.iter().map(|task| self.run_task(task))).await;

            for (task, result) in chunk.iter().zip(results) {
                match result {
                    Ok(bytes) => {
                        tracing::debug!(path = %task.relative_path.display(), bytes, "Downloaded file");
                        report.downloaded.push(DownloadedFile {
                            path: task.relative_path.clone(),
                            bytes,
                        });
                    }
                    Err(Error::DownloadFailed {
                        attempts, source, ..
                    }) => report.failed.push(FailedFile {
                        path: task.relative_path.clone(),
                        attempts,
                        error: source.to_string(),
                    }),
                    // Authentication wins over the cancellations it triggers
                    Err(e @ Error::Authentication { .. }) => fatal = Some(e),
                    Err(other) => {
                        fatal.get_or_insert(other);
                    }
                }
            }
            if fatal.is_some() {
                break;
            }
        }

        match fatal {
            Some(e) => Err(e),
            None if self.cancel.is_cancelled() => Err(Error::Cancelled),
            None => Ok(()),
        }
    }

    async fn run_task(&self, task: &DownloadTask) -> Result<u64> {
        let result = self.fetcher.fetch(task, self.cancel).await;
        if let Err(Error::Authentication { message }) = &result {
            tracing::error!(
                path = %task.relative_path.display(),
                message = %message,
                "Authentication rejected, aborting run"
            );
            self.cancel.cancel();
        }
        result
    }
}

/// True when `name` is exactly one normal path component
fn is_safe_segment(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}

/// Report every node below an unsafe directory as skipped
fn skip_subtree(children: &[RemoteNode], rel_dir: &Path, report: &mut MirrorReport) {
    let mut pending = vec![(children, rel_dir.to_path_buf())];
    while let Some((nodes, dir)) = pending.pop() {
        for node in nodes {
            let rel_path = dir.join(&node.name);
            if let NodeKind::Directory { children } = &node.kind {
                pending.push((children.as_slice(), rel_path.clone()));
            }
            report.skipped.push(SkippedNode {
                path: rel_path,
                reason: SkipReason::UnsafeAncestor,
            });
        }
    }
}

/// Create directories depth-first and collect every file below `forest`
async fn collect_tasks(
    forest: &[RemoteNode],
    root: &Path,
    report: &mut MirrorReport,
) -> Result<Vec<DownloadTask>> {
    let mut tasks = Vec::new();
    let mut pending: Vec<(&[RemoteNode], PathBuf)> = vec![(forest, PathBuf::new())];

    while let Some((nodes, rel_dir)) = pending.pop() {
        let mut subdirs = Vec::new();

        for node in nodes {
            let rel_path = rel_dir.join(&node.name);
            if !is_safe_segment(&node.name) {
                tracing::warn!(path = %rel_path.display(), "Skipping node with unsafe name");
                report.skipped.push(SkippedNode {
                    path: rel_path.clone(),
                    reason: SkipReason::UnsafeName,
                });
                if let NodeKind::Directory { children } = &node.kind {
                    skip_subtree(children, &rel_path, report);
                }
                continue;
            }

            match &node.kind {
                NodeKind::Directory { children } => {
                    tokio::fs::create_dir_all(root.join(&rel_path)).await?;
                    report.directories.push(rel_path.clone());
                    subdirs.push((children.as_slice(), rel_path));
                }
                NodeKind::File { remote_id, mode } => tasks.push(DownloadTask {
                    remote_id: remote_id.clone(),
                    destination: root.join(&rel_path),
                    relative_path: rel_path,
                    mode: *mode,
                }),
                NodeKind::Unsupported { kind } => {
                    tracing::warn!(path = %rel_path.display(), kind = %kind, "Skipping unsupported node");
                    report.skipped.push(SkippedNode {
                        path: rel_path,
                        reason: SkipReason::Unsupported { kind: kind.clone() },
                    });
                }
            }
        }

        // Reversed so the stack pops subdirectories in API order
        pending.extend(subdirs.into_iter().rev());
    }

    Ok(tasks)
}
