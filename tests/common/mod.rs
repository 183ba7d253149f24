//! Common test utilities for deploy-mirror integration tests

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use deploy_mirror::{ApiConfig, Config, DownloadConfig, RetryConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config pointed at `server` with fast, deterministic retries
pub fn test_config(server: &MockServer, max_concurrent: usize, max_attempts: u32) -> Config {
    Config {
        api: ApiConfig {
            api_url: server.uri(),
            token: "test-token".to_string(),
            team_id: None,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        },
        download: DownloadConfig {
            max_concurrent_downloads: max_concurrent,
            ..DownloadConfig::default()
        },
        retry: RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            jitter: false,
            ..RetryConfig::default()
        },
    }
}

/// Serve `body` as raw bytes for `remote_id`
pub async fn mount_file(server: &MockServer, remote_id: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/v6/deployments/files/{remote_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Serve `status` for `remote_id`, at most `times` times when given
pub async fn mount_status(server: &MockServer, remote_id: &str, status: u16, times: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path(format!("/v6/deployments/files/{remote_id}")))
        .respond_with(ResponseTemplate::new(status));
    let mock = match times {
        Some(n) => mock.up_to_n_times(n),
        None => mock,
    };
    mock.mount(server).await;
}

/// Number of requests the server saw for `remote_id`
pub async fn requests_for(server: &MockServer, remote_id: &str) -> usize {
    let wanted = format!("/v6/deployments/files/{remote_id}");
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == wanted)
        .count()
}

/// Relative paths of all directories and files below `root`
pub fn local_tree(root: &Path) -> (BTreeSet<PathBuf>, BTreeSet<PathBuf>) {
    let mut dirs = BTreeSet::new();
    let mut files = BTreeSet::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1) {
        let entry = entry.expect("walk failed");
        let rel = entry
            .path()
            .strip_prefix(root)
            .expect("entry outside root")
            .to_path_buf();
        if entry.file_type().is_dir() {
            dirs.insert(rel);
        } else {
            files.insert(rel);
        }
    }
    (dirs, files)
}
