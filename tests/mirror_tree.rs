//! End-to-end tests for tree mirroring against a mocked deployment API

mod common;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use common::{local_tree, mount_file, mount_status, requests_for, test_config};
use deploy_mirror::{Error, FailurePolicy, RemoteNode, SkipReason, TreeDownloader};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scenario_tree() -> Vec<RemoteNode> {
    vec![RemoteNode::directory(
        "src",
        vec![
            RemoteNode::file("a.txt", "u1"),
            RemoteNode::directory("nested", vec![RemoteNode::file("b.txt", "u2")]),
        ],
    )]
}

#[tokio::test]
async fn mirrors_nested_tree_byte_for_byte() {
    let server = MockServer::start().await;
    mount_file(&server, "u1", b"hello").await;
    // One file arrives as a base64 JSON envelope
    Mock::given(method("GET"))
        .and(path("/v6/deployments/files/u2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": "d29ybGQ=" })))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let downloader = TreeDownloader::new(test_config(&server, 2, 5)).unwrap();
    let report = downloader
        .download_tree(&scenario_tree(), dir.path())
        .await
        .unwrap();

    assert_eq!(
        std::fs::read(dir.path().join("src/a.txt")).unwrap(),
        b"hello"
    );
    assert_eq!(
        std::fs::read(dir.path().join("src/nested/b.txt")).unwrap(),
        b"world"
    );
    assert_eq!(report.downloaded_count(), 2);
    assert_eq!(report.total_bytes(), 10);
    assert!(report.failed.is_empty());
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn local_structure_matches_remote_exactly() {
    let server = MockServer::start().await;
    for id in ["f1", "f2", "f3", "f4"] {
        mount_file(&server, id, id.as_bytes()).await;
    }
    let tree = vec![
        RemoteNode::directory(
            "app",
            vec![
                RemoteNode::directory("empty", vec![]),
                RemoteNode::directory(
                    "pages",
                    vec![
                        RemoteNode::file("index.tsx", "f1"),
                        RemoteNode::unsupported("api", "lambda"),
                    ],
                ),
                RemoteNode::file("layout.tsx", "f2"),
            ],
        ),
        RemoteNode::file("package.json", "f3"),
        RemoteNode::directory("public", vec![RemoteNode::file("robots.txt", "f4")]),
        RemoteNode::unsupported("handler", "lambda"),
    ];
    let dir = tempfile::tempdir().unwrap();

    let downloader = TreeDownloader::new(test_config(&server, 2, 3)).unwrap();
    let report = downloader.download_tree(&tree, dir.path()).await.unwrap();

    let (dirs, files) = local_tree(dir.path());
    let expected_dirs: BTreeSet<PathBuf> = ["app", "app/empty", "app/pages", "public"]
        .into_iter()
        .map(PathBuf::from)
        .collect();
    let expected_files: BTreeSet<PathBuf> = [
        "app/pages/index.tsx",
        "app/layout.tsx",
        "package.json",
        "public/robots.txt",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect();
    assert_eq!(dirs, expected_dirs);
    assert_eq!(files, expected_files);
    assert_eq!(
        std::fs::read(dir.path().join("public/robots.txt")).unwrap(),
        b"f4"
    );

    assert_eq!(report.skipped.len(), 2);
    assert!(
        report
            .skipped
            .iter()
            .all(|s| matches!(s.reason, SkipReason::Unsupported { .. }))
    );
    // Unsupported nodes never reach the server
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 4);
}

#[tokio::test]
async fn throttled_until_last_attempt_still_succeeds() {
    let server = MockServer::start().await;
    mount_status(&server, "u1", 429, Some(4)).await;
    mount_file(&server, "u1", b"finally").await;
    let dir = tempfile::tempdir().unwrap();

    let downloader = TreeDownloader::new(test_config(&server, 2, 5)).unwrap();
    let report = downloader
        .download_tree(&[RemoteNode::file("slow.txt", "u1")], dir.path())
        .await
        .unwrap();

    assert_eq!(report.downloaded_count(), 1);
    assert!(report.failed.is_empty());
    assert_eq!(
        std::fs::read(dir.path().join("slow.txt")).unwrap(),
        b"finally"
    );
    assert_eq!(requests_for(&server, "u1").await, 5);
}

#[tokio::test]
async fn throttled_on_every_attempt_is_reported_and_siblings_continue() {
    let server = MockServer::start().await;
    mount_status(&server, "bad", 429, None).await;
    mount_file(&server, "ok1", b"one").await;
    mount_file(&server, "ok2", b"two").await;
    let tree = vec![
        RemoteNode::file("first.txt", "ok1"),
        RemoteNode::file("throttled.txt", "bad"),
        RemoteNode::file("last.txt", "ok2"),
    ];
    let dir = tempfile::tempdir().unwrap();

    let downloader = TreeDownloader::new(test_config(&server, 2, 5)).unwrap();
    let report = downloader.download_tree(&tree, dir.path()).await.unwrap();

    assert_eq!(report.downloaded_count(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].path, PathBuf::from("throttled.txt"));
    assert_eq!(report.failed[0].attempts, 5);
    assert!(!dir.path().join("throttled.txt").exists());
    assert!(dir.path().join("last.txt").exists());
    assert_eq!(requests_for(&server, "bad").await, 5);
}

#[tokio::test]
async fn fail_run_policy_surfaces_incomplete_mirror() {
    let server = MockServer::start().await;
    mount_status(&server, "bad", 500, None).await;
    mount_file(&server, "ok", b"fine").await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = test_config(&server, 2, 2);
    config.download.failure_policy = FailurePolicy::FailRun;
    let downloader = TreeDownloader::new(config).unwrap();
    let result = downloader
        .download_tree(
            &[
                RemoteNode::file("broken.bin", "bad"),
                RemoteNode::file("fine.txt", "ok"),
            ],
            dir.path(),
        )
        .await;

    match result {
        Err(Error::Incomplete { failed, downloaded }) => {
            assert_eq!(downloaded, 1);
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].path, PathBuf::from("broken.bin"));
            assert_eq!(failed[0].attempts, 2);
        }
        other => panic!("expected Incomplete, got {other:?}"),
    }
    assert!(dir.path().join("fine.txt").exists());
}

#[tokio::test]
async fn authentication_failure_aborts_without_further_requests() {
    let server = MockServer::start().await;
    mount_status(&server, "u1", 401, None).await;
    mount_file(&server, "u2", b"never").await;
    mount_file(&server, "u3", b"never").await;
    let tree = vec![
        RemoteNode::file("a.txt", "u1"),
        RemoteNode::file("b.txt", "u2"),
        RemoteNode::file("c.txt", "u3"),
    ];
    let dir = tempfile::tempdir().unwrap();

    let downloader = TreeDownloader::new(test_config(&server, 1, 5)).unwrap();
    let result = downloader.download_tree(&tree, dir.path()).await;

    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "got {result:?}"
    );
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1, "no request may follow the 401");
    assert!(!dir.path().join("b.txt").exists());
}

#[tokio::test]
async fn authentication_failure_stops_sibling_in_backoff() {
    let server = MockServer::start().await;
    mount_status(&server, "x", 429, None).await;
    // The 401 lands while x is already waiting out its first backoff
    Mock::given(method("GET"))
        .and(path("/v6/deployments/files/y"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;
    mount_file(&server, "z", b"never").await;
    let tree = vec![
        RemoteNode::file("x.txt", "x"),
        RemoteNode::file("y.txt", "y"),
        RemoteNode::file("z.txt", "z"),
    ];
    let dir = tempfile::tempdir().unwrap();

    let mut config = test_config(&server, 2, 5);
    config.retry.initial_delay = Duration::from_secs(5);
    config.retry.max_delay = Duration::from_secs(5);
    let downloader = TreeDownloader::new(config).unwrap();

    let start = Instant::now();
    let result = downloader.download_tree(&tree, dir.path()).await;

    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "got {result:?}"
    );
    assert!(start.elapsed() < Duration::from_secs(4), "backoff was not interrupted");
    assert_eq!(requests_for(&server, "x").await, 1);
    assert_eq!(requests_for(&server, "y").await, 1);
    assert_eq!(requests_for(&server, "z").await, 0);
}

#[tokio::test]
async fn sibling_named_like_a_temp_file_survives() {
    let server = MockServer::start().await;
    mount_file(&server, "u1", b"sibling").await;
    mount_file(&server, "u2", b"target").await;
    let tree = vec![
        RemoteNode::file(".a.txt.part", "u1"),
        RemoteNode::file("a.txt", "u2"),
    ];
    let dir = tempfile::tempdir().unwrap();

    let downloader = TreeDownloader::new(test_config(&server, 1, 3)).unwrap();
    let report = downloader.download_tree(&tree, dir.path()).await.unwrap();

    assert_eq!(report.downloaded_count(), 2);
    assert_eq!(
        std::fs::read(dir.path().join(".a.txt.part")).unwrap(),
        b"sibling"
    );
    assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"target");
    let (_, files) = local_tree(dir.path());
    assert_eq!(
        files,
        BTreeSet::from([PathBuf::from(".a.txt.part"), PathBuf::from("a.txt")])
    );
}

#[tokio::test]
async fn in_flight_downloads_never_exceed_capacity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"payload".to_vec())
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&server)
        .await;
    let files: Vec<_> = (0..9)
        .map(|i| RemoteNode::file(format!("f{i}.txt"), format!("u{i}")))
        .collect();
    let tree = vec![RemoteNode::directory("many", files)];
    let dir = tempfile::tempdir().unwrap();

    let downloader = TreeDownloader::new(test_config(&server, 3, 1)).unwrap();
    let report = downloader.download_tree(&tree, dir.path()).await.unwrap();

    assert_eq!(report.downloaded_count(), 9);
    assert!(report.peak_in_flight >= 1);
    assert!(
        report.peak_in_flight <= 3,
        "peak in flight was {}",
        report.peak_in_flight
    );
}

#[tokio::test]
async fn run_deadline_cancels_outstanding_work() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = test_config(&server, 1, 5);
    config.download.run_timeout = Some(Duration::from_millis(200));
    let downloader = TreeDownloader::new(config).unwrap();

    let start = Instant::now();
    let result = downloader
        .download_tree(
            &[
                RemoteNode::file("a.txt", "u1"),
                RemoteNode::file("b.txt", "u2"),
            ],
            dir.path(),
        )
        .await;

    assert!(matches!(result, Err(Error::Cancelled)), "got {result:?}");
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!dir.path().join("a.txt").exists());
    assert_eq!(requests_for(&server, "u2").await, 0);
}

#[tokio::test]
async fn cancelled_downloader_issues_no_requests() {
    let server = MockServer::start().await;
    mount_file(&server, "u1", b"x").await;
    let dir = tempfile::tempdir().unwrap();

    let downloader = TreeDownloader::new(test_config(&server, 2, 5)).unwrap();
    downloader.cancel();
    let result = downloader
        .download_tree(&[RemoteNode::file("a.txt", "u1")], dir.path())
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn mirror_deployment_fetches_tree_then_files() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v6/deployments/dpl_42/files"))
        .and(query_param("teamId", "team_7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "name": "src", "type": "directory", "uid": "d1", "children": [
                { "name": "a.txt", "type": "file", "uid": "u1" },
                { "name": "nested", "type": "directory", "children": [
                    { "name": "b.txt", "type": "file", "uid": "u2" }
                ]}
            ]},
            { "name": "api", "type": "lambda", "uid": "l1" }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    mount_file(&server, "u1", b"hello").await;
    mount_file(&server, "u2", b"world").await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = test_config(&server, 2, 3);
    config.api.team_id = Some("team_7".to_string());
    let downloader = TreeDownloader::new(config).unwrap();
    let report = downloader
        .mirror_deployment("dpl_42", dir.path())
        .await
        .unwrap();

    assert_eq!(report.downloaded_count(), 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(
        std::fs::read(dir.path().join("src/nested/b.txt")).unwrap(),
        b"world"
    );
}

#[tokio::test]
async fn tree_fetch_retries_then_reports_empty_deployment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v6/deployments/dpl_empty/files"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v6/deployments/dpl_empty/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let downloader = TreeDownloader::new(test_config(&server, 2, 3)).unwrap();
    let result = downloader.mirror_deployment("dpl_empty", dir.path()).await;

    assert!(
        matches!(result, Err(Error::EmptyTree { ref deployment_id }) if deployment_id == "dpl_empty"),
        "got {result:?}"
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn invalid_config_is_rejected_up_front() {
    let server = MockServer::start().await;
    let mut config = test_config(&server, 0, 5);
    assert!(matches!(
        TreeDownloader::new(config.clone()),
        Err(Error::Config { .. })
    ));
    config.download.max_concurrent_downloads = 2;
    config.api.token = String::new();
    assert!(matches!(
        TreeDownloader::new(config),
        Err(Error::Config { .. })
    ));
}
