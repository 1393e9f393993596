//! End-to-end tests against a local HTTP server.
//!
//! The server is a minimal HTTP/1.1 responder bound to a random loopback
//! port. It understands GET and HEAD, serves configured routes, honors
//! Range requests with 206 responses (unless told to ignore them), and can
//! fail the first N requests to a route with a 500.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::core::config::{CrawlerConfig, DownloadConfig};
use crate::core::crawler::VideoCrawler;
use crate::core::downloader::{DownloaderConfig, HttpDownloader};
use crate::core::manager::DownloadManager;
use crate::core::models::{DetectionMethod, DownloadTask, TaskStatus, VideoSource};

struct Route {
    content_type: &'static str,
    body: Vec<u8>,
    /// Respond 500 to this many requests before serving the body
    fail_first: usize,
    /// Answer Range requests with a full 200 instead of a 206
    ignore_range: bool,
}

impl Route {
    fn new(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            content_type,
            body,
            fail_first: 0,
            ignore_range: false,
        }
    }
}

struct TestServer {
    addr: SocketAddr,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn spawn_server(routes: Vec<(&'static str, Route)>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let routes: Arc<HashMap<String, Route>> = Arc::new(
        routes
            .into_iter()
            .map(|(path, route)| (path.to_string(), route))
            .collect(),
    );
    let failures: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let routes = Arc::clone(&routes);
            let failures = Arc::clone(&failures);
            tokio::spawn(async move {
                handle_connection(stream, routes, failures).await;
            });
        }
    });

    TestServer { addr }
}

async fn handle_connection(
    mut stream: TcpStream,
    routes: Arc<HashMap<String, Route>>,
    failures: Arc<Mutex<HashMap<String, usize>>>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") && buf.len() < 64 * 1024 {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let request = String::from_utf8_lossy(&buf).to_string();
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("/").to_string();

    let range_start = request.lines().find_map(|line| {
        line.to_ascii_lowercase()
            .strip_prefix("range: bytes=")
            .and_then(|r| r.trim().trim_end_matches('-').parse::<u64>().ok())
    });

    let (head, body) = match routes.get(&path) {
        None => (response_head(404, "Not Found", "text/plain", 9, None), b"not found".to_vec()),
        Some(route) => {
            let failed = {
                let mut counts = failures.lock().unwrap();
                let count = counts.entry(path.clone()).or_insert(0);
                if *count < route.fail_first {
                    *count += 1;
                    true
                } else {
                    false
                }
            };

            if failed {
                (response_head(500, "Internal Server Error", "text/plain", 4, None), b"boom".to_vec())
            } else {
                match range_start {
                    Some(start) if !route.ignore_range => {
                        if (start as usize) < route.body.len() {
                            let start = start as usize;
                            let slice = route.body[start..].to_vec();
                            (
                                response_head(
                                    206,
                                    "Partial Content",
                                    route.content_type,
                                    slice.len(),
                                    Some((start, route.body.len())),
                                ),
                                slice,
                            )
                        } else {
                            (
                                response_head(
                                    416,
                                    "Range Not Satisfiable",
                                    "text/plain",
                                    0,
                                    None,
                                ),
                                Vec::new(),
                            )
                        }
                    }
                    _ => (
                        response_head(200, "OK", route.content_type, route.body.len(), None),
                        route.body.clone(),
                    ),
                }
            }
        }
    };

    let _ = stream.write_all(head.as_bytes()).await;
    if method != "HEAD" {
        let _ = stream.write_all(&body).await;
    }
    let _ = stream.flush().await;
}

fn response_head(
    status: u16,
    reason: &str,
    content_type: &str,
    content_length: usize,
    range: Option<(usize, usize)>,
) -> String {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n",
        status, reason, content_type, content_length
    );
    if let Some((start, total)) = range {
        head.push_str(&format!(
            "Content-Range: bytes {}-{}/{}\r\n",
            start,
            total - 1,
            total
        ));
    }
    head.push_str("\r\n");
    head
}

/// Deterministic pseudo-random payload of the given size
fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 31 % 251) as u8).collect()
}

fn direct_source(url: String, title: &str) -> VideoSource {
    VideoSource {
        url,
        title: title.to_string(),
        file_type: ".mp4".to_string(),
        size: None,
        quality: None,
        source_page: "http://local.test/".to_string(),
        detected_by: DetectionMethod::DirectLink,
    }
}

fn task_for(url: String, dir: &str, filename: &str) -> DownloadTask {
    DownloadTask::new(
        direct_source(url, filename),
        dir.to_string(),
        filename.to_string(),
    )
}

#[tokio::test]
async fn test_download_whole_file() {
    let body = payload(64 * 1024);
    let server = spawn_server(vec![("/clip.mp4", Route::new("video/mp4", body.clone()))]).await;

    let downloader = HttpDownloader::new(DownloaderConfig::default()).unwrap();
    let dir = tempdir().unwrap();
    let task = task_for(
        server.url("/clip.mp4"),
        &dir.path().to_string_lossy(),
        "clip.mp4",
    );

    let done = downloader.download(task).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.stats.downloaded_bytes, body.len() as u64);

    let written = tokio::fs::read(done.full_path()).await.unwrap();
    assert_eq!(written, body);
}

#[tokio::test]
async fn test_resume_continues_partial_file() {
    let body = payload(100 * 1024);
    let server = spawn_server(vec![("/big.mp4", Route::new("video/mp4", body.clone()))]).await;

    let downloader = HttpDownloader::new(DownloaderConfig::default()).unwrap();
    let dir = tempdir().unwrap();

    // Seed a partial file; the engine should request the remainder
    let partial = 1000;
    tokio::fs::write(dir.path().join("big.mp4"), &body[..partial])
        .await
        .unwrap();

    let task = task_for(
        server.url("/big.mp4"),
        &dir.path().to_string_lossy(),
        "big.mp4",
    );
    let done = downloader.download(task).await.unwrap();

    assert_eq!(done.status, TaskStatus::Completed);
    let written = tokio::fs::read(done.full_path()).await.unwrap();
    assert_eq!(written, body);
}

#[tokio::test]
async fn test_resume_of_complete_file_short_circuits() {
    let body = payload(16 * 1024);
    let server = spawn_server(vec![("/done.mp4", Route::new("video/mp4", body.clone()))]).await;

    let downloader = HttpDownloader::new(DownloaderConfig::default()).unwrap();
    let dir = tempdir().unwrap();

    // The file is already whole; the server answers the resume request
    // with 416 and the task must complete without burning retries.
    tokio::fs::write(dir.path().join("done.mp4"), &body)
        .await
        .unwrap();

    let task = task_for(
        server.url("/done.mp4"),
        &dir.path().to_string_lossy(),
        "done.mp4",
    );
    let done = downloader.download(task).await.unwrap();

    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.stats.downloaded_bytes, body.len() as u64);
    let written = tokio::fs::read(done.full_path()).await.unwrap();
    assert_eq!(written, body);
}

#[tokio::test]
async fn test_range_ignoring_server_restarts_file() {
    let body = payload(32 * 1024);
    let mut route = Route::new("video/mp4", body.clone());
    route.ignore_range = true;
    let server = spawn_server(vec![("/norange.mp4", route)]).await;

    let downloader = HttpDownloader::new(DownloaderConfig::default()).unwrap();
    let dir = tempdir().unwrap();

    // The seeded bytes differ from the real prefix; if the 200 response
    // were appended instead of restarting, the content would be corrupt.
    tokio::fs::write(dir.path().join("norange.mp4"), vec![0xFFu8; 500])
        .await
        .unwrap();

    let task = task_for(
        server.url("/norange.mp4"),
        &dir.path().to_string_lossy(),
        "norange.mp4",
    );
    let done = downloader.download(task).await.unwrap();

    assert_eq!(done.status, TaskStatus::Completed);
    let written = tokio::fs::read(done.full_path()).await.unwrap();
    assert_eq!(written, body);
}

#[tokio::test]
async fn test_batch_download() {
    let server = spawn_server(vec![
        ("/a.mp4", Route::new("video/mp4", payload(4096))),
        ("/b.mp4", Route::new("video/mp4", payload(8192))),
        ("/c.mp4", Route::new("video/mp4", payload(2048))),
    ])
    .await;

    let downloader = HttpDownloader::new(DownloaderConfig {
        max_concurrent: 2,
        ..Default::default()
    })
    .unwrap();
    let dir = tempdir().unwrap();
    let dir_str = dir.path().to_string_lossy().to_string();

    let tasks = vec![
        task_for(server.url("/a.mp4"), &dir_str, "a.mp4"),
        task_for(server.url("/b.mp4"), &dir_str, "b.mp4"),
        task_for(server.url("/c.mp4"), &dir_str, "c.mp4"),
    ];

    let results = downloader.batch_download(tasks).await;
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|t| t.status == TaskStatus::Completed));
    for name in ["a.mp4", "b.mp4", "c.mp4"] {
        assert!(dir.path().join(name).exists());
    }
}

#[tokio::test]
async fn test_crawl_validates_against_live_server() {
    let html = r#"<html><body>
        <a href="/clip.mp4">Served clip</a>
        <a href="/missing.mp4">Gone clip</a>
    </body></html>"#;
    let server = spawn_server(vec![
        ("/", Route::new("text/html", html.as_bytes().to_vec())),
        ("/clip.mp4", Route::new("video/mp4", payload(12345))),
    ])
    .await;

    let crawler = VideoCrawler::new(CrawlerConfig::default()).unwrap();
    let sources = crawler.crawl(&server.url("/")).await.unwrap();

    // The probe drops the 404 candidate and fills in the size
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].title, "Served clip");
    assert_eq!(sources[0].size, Some(12345));
}

#[tokio::test]
async fn test_crawl_without_validation_keeps_unprobed_candidates() {
    let html = r#"<html><body>
        <a href="/clip.mp4">Served clip</a>
        <a href="/missing.mp4">Gone clip</a>
    </body></html>"#;
    let server = spawn_server(vec![
        ("/", Route::new("text/html", html.as_bytes().to_vec())),
        ("/clip.mp4", Route::new("video/mp4", payload(1024))),
    ])
    .await;

    let config = CrawlerConfig {
        validate: false,
        ..Default::default()
    };
    let crawler = VideoCrawler::new(config).unwrap();
    let sources = crawler.crawl(&server.url("/")).await.unwrap();

    assert_eq!(sources.len(), 2);
}

#[tokio::test]
async fn test_manager_downloads_selection_to_completion() {
    let server = spawn_server(vec![
        ("/one.mp4", Route::new("video/mp4", payload(4096))),
        ("/two.mp4", Route::new("video/mp4", payload(4096))),
        ("/three.mp4", Route::new("video/mp4", payload(4096))),
    ])
    .await;

    let dir = tempdir().unwrap();
    let config = DownloadConfig {
        output_directory: dir.path().to_string_lossy().to_string(),
        concurrent_downloads: 2,
        ..Default::default()
    };

    let manager = DownloadManager::new(config).unwrap();
    manager.start().await.unwrap();
    manager
        .add_all(vec![
            direct_source(server.url("/one.mp4"), "one"),
            direct_source(server.url("/two.mp4"), "two"),
            direct_source(server.url("/three.mp4"), "three"),
        ])
        .await
        .unwrap();

    manager.wait_until_idle().await;

    let stats = manager.queue_stats().await;
    assert_eq!(stats.total_tasks, 3);
    assert_eq!(stats.completed_tasks, 3);
    assert_eq!(stats.failed_tasks, 0);
    assert!((stats.overall_progress - 1.0).abs() < 0.001);

    for name in ["one.mp4", "two.mp4", "three.mp4"] {
        assert!(dir.path().join(name).exists());
    }
}

#[tokio::test]
async fn test_downloading_count_never_exceeds_limit() {
    let routes: Vec<(&'static str, Route)> = vec![
        ("/v1.mp4", Route::new("video/mp4", payload(32 * 1024))),
        ("/v2.mp4", Route::new("video/mp4", payload(32 * 1024))),
        ("/v3.mp4", Route::new("video/mp4", payload(32 * 1024))),
        ("/v4.mp4", Route::new("video/mp4", payload(32 * 1024))),
        ("/v5.mp4", Route::new("video/mp4", payload(32 * 1024))),
        ("/v6.mp4", Route::new("video/mp4", payload(32 * 1024))),
    ];
    let server = spawn_server(routes).await;

    let dir = tempdir().unwrap();
    let config = DownloadConfig {
        output_directory: dir.path().to_string_lossy().to_string(),
        concurrent_downloads: 2,
        // Slow the transfers down so slot refills overlap with completions
        rate_limit_bytes: Some(256 * 1024),
        ..Default::default()
    };

    let manager = DownloadManager::new(config).unwrap();
    manager.start().await.unwrap();
    manager
        .add_all(
            (1..=6)
                .map(|i| direct_source(server.url(&format!("/v{}.mp4", i)), &format!("v{}", i)))
                .collect(),
        )
        .await
        .unwrap();

    loop {
        let stats = manager.queue_stats().await;
        assert!(
            stats.active_tasks <= 2,
            "{} tasks marked Downloading with a limit of 2",
            stats.active_tasks
        );
        if manager
            .all_tasks()
            .await
            .iter()
            .all(|t| t.status.is_terminal())
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let stats = manager.queue_stats().await;
    assert_eq!(stats.completed_tasks, 6);
}

#[tokio::test]
async fn test_manager_retries_transient_failures() {
    let mut route = Route::new("video/mp4", payload(2048));
    route.fail_first = 2;
    let server = spawn_server(vec![("/flaky.mp4", route)]).await;

    let dir = tempdir().unwrap();
    let config = DownloadConfig {
        output_directory: dir.path().to_string_lossy().to_string(),
        retry_attempts: 3,
        ..Default::default()
    };

    let manager = DownloadManager::new(config).unwrap();
    manager.start().await.unwrap();
    let id = manager
        .add(direct_source(server.url("/flaky.mp4"), "flaky"))
        .await
        .unwrap();

    manager.wait_until_idle().await;

    let task = manager.get_task(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.retry_count, 2);
    assert!(dir.path().join("flaky.mp4").exists());
}

#[tokio::test]
async fn test_manager_exhausts_retry_budget() {
    let mut route = Route::new("video/mp4", payload(2048));
    route.fail_first = 100;
    let server = spawn_server(vec![("/broken.mp4", route)]).await;

    let dir = tempdir().unwrap();
    let config = DownloadConfig {
        output_directory: dir.path().to_string_lossy().to_string(),
        retry_attempts: 2,
        ..Default::default()
    };

    let manager = DownloadManager::new(config).unwrap();
    manager.start().await.unwrap();
    let id = manager
        .add(direct_source(server.url("/broken.mp4"), "broken"))
        .await
        .unwrap();

    manager.wait_until_idle().await;

    let task = manager.get_task(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_count, 1);
    assert!(task.error_message.unwrap().contains("HTTP 500"));
}

#[tokio::test]
async fn test_manager_verifies_integrity() {
    let body = payload(4096);
    let digest = hex::encode(Sha256::digest(&body));
    let server = spawn_server(vec![
        ("/good.mp4", Route::new("video/mp4", body.clone())),
        ("/bad.mp4", Route::new("video/mp4", body)),
    ])
    .await;

    let dir = tempdir().unwrap();
    let mut config = DownloadConfig {
        output_directory: dir.path().to_string_lossy().to_string(),
        verify_integrity: true,
        retry_attempts: 1,
        ..Default::default()
    };
    config
        .expected_hashes
        .insert(server.url("/good.mp4"), digest);
    config
        .expected_hashes
        .insert(server.url("/bad.mp4"), "0".repeat(64));

    let manager = DownloadManager::new(config).unwrap();
    manager.start().await.unwrap();
    let good = manager
        .add(direct_source(server.url("/good.mp4"), "good"))
        .await
        .unwrap();
    let bad = manager
        .add(direct_source(server.url("/bad.mp4"), "bad"))
        .await
        .unwrap();

    manager.wait_until_idle().await;

    assert_eq!(
        manager.get_task(&good).await.unwrap().status,
        TaskStatus::Completed
    );
    let bad_task = manager.get_task(&bad).await.unwrap();
    assert_eq!(bad_task.status, TaskStatus::Failed);
    assert!(bad_task
        .error_message
        .unwrap()
        .contains("integrity mismatch"));
}
