//! Fetch engine tests against a mock storefront

use crate::common::*;
use asin_harvester::crawler::{EngineSettings, FetchEngine, RateLimiter, RetryScheduler};
use asin_harvester::session::{
    CaptchaOracle, CookieSet, FormCaptchaSolver, ProxyPool, StaticCookieProvider,
};
use asin_harvester::state::{DetailRecord, FetchOutcome, SoftFailure};
use asin_harvester::storage::{
    batch_name, Exporter, FsExporter, RawKey, StorageError, StorageResult, RAW_WRITE_ATTEMPTS,
};
use asin_harvester::{FetchTarget, Harvester, Market, ResponseClassifier, Result};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer};

struct FixedOracle(&'static str);

impl CaptchaOracle for FixedOracle {
    async fn read(&self, _image_url: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

fn cookies() -> CookieSet {
    let mut cookies = BTreeMap::new();
    cookies.insert("session-id".to_string(), "123".to_string());
    CookieSet::new(cookies)
}

/// Rejects every raw write
#[derive(Default)]
struct BrokenExporter {
    raw_writes: AtomicU32,
}

impl Exporter for BrokenExporter {
    fn put_raw(&self, _key: &RawKey, _body: &str) -> StorageResult<()> {
        self.raw_writes.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Database("disk full".to_string()))
    }

    fn put_batch(&self, _: &str, _: &str, records: &[DetailRecord]) -> StorageResult<String> {
        Ok(batch_name(records))
    }

    fn fetched(&self, _: &str, _: &str) -> StorageResult<HashSet<String>> {
        Ok(HashSet::new())
    }
}

fn engine(server: &MockServer, dir: &TempDir) -> FetchEngine<FormCaptchaSolver<FixedOracle>> {
    let exporter: Arc<dyn Exporter> = Arc::new(FsExporter::new(dir.path()));
    engine_with(server, dir, exporter, |_| {})
}

fn engine_with(
    server: &MockServer,
    dir: &TempDir,
    exporter: Arc<dyn Exporter>,
    adjust: impl FnOnce(&mut EngineSettings),
) -> FetchEngine<FormCaptchaSolver<FixedOracle>> {
    let config = test_config(&server.uri(), dir.path());
    let mut settings = EngineSettings::from_config(&config, RUNDATE);
    adjust(&mut settings);
    FetchEngine::new(
        settings,
        RateLimiter::new(config.engine.rate_per_second),
        ProxyPool::direct(),
        ResponseClassifier::from_config(&config).unwrap(),
        FormCaptchaSolver::new(FixedOracle("AbC")),
        exporter,
    )
}

/// Answers with headers and the start of a large body, then goes quiet
async fn stalling_storefront() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100000\r\n\r\n<html><body>")
                    .await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
    });
    format!("http://{}", addr)
}

fn target(server: &MockServer, asin: &str) -> FetchTarget {
    FetchTarget::new(asin, format!("{}/dp/{}?th=1", server.uri(), asin))
}

#[tokio::test]
async fn test_round_yields_one_outcome_per_target() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_product(&server, "B000000001", html(product_page("B000000001", "10001"))).await;
    mount_product(&server, "B000000002", html(bare_page())).await;
    mount_product(&server, "B000000003", html(not_found_page())).await;
    mount_product(&server, "B000000004", unavailable()).await;

    let engine = engine(&server, &dir);
    let targets = ["B000000001", "B000000002", "B000000003", "B000000004"]
        .iter()
        .map(|asin| target(&server, asin))
        .collect();
    let report = engine.fetch_all(targets, &cookies()).await;

    assert_eq!(report.total(), 4);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.invalid, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(report.retry.len(), 1);
    assert_eq!(report.retry[0].identifier, "B000000004");

    let counters = engine.counters();
    assert_eq!(counters.requests_issued, 4);
    assert_eq!(counters.responses_received, 4);

    let stored = dir.path().join("asin_info/raw/2026/10/19");
    assert!(stored.join("B000000001.html").exists());
    assert!(stored.join("invalid/B000000002.html").exists());
    assert!(!stored.join("B000000003.html").exists());
    assert!(!stored.join("B000000004.html").exists());
}

#[tokio::test]
async fn test_unreachable_storefront_is_retryable() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let engine = engine(&server, &dir);

    let unreachable = FetchTarget::new("B000000001", "http://127.0.0.1:1/dp/B000000001");
    let report = engine.fetch_all(vec![unreachable], &cookies()).await;
    assert_eq!(report.retry.len(), 1);
    assert_eq!(engine.counters().responses_received, 0);
}

#[tokio::test]
async fn test_captcha_is_solved_in_place() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_product(&server, "B000000001", html(challenge_page())).await;
    Mock::given(method("GET"))
        .and(path("/errors/validateCaptcha"))
        .and(query_param("amzn", "token-a"))
        .and(query_param("field-keywords", "abc"))
        .respond_with(html(product_page("B000000001", "10001")))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(&server, &dir);
    let report = engine
        .fetch_all(vec![target(&server, "B000000001")], &cookies())
        .await;

    assert_eq!(report.succeeded, 1);
    assert!(dir
        .path()
        .join("asin_info/raw/2026/10/19/B000000001.html")
        .exists());
}

#[tokio::test]
async fn test_persisting_captcha_escalates() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_product(&server, "B000000001", html(challenge_page())).await;
    Mock::given(method("GET"))
        .and(path("/errors/validateCaptcha"))
        .respond_with(html(challenge_page()))
        .expect(3)
        .mount(&server)
        .await;

    let harvester = Harvester::new(
        engine(&server, &dir),
        StaticCookieProvider::new(None, cookies_map()),
        RetryScheduler::new(3),
        Market::usa(),
        "10001",
    )
    .with_base_url(server.uri());
    let report = harvester.run(vec!["B000000001".to_string()]).await.unwrap();

    assert_eq!(report.rounds, 3);
    assert_eq!(report.escalated, vec!["B000000001".to_string()]);
    assert_eq!(report.counters.succeeded, 0);
}

#[tokio::test]
async fn test_wrong_delivery_location_is_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_product(&server, "B000000001", html(product_page("B000000001", "94105"))).await;

    let engine = engine(&server, &dir);
    let report = engine
        .fetch_all(vec![target(&server, "B000000001")], &cookies())
        .await;

    assert_eq!(report.retry.len(), 1);
    assert!(!dir
        .path()
        .join("asin_info/raw/2026/10/19/B000000001.html")
        .exists());
}

#[tokio::test]
async fn test_stalled_body_is_retryable_without_in_place_retries() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let base = stalling_storefront().await;
    let exporter: Arc<dyn Exporter> = Arc::new(FsExporter::new(dir.path()));
    let engine = engine_with(&server, &dir, exporter, |settings| {
        settings.timeout = Duration::from_secs(1);
        settings.max_inner_attempts = 3;
    });

    let started = Instant::now();
    let target = FetchTarget::new("B000000001", format!("{}/dp/B000000001", base));
    let outcome = engine.fetch(target, &cookies()).await;

    match outcome {
        FetchOutcome::Retryable { reason, .. } => assert_eq!(reason, SoftFailure::Transport),
        other => panic!("expected a retryable outcome, got {:?}", other),
    }
    let counters = engine.counters();
    assert_eq!(counters.requests_issued, 1);
    assert_eq!(counters.retried, 1);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_failed_raw_write_becomes_one_retry() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_product(&server, "B000000001", html(product_page("B000000001", "10001"))).await;
    let exporter = Arc::new(BrokenExporter::default());
    let engine = engine_with(&server, &dir, exporter.clone(), |_| {});

    let outcome = engine.fetch(target(&server, "B000000001"), &cookies()).await;

    match outcome {
        FetchOutcome::Retryable { target, reason } => {
            assert_eq!(reason, SoftFailure::PersistFailed);
            assert_eq!(target.identifier, "B000000001");
        }
        other => panic!("expected a retryable outcome, got {:?}", other),
    }
    assert_eq!(exporter.raw_writes.load(Ordering::SeqCst), RAW_WRITE_ATTEMPTS);
    let counters = engine.counters();
    assert_eq!(counters.retried, 1);
    assert_eq!(counters.succeeded, 0);
}

#[tokio::test]
async fn test_recurring_unexpected_error_exhausts_in_place_attempts() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_product(&server, "B000000001", html(product_page("B000000001", "10001"))).await;
    let exporter: Arc<dyn Exporter> = Arc::new(FsExporter::new(dir.path()));
    let engine = engine_with(&server, &dir, exporter, |settings| {
        settings.max_inner_attempts = 3;
    });

    // a cookie value that cannot go into a header fails every attempt
    // before anything is sent
    let mut broken = BTreeMap::new();
    broken.insert("session-id".to_string(), "bad\nvalue".to_string());
    let outcome = engine
        .fetch(target(&server, "B000000001"), &CookieSet::new(broken))
        .await;

    match outcome {
        FetchOutcome::Retryable { reason, .. } => assert_eq!(reason, SoftFailure::Exhausted),
        other => panic!("expected a retryable outcome, got {:?}", other),
    }
    let counters = engine.counters();
    assert_eq!(counters.requests_issued, 3);
    assert_eq!(counters.responses_received, 0);
    assert_eq!(counters.retried, 1);
}

#[tokio::test]
async fn test_zero_progress_interval_is_accepted() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_product(&server, "B000000001", html(product_page("B000000001", "10001"))).await;
    let exporter: Arc<dyn Exporter> = Arc::new(FsExporter::new(dir.path()));
    let engine = engine_with(&server, &dir, exporter, |settings| {
        settings.progress_every = 0;
    });

    let report = engine
        .fetch_all(vec![target(&server, "B000000001")], &cookies())
        .await;
    assert_eq!(report.succeeded, 1);
}

fn cookies_map() -> BTreeMap<String, String> {
    let mut cookies = BTreeMap::new();
    cookies.insert("session-id".to_string(), "123".to_string());
    cookies
}
