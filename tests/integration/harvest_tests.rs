//! End-to-end harvest runs built from configuration

use crate::common::*;
use asin_harvester::config::OutputBackend;
use asin_harvester::crawler::run_harvest;
use asin_harvester::storage::SqliteExporter;
use asin_harvester::HarvestError;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer};

fn asins(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_harvest_stores_page_with_session_cookies() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/dp/B000000001"))
        .and(header("cookie", "session-id=123"))
        .respond_with(html(product_page("B000000001", "10001")))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server.uri(), dir.path());
    let report = run_harvest(&config, asins(&["B000000001"]), RUNDATE)
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.rounds, 1);
    assert_eq!(report.counters.succeeded, 1);
    let stored = std::fs::read_to_string(dir.path().join("asin_info/raw/2026/10/19/B000000001.html"))
        .unwrap();
    assert!(stored.contains("productDetails_feature_div"));
}

#[tokio::test]
async fn test_transient_503_recovers_next_round() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/dp/B000000001"))
        .respond_with(unavailable())
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_product(&server, "B000000001", html(product_page("B000000001", "10001"))).await;

    let config = test_config(&server.uri(), dir.path());
    let report = run_harvest(&config, asins(&["B000000001"]), RUNDATE)
        .await
        .unwrap();

    assert_eq!(report.rounds, 2);
    assert_eq!(report.counters.succeeded, 1);
    assert_eq!(report.counters.retried, 1);
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_stuck_asins_escalate_after_three_rounds() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_product(&server, "B000000001", html(product_page("B000000001", "10001"))).await;
    Mock::given(method("GET"))
        .and(path("/dp/B000000002"))
        .respond_with(unavailable())
        .expect(4)
        .mount(&server)
        .await;

    let config = test_config(&server.uri(), dir.path());
    let report = run_harvest(&config, asins(&["B000000001", "B000000002"]), RUNDATE)
        .await
        .unwrap();

    // round 1 shrinks the queue, rounds 2-4 are stuck
    assert_eq!(report.rounds, 4);
    assert_eq!(report.escalated, asins(&["B000000002"]));
    assert_eq!(report.counters.succeeded, 1);
}

#[tokio::test]
async fn test_not_found_is_dropped_not_escalated() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_product(&server, "B000000001", html(not_found_page())).await;

    let config = test_config(&server.uri(), dir.path());
    let report = run_harvest(&config, asins(&["B000000001"]), RUNDATE)
        .await
        .unwrap();

    assert_eq!(report.counters.dropped, 1);
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_already_fetched_asins_are_skipped() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let raw = dir.path().join("asin_info/raw/2026/10/19");
    std::fs::create_dir_all(&raw).unwrap();
    std::fs::write(raw.join("B000000001.html"), "<html></html>").unwrap();

    Mock::given(method("GET"))
        .and(path("/dp/B000000001"))
        .respond_with(html(product_page("B000000001", "10001")))
        .expect(0)
        .mount(&server)
        .await;
    mount_product(&server, "B000000002", html(product_page("B000000002", "10001"))).await;

    let config = test_config(&server.uri(), dir.path());
    let report = run_harvest(&config, asins(&["B000000001", "B000000002"]), RUNDATE)
        .await
        .unwrap();

    assert_eq!(report.already_fetched, 1);
    assert_eq!(report.counters.requests_issued, 1);
    assert_eq!(report.counters.succeeded, 1);
}

#[tokio::test]
async fn test_detail_batches_are_exported() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let list = asins(&["B000000001", "B000000002", "B000000003"]);
    for asin in &list {
        mount_product(&server, asin, html(product_page(asin, "10001"))).await;
    }

    let mut config = test_config(&server.uri(), dir.path());
    config.target.export_details = true;
    config.target.batch_size = 2;
    let report = run_harvest(&config, list, RUNDATE).await.unwrap();

    // one full batch plus the remainder flushed at shutdown
    assert_eq!(report.batches_written, 2);
    let conformed = dir.path().join("asin_info/conformed/2026/10/19");
    let mut rows = 0;
    for entry in std::fs::read_dir(&conformed).unwrap() {
        let mut reader = csv::Reader::from_path(entry.unwrap().path()).unwrap();
        assert_eq!(
            reader.headers().unwrap().iter().collect::<Vec<_>>(),
            vec!["asin", "asin_info"]
        );
        rows += reader.records().count();
    }
    assert_eq!(rows, 3);
}

#[tokio::test]
async fn test_sqlite_backend_stores_pages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_product(&server, "B000000001", html(product_page("B000000001", "10001"))).await;
    mount_product(&server, "B000000002", html(bare_page())).await;

    let db_path = dir.path().join("harvest.db");
    let mut config = test_config(&server.uri(), dir.path());
    config.output.backend = OutputBackend::Sqlite;
    config.output.path = db_path.display().to_string();

    let report = run_harvest(&config, asins(&["B000000001", "B000000002"]), RUNDATE)
        .await
        .unwrap();
    assert_eq!(report.counters.succeeded, 1);
    assert_eq!(report.counters.invalid, 1);

    let exporter = SqliteExporter::new(&db_path).unwrap();
    let body = exporter
        .raw_body("asin_info", RUNDATE, "B000000001")
        .unwrap()
        .unwrap();
    assert!(body.contains("productDetails_feature_div"));
}

#[tokio::test]
async fn test_missing_cookies_abort_the_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .respond_with(html(product_page("B000000001", "10001")))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri(), dir.path());
    config.session.cookies.clear();
    let err = run_harvest(&config, asins(&["B000000001"]), RUNDATE)
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Cookies(_)));
}
