//! Review crawler runs over the blocking worker pool

use crate::common::*;
use asin_harvester::crawler::run_reviews;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer};

fn listing(count: &str) -> String {
    format!(
        r#"<html><body>
        <div data-hook="cr-filter-info-review-rating-count">{} total ratings, {} with reviews</div>
        <div id="cm_cr-review_list"><div data-hook="review">Does what it says</div></div>
        <footer>{}</footer>
        </body></html>"#,
        count, count, FOOTER
    )
}

async fn mount_listing(server: &MockServer, asin: &str, page: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(format!("/product-reviews/{}/", asin)))
        .and(query_param("pageNumber", page))
        .respond_with(html(body))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reviews_are_stored_and_blocked_asins_escalated() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_listing(&server, "B000000001", "1", listing("15")).await;
    mount_listing(&server, "B000000001", "2", listing("15")).await;
    Mock::given(method("GET"))
        .and(path("/product-reviews/B000000002/"))
        .respond_with(html(
            "<html><title>Sorry! Something went wrong!</title></html>".to_string(),
        ))
        .mount(&server)
        .await;

    let config = test_config(&server.uri(), dir.path());
    let report = run_reviews(
        &config,
        vec!["B000000001".to_string(), "B000000002".to_string()],
        RUNDATE,
    )
    .await
    .unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(report.escalated, vec!["B000000002".to_string()]);
    assert!(report.session_replacements >= 2);

    let raw = dir.path().join("reviews/raw/2026/10/19");
    assert!(raw.join("B000000001-p1.html").exists());
    assert!(raw.join("B000000001-p2.html").exists());
    assert!(!raw.join("B000000002-p1.html").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_run_skips_crawled_asins() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_listing(&server, "B000000001", "1", listing("3")).await;

    let config = test_config(&server.uri(), dir.path());
    let first = run_reviews(&config, vec!["B000000001".to_string()], RUNDATE)
        .await
        .unwrap();
    assert_eq!(first.completed, 1);

    let second = run_reviews(&config, vec!["B000000001".to_string()], RUNDATE)
        .await
        .unwrap();
    assert_eq!(second.already_crawled, 1);
    assert_eq!(second.completed, 0);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_review_captcha_is_answered_in_session() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_listing(&server, "B000000003", "1", challenge_page()).await;
    Mock::given(method("GET"))
        .and(path("/errors/validateCaptcha"))
        .and(query_param("amzn", "token-a"))
        .respond_with(html(listing("4")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri(), dir.path());
    // echo hands back the image URL as the answer
    config.captcha.command = vec!["echo".to_string()];
    config.reviews.max_session_resets = 0;

    let report = run_reviews(&config, vec!["B000000003".to_string()], RUNDATE)
        .await
        .unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(report.session_replacements, 0);
    assert!(dir
        .path()
        .join("reviews/raw/2026/10/19/B000000003-p1.html")
        .exists());
}
