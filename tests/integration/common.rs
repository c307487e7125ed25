use asin_harvester::config::Config;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const RUNDATE: &str = "2026/10/19";
pub const FOOTER: &str = "© 1996-2026, Amazon.com, Inc. or its affiliates";

/// A configuration pointed at `base_url`, writing under `out`
pub fn test_config(base_url: &str, out: &Path) -> Config {
    toml::from_str(&format!(
        r#"
        [engine]
        rate-per-second = 1000.0
        concurrency = 4
        timeout-secs = 5
        backoff-ms = 1
        max-inner-attempts = 2
        stagnation-cap = 3

        [market]
        country = "USA"
        zipcode = "10001"
        base-url = "{}"

        [target]
        info-type = "asin_info"
        expected-content = "div#productDetails_feature_div"

        [session.cookies]
        session-id = "123"

        [output]
        path = "{}"

        [reviews]
        workers = 2
        max-session-resets = 1
        "#,
        base_url,
        out.display()
    ))
    .expect("test config parses")
}

pub fn product_page(asin: &str, zipcode: &str) -> String {
    format!(
        r#"<html><head><title>Product {asin}</title></head><body>
        <span id="glow-ingress-line2">New York {zipcode}</span>
        <div id="productDetails_feature_div"><table><tr><td>ASIN</td><td>{asin}</td></tr></table></div>
        <footer>{FOOTER}</footer>
        </body></html>"#
    )
}

/// Genuine page missing the expected details block
pub fn bare_page() -> String {
    format!(
        r#"<html><body><span id="glow-ingress-line2">New York 10001</span>
        <div id="dp">Nothing here</div><footer>{FOOTER}</footer></body></html>"#
    )
}

pub fn not_found_page() -> String {
    "<html><body>Sorry! We couldn't find that page. Try searching or go to Amazon's home page.</body></html>"
        .to_string()
}

pub fn challenge_page() -> String {
    r#"<html><body>
    <h4>Type the characters you see in this image:</h4>
    <form method="get" action="/errors/validateCaptcha">
        <input type="hidden" name="amzn" value="token-a">
        <input type="hidden" name="amzn-r" value="/dp/B000000001">
        <img src="https://images-na.ssl-images-amazon.com/captcha/abc/Captcha_x.jpg">
        <input type="text" name="field-keywords">
    </form></body></html>"#
        .to_string()
}

pub async fn mount_product(server: &MockServer, asin: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/dp/{}", asin)))
        .respond_with(template)
        .mount(server)
        .await;
}

pub fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

pub fn unavailable() -> ResponseTemplate {
    ResponseTemplate::new(503).set_body_string("503 - Service Unavailable Error")
}
