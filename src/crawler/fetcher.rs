//! HTTP fetcher implementation
//!
//! This module handles the HTTP side of a single attempt:
//! - Building a client pinned to one egress (proxy + browser identity) and
//!   the session cookies
//! - Sending the GET and reading the body
//! - Splitting failures into the defined request error (send or body transfer
//!   failed or timed out) and everything else

use crate::session::{CookieSet, Egress};
use crate::state::FetchTarget;
use crate::{HarvestError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::{Client, Proxy};
use std::time::Duration;

/// A response that made it back, whatever its status
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: String,

    pub status: u16,

    pub body: String,
}

/// Headers every client sends: the session cookies
fn session_headers(cookies: &CookieSet) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(value) = cookies.header_value() {
        let value = HeaderValue::from_str(&value)
            .map_err(|e| HarvestError::Session(format!("invalid cookie value: {}", e)))?;
        headers.insert(COOKIE, value);
    }
    Ok(headers)
}

/// Builds an HTTP client for one attempt
///
/// # Arguments
///
/// * `egress` - Proxy and browser identity to present
/// * `cookies` - Session cookies sent on every request
/// * `timeout` - Whole-request timeout
pub fn build_http_client(egress: &Egress, cookies: &CookieSet, timeout: Duration) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(egress.identity.user_agent)
        .default_headers(session_headers(cookies)?)
        .timeout(timeout)
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &egress.proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}

/// Blocking counterpart used by long-lived worker sessions
pub fn build_blocking_client(
    egress: &Egress,
    cookies: &CookieSet,
    timeout: Duration,
) -> Result<reqwest::blocking::Client> {
    let mut builder = reqwest::blocking::Client::builder()
        .user_agent(egress.identity.user_agent)
        .default_headers(session_headers(cookies)?)
        .timeout(timeout)
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &egress.proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}

fn target_headers(target: &FetchTarget) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &target.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}

/// Sends the GET for a target and reads the body
///
/// # Returns
///
/// * `Ok(FetchedPage)` - Any status; classification happens on the body
/// * `Err(HarvestError::Request)` - Connection failure or timeout, including
///   a body transfer that stalls or drops
/// * `Err(HarvestError::Body)` - The body arrived but could not be decoded
pub async fn fetch_page(client: &Client, target: &FetchTarget) -> Result<FetchedPage> {
    let response = client
        .get(&target.url)
        .query(&target.query)
        .headers(target_headers(target))
        .send()
        .await
        .map_err(|e| HarvestError::request(&target.url, &e))?;

    let status = response.status().as_u16();
    let final_url = response.url().to_string();

    let body = response
        .text()
        .await
        .map_err(|e| HarvestError::body(&target.url, &e))?;

    Ok(FetchedPage {
        final_url,
        status,
        body,
    })
}

/// Blocking GET of a plain URL
pub fn fetch_page_blocking(client: &reqwest::blocking::Client, url: &str) -> Result<FetchedPage> {
    let response = client
        .get(url)
        .send()
        .map_err(|e| HarvestError::request(url, &e))?;

    let status = response.status().as_u16();
    let final_url = response.url().to_string();

    let body = response.text().map_err(|e| HarvestError::body(url, &e))?;

    Ok(FetchedPage {
        final_url,
        status,
        body,
    })
}
