//! ASIN Harvester: an adversarial product-page fetcher
//!
//! This crate fetches product and review pages through a rate-limited,
//! proxy-rotating, CAPTCHA-solving HTTP pipeline, classifies every response
//! into success / invalid / retry / drop, and lands raw pages plus detail
//! batches in a date-partitioned store.

pub mod config;
pub mod crawler;
pub mod output;
pub mod session;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The GET itself failed: connection refused, reset, or timed out
    #[error("Request failed for {url}: {message}")]
    Request { url: String, message: String },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to read response body for {url}: {message}")]
    Body { url: String, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid ASIN: {0}")]
    InvalidAsin(String),

    #[error("Proxy error: {0}")]
    Proxy(String),

    #[error("Cookie acquisition failed: {0}")]
    Cookies(String),

    #[error("CAPTCHA solve failed: {0}")]
    Captcha(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Session blocked at {url}: {reason}")]
    Blocked { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true for the defined request error: the exchange with the
    /// target failed at the transport level and the attempt is retried
    /// through the outer retry queue rather than in place.
    pub fn is_request_error(&self) -> bool {
        matches!(self, Self::Request { .. })
    }

    /// Builds a request error from a reqwest send failure
    pub fn request(url: &str, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            err.to_string()
        };
        Self::Request {
            url: url.to_string(),
            message,
        }
    }

    /// Builds the error for a response body that could not be read
    ///
    /// A transfer that stalls past the timeout or drops mid-body is a
    /// transport failure like a failed send; only a body that arrived but
    /// could not be decoded stays a [`HarvestError::Body`].
    pub fn body(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            return Self::request(url, err);
        }
        Self::Body {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown market: {0}")]
    UnknownMarket(String),

    #[error("Invalid CSS selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{FetchEngine, Harvester, ResponseClassifier, RetryScheduler};
pub use state::{FetchOutcome, FetchTarget, Verdict};
pub use crate::url::Market;
