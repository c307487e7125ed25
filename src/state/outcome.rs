//! Fetch targets, classifier verdicts and per-attempt outcomes

use crate::url::{product_url, Market};
use std::fmt;

/// Browser-like headers sent with every product request
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    ),
    ("accept-language", "en-US,en;q=0.9"),
    ("cache-control", "no-cache"),
    ("upgrade-insecure-requests", "1"),
];

/// One unit of work: a URL to GET on behalf of an identifier
///
/// Targets are immutable. A failed attempt re-enqueues a clone, never the
/// in-flight value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    /// The ASIN this request is for
    pub identifier: String,

    pub url: String,

    /// Extra query parameters appended to `url`
    pub query: Vec<(String, String)>,

    pub headers: Vec<(String, String)>,
}

impl FetchTarget {
    pub fn new(identifier: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            url: url.into(),
            query: Vec::new(),
            headers: DEFAULT_HEADERS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Product page target for an ASIN in a market
    pub fn for_asin(market: &Market, asin: &str) -> Self {
        Self::new(asin, product_url(&market.base_url(), asin))
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Why a page was judged a transient failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoftFailure {
    /// The GET failed at the transport level
    Transport,
    /// A CAPTCHA challenge survived one solve attempt
    CaptchaPersisted,
    SomethingWentWrong,
    ServiceUnavailable,
    SignIn,
    /// A decoy page or a page without the genuine footer
    Navigated,
    /// The displayed delivery location is not the expected postal code
    LocationMismatch,
    /// The delivery location element is missing entirely
    LocationMissing,
    /// The page shows a different identifier than the one requested
    Redirected,
    /// The page could not be written to storage
    PersistFailed,
    /// Unexpected errors kept recurring past the in-place attempt cap
    Exhausted,
}

impl SoftFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::CaptchaPersisted => "captcha_persisted",
            Self::SomethingWentWrong => "something_went_wrong",
            Self::ServiceUnavailable => "service_unavailable",
            Self::SignIn => "sign_in",
            Self::Navigated => "navigated",
            Self::LocationMismatch => "location_mismatch",
            Self::LocationMissing => "location_missing",
            Self::Redirected => "redirected",
            Self::PersistFailed => "persist_failed",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for SoftFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier result for one response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Genuine page with the expected content; `detail` is the matched
    /// element's markup
    Success { detail: String },
    /// Genuine page that lacks the expected content
    Invalid,
    /// The body is a CAPTCHA challenge
    CaptchaChallenge,
    Retryable(SoftFailure),
    /// Terminal: the product does not exist
    Dropped,
}

impl Verdict {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Invalid => "invalid",
            Self::CaptchaChallenge => "captcha",
            Self::Retryable(reason) => reason.as_str(),
            Self::Dropped => "dropped",
        }
    }

    /// Hard blocks replace a browser session rather than move on
    ///
    /// Callers answer a [`Verdict::CaptchaChallenge`] once before asking;
    /// a challenge seen here has outlived its solve.
    pub fn is_block(&self) -> bool {
        matches!(self, Self::CaptchaChallenge | Self::Retryable(_))
    }
}

/// What one attempt produced for one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Persisted as a valid page
    Success { identifier: String, body: String },
    /// Persisted, but flagged as structurally unexpected
    Invalid { identifier: String, body: String },
    /// Transient failure; the target goes back on the retry queue
    Retryable { target: FetchTarget, reason: SoftFailure },
    /// Terminal failure; discarded
    Dropped { identifier: String },
}

impl FetchOutcome {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Success { identifier, .. }
            | Self::Invalid { identifier, .. }
            | Self::Dropped { identifier } => identifier,
            Self::Retryable { target, .. } => &target.identifier,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}
