//! Response classification
//!
//! Amazon serves most soft failures as HTTP 200, so a response is judged by
//! its body. The classifier is an ordered list of rules; the first rule that
//! returns a verdict wins. Default precedence:
//!
//! | # | rule                | match                                         | verdict                        |
//! |---|---------------------|-----------------------------------------------|--------------------------------|
//! | 0 | `captcha`           | body contains `captcha`                       | CaptchaChallenge               |
//! | 1 | `not_found`         | not-found page text                           | Dropped                        |
//! | 2 | `something_wrong`   | `Sorry! Something went wrong!`                | Retryable(SomethingWentWrong)  |
//! | 3 | `service_unavail`   | `503 - Service Unavailable Error` or 503      | Retryable(ServiceUnavailable)  |
//! | 4 | `sign_in`           | `Amazon Sign-In`                              | Retryable(SignIn)              |
//! | 5 | `navigated`         | decoy page text, or footer marker missing     | Retryable(Navigated)           |
//! | 6 | `location`          | zipcode not in delivery location (USA only)   | Retryable(LocationMismatch/Missing) |
//! | 7 | `redirected`        | requested variant present but not selected    | Retryable(Redirected)          |
//! | 8 | `expected_content`  | selector present / absent                     | Success / Invalid              |

use crate::config::{parse_selector, Config};
use crate::state::{SoftFailure, Verdict};
use crate::url::Market;
use crate::ConfigResult;
use scraper::{Html, Selector};
use std::cell::OnceCell;
use std::sync::LazyLock;

pub const NOT_FOUND_MARKER: &str =
    "Sorry! We couldn't find that page. Try searching or go to Amazon's home page.";
pub const SOMETHING_WRONG_MARKER: &str = "Sorry! Something went wrong!";
pub const SERVICE_UNAVAILABLE_MARKER: &str = "503 - Service Unavailable Error";
pub const SIGN_IN_MARKER: &str = "Amazon Sign-In";
pub const NAVIGATED_MARKER: &str = "Amazon Clinic is now Amazon One Medical";
pub const CAPTCHA_MARKER: &str = "captcha";

static LOCATION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span#glow-ingress-line2").unwrap());
static VARIANT_ITEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li[data-csa-c-item-id]").unwrap());
static SELECTED_VARIANT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span.a-button.a-button-selected.a-button-thumbnail.a-button-toggle").unwrap()
});

/// A response body, parsed on first structural look
pub struct Page<'a> {
    pub body: &'a str,
    pub status: u16,
    document: OnceCell<Html>,
}

impl<'a> Page<'a> {
    pub fn new(body: &'a str, status: u16) -> Self {
        Self {
            body,
            status,
            document: OnceCell::new(),
        }
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.body.contains(marker)
    }

    pub fn document(&self) -> &Html {
        self.document.get_or_init(|| Html::parse_document(self.body))
    }
}

/// What a rule knows besides the page itself
pub struct Context<'a> {
    /// The identifier that was requested
    pub identifier: &'a str,
    pub footer_marker: &'a str,
    /// Expected postal code; `None` disables the location rule
    pub zipcode: Option<&'a str>,
    pub expected: &'a Selector,
}

/// One (predicate, verdict) pair in the precedence list
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub check: fn(&Page<'_>, &Context<'_>) -> Option<Verdict>,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

fn captcha(page: &Page<'_>, _: &Context<'_>) -> Option<Verdict> {
    page.contains(CAPTCHA_MARKER).then_some(Verdict::CaptchaChallenge)
}

fn not_found(page: &Page<'_>, _: &Context<'_>) -> Option<Verdict> {
    page.contains(NOT_FOUND_MARKER).then_some(Verdict::Dropped)
}

fn something_wrong(page: &Page<'_>, _: &Context<'_>) -> Option<Verdict> {
    page.contains(SOMETHING_WRONG_MARKER)
        .then_some(Verdict::Retryable(SoftFailure::SomethingWentWrong))
}

fn service_unavailable(page: &Page<'_>, _: &Context<'_>) -> Option<Verdict> {
    (page.status == 503 || page.contains(SERVICE_UNAVAILABLE_MARKER))
        .then_some(Verdict::Retryable(SoftFailure::ServiceUnavailable))
}

fn sign_in(page: &Page<'_>, _: &Context<'_>) -> Option<Verdict> {
    page.contains(SIGN_IN_MARKER)
        .then_some(Verdict::Retryable(SoftFailure::SignIn))
}

fn navigated(page: &Page<'_>, ctx: &Context<'_>) -> Option<Verdict> {
    (page.contains(NAVIGATED_MARKER) || !page.contains(ctx.footer_marker))
        .then_some(Verdict::Retryable(SoftFailure::Navigated))
}

fn location(page: &Page<'_>, ctx: &Context<'_>) -> Option<Verdict> {
    let zipcode = ctx.zipcode?;
    match page.document().select(&LOCATION).next() {
        None => Some(Verdict::Retryable(SoftFailure::LocationMissing)),
        Some(element) => {
            let shown = element.text().collect::<String>();
            if shown.trim().contains(zipcode) {
                None
            } else {
                tracing::debug!(
                    "{} delivers to '{}', expected {}",
                    ctx.identifier,
                    shown.trim(),
                    zipcode
                );
                Some(Verdict::Retryable(SoftFailure::LocationMismatch))
            }
        }
    }
}

fn redirected(page: &Page<'_>, ctx: &Context<'_>) -> Option<Verdict> {
    let item = page
        .document()
        .select(&VARIANT_ITEM)
        .find(|li| li.value().attr("data-csa-c-item-id") == Some(ctx.identifier))?;
    if item.select(&SELECTED_VARIANT).next().is_some() {
        None
    } else {
        Some(Verdict::Retryable(SoftFailure::Redirected))
    }
}

fn expected_content(page: &Page<'_>, ctx: &Context<'_>) -> Option<Verdict> {
    Some(match page.document().select(ctx.expected).next() {
        Some(element) => Verdict::Success {
            detail: element.html(),
        },
        None => Verdict::Invalid,
    })
}

/// Full precedence list for product pages
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule { name: "captcha", check: captcha },
        Rule { name: "not_found", check: not_found },
        Rule { name: "something_wrong", check: something_wrong },
        Rule { name: "service_unavailable", check: service_unavailable },
        Rule { name: "sign_in", check: sign_in },
        Rule { name: "navigated", check: navigated },
        Rule { name: "location", check: location },
        Rule { name: "redirected", check: redirected },
        Rule { name: "expected_content", check: expected_content },
    ]
}

/// Reduced list for review listings: blocks and not-found only
pub fn review_rules() -> Vec<Rule> {
    vec![
        Rule { name: "captcha", check: captcha },
        Rule { name: "not_found", check: not_found },
        Rule { name: "something_wrong", check: something_wrong },
        Rule { name: "service_unavailable", check: service_unavailable },
        Rule { name: "sign_in", check: sign_in },
        Rule { name: "expected_content", check: expected_content },
    ]
}

/// Maps a response body to a [`Verdict`] by ordered rules
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    rules: Vec<Rule>,
    footer_marker: String,
    expected: Selector,
    zipcode: Option<String>,
}

impl ResponseClassifier {
    /// Classifier with the default precedence list
    pub fn new(
        expected_content: &str,
        footer_marker: impl Into<String>,
        zipcode: Option<String>,
    ) -> ConfigResult<Self> {
        Ok(Self {
            rules: default_rules(),
            footer_marker: footer_marker.into(),
            expected: parse_selector(expected_content)?,
            zipcode,
        })
    }

    /// Location checks only run in the default market, and only when enabled
    pub fn from_config(config: &Config) -> ConfigResult<Self> {
        let market = Market::from_code(&config.market.country)
            .ok_or_else(|| crate::ConfigError::UnknownMarket(config.market.country.clone()))?;
        let zipcode = (market.is_default() && config.market.verify_location)
            .then(|| config.market.zipcode.clone());
        Self::new(
            &config.target.expected_content,
            config.target.footer_marker.clone(),
            zipcode,
        )
    }

    /// Replaces the rule list
    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Applies the rules in order; a list that never decides yields `Invalid`
    pub fn classify(&self, identifier: &str, status: u16, body: &str) -> Verdict {
        let page = Page::new(body, status);
        let ctx = Context {
            identifier,
            footer_marker: &self.footer_marker,
            zipcode: self.zipcode.as_deref(),
            expected: &self.expected,
        };
        for rule in &self.rules {
            if let Some(verdict) = (rule.check)(&page, &ctx) {
                tracing::trace!("{}: rule '{}' -> {}", identifier, rule.name, verdict.label());
                return verdict;
            }
        }
        Verdict::Invalid
    }
}
