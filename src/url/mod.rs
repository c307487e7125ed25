//! URL handling for product and review pages
//!
//! This module knows the supported marketplaces, builds the product and
//! review URLs the harvester requests, and recovers ASINs from URLs and
//! input lists.

mod market;

pub use market::{Market, MARKETS};

use crate::{HarvestError, Result};
use url::Url;

/// Star filters used when a product has more review pages than one listing shows
pub const STAR_FILTERS: [&str; 5] = ["one_star", "two_star", "three_star", "four_star", "five_star"];

/// Returns true if the string looks like an ASIN (10 upper-case alphanumerics)
pub fn is_valid_asin(asin: &str) -> bool {
    asin.len() == 10
        && asin
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
}

/// Normalizes user input into an ASIN
///
/// # Examples
///
/// ```
/// use asin_harvester::url::normalize_asin;
///
/// assert_eq!(normalize_asin(" b08zn6fywn ").unwrap(), "B08ZN6FYWN");
/// assert!(normalize_asin("not-an-asin").is_err());
/// ```
pub fn normalize_asin(raw: &str) -> Result<String> {
    let asin = raw.trim().to_ascii_uppercase();
    if is_valid_asin(&asin) {
        Ok(asin)
    } else {
        Err(HarvestError::InvalidAsin(raw.trim().to_string()))
    }
}

/// Product detail URL for an ASIN
pub fn product_url(base_url: &str, asin: &str) -> String {
    format!("{}/dp/{}?th=1", base_url.trim_end_matches('/'), asin)
}

/// Review listing URL for an ASIN, optionally filtered by star rating
pub fn review_url(base_url: &str, asin: &str, page: u32, star: Option<&str>) -> String {
    let mut url = format!(
        "{}/product-reviews/{}/?pageNumber={}",
        base_url.trim_end_matches('/'),
        asin,
        page
    );
    if let Some(star) = star {
        url.push_str("&filterByStar=");
        url.push_str(star);
    }
    url
}

/// Extracts the ASIN from a product (`/dp/<asin>`) or review
/// (`/product-reviews/<asin>`) URL
pub fn extract_asin(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == "dp" || segment == "product-reviews" {
            return segments
                .next()
                .filter(|s| is_valid_asin(s))
                .map(|s| s.to_string());
        }
    }
    None
}

/// Origin (`scheme://host[:port]`) of a URL, used for follow-up requests
/// such as the CAPTCHA validation form
pub fn origin(url: &str) -> Result<String> {
    let parsed = Url::parse(url)?;
    Ok(parsed.origin().ascii_serialization())
}

/// Parses an ASIN list: first column of each line, optional `asin` header,
/// blank lines and `#` comments skipped, duplicates dropped in order
pub fn parse_asin_list(content: &str) -> Result<Vec<String>> {
    let mut seen = std::collections::HashSet::new();
    let mut asins = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let first = line.split(',').next().unwrap_or("").trim().trim_matches('"');
        if first.eq_ignore_ascii_case("asin") {
            continue;
        }
        let asin = normalize_asin(first)?;
        if seen.insert(asin.clone()) {
            asins.push(asin);
        }
    }

    Ok(asins)
}
