//! Review listing crawler
//!
//! Reviews are crawled per ASIN on a [`WorkerPool`]: each worker keeps one
//! blocking HTTP session pinned to a single egress, and swaps it for a fresh
//! one whenever the storefront blocks it. A CAPTCHA is answered once through
//! the session before it counts as a block.
//!
//! A product with fewer than ten listing pages is walked page by page. A
//! larger one is split: by variation when the product page names between
//! five and fifteen of them, otherwise by star filter, ten pages each.
//! Listing page 1 is stored last and marks the ASIN as crawled for the run.

use crate::config::Config;
use crate::crawler::classifier::{review_rules, ResponseClassifier};
use crate::crawler::coordinator::{resolve_base_url, resolve_market};
use crate::crawler::fetcher::{build_blocking_client, fetch_page_blocking, FetchedPage};
use crate::crawler::worker_pool::{SessionFactory, SessionSlot, WorkerPool};
use crate::output::ReviewReport;
use crate::session::{
    solver_from_config, CaptchaOracle, CookieProvider, CookieSet, Egress, FormCaptchaSolver,
    ProxyPool, StaticCookieProvider,
};
use crate::state::{SoftFailure, Verdict};
use crate::storage::{open_exporter, put_raw_with_retry, Exporter, PageCategory, RawKey};
use crate::url::{extract_asin, is_valid_asin, product_url, review_url, STAR_FILTERS};
use crate::{HarvestError, Result};
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::runtime::Handle;
use url::Url;

/// Storage prefix for review pages
pub const REVIEW_DATASET: &str = "reviews";

/// Reviews shown per listing page
pub const REVIEWS_PER_PAGE: u64 = 10;

/// Listing pages reachable per filter
pub const MAX_LISTING_PAGES: u32 = 10;

/// Variation counts, parent included, that split a listing by variation
pub const VARIATION_SPLIT: RangeInclusive<usize> = 5..=15;

/// Present on every genuine review listing
pub const REVIEW_LIST_SELECTOR: &str = "#cm_cr-review_list";

static REVIEW_COUNT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"[data-hook="cr-filter-info-review-rating-count"]"#).unwrap()
});

/// Anything that can load a URL inside one session
pub trait PageSource {
    fn load(&mut self, url: &str) -> Result<FetchedPage>;

    /// Answers the CAPTCHA in `challenge` and returns the page served after it
    fn solve_captcha(&mut self, challenge: &FetchedPage) -> Result<FetchedPage>;
}

/// A blocking client bound to one proxy, identity and cookie jar
#[derive(Debug)]
pub struct HttpSession<O> {
    client: reqwest::blocking::Client,
    egress: Egress,
    solver: Arc<FormCaptchaSolver<O>>,
    runtime: Handle,
}

impl<O> HttpSession<O> {
    pub fn egress(&self) -> &Egress {
        &self.egress
    }
}

impl<O: CaptchaOracle> PageSource for HttpSession<O> {
    fn load(&mut self, url: &str) -> Result<FetchedPage> {
        fetch_page_blocking(&self.client, url)
    }

    fn solve_captcha(&mut self, challenge: &FetchedPage) -> Result<FetchedPage> {
        let body = self.solver.solve_blocking(
            &self.runtime,
            &self.client,
            &challenge.final_url,
            &challenge.body,
        )?;
        Ok(FetchedPage {
            final_url: challenge.final_url.clone(),
            status: 200,
            body,
        })
    }
}

/// Builds [`HttpSession`]s from the proxy pool and the run's cookies
#[derive(Debug, Clone)]
pub struct HttpSessionFactory<O> {
    proxies: ProxyPool,
    cookies: CookieSet,
    timeout: Duration,
    solver: Arc<FormCaptchaSolver<O>>,
    runtime: Handle,
}

impl<O: CaptchaOracle> HttpSessionFactory<O> {
    /// `runtime` drives the CAPTCHA oracle from the worker threads
    pub fn new(
        proxies: ProxyPool,
        cookies: CookieSet,
        timeout: Duration,
        solver: FormCaptchaSolver<O>,
        runtime: Handle,
    ) -> Self {
        Self {
            proxies,
            cookies,
            timeout,
            solver: Arc::new(solver),
            runtime,
        }
    }
}

impl<O: CaptchaOracle> SessionFactory for HttpSessionFactory<O> {
    type Session = HttpSession<O>;

    fn create(&self, worker: usize) -> Result<HttpSession<O>> {
        let egress = self.proxies.next();
        tracing::debug!(
            "Worker {} session via {} as {}",
            worker,
            egress.proxy.as_deref().unwrap_or("direct"),
            egress.identity.name
        );
        Ok(HttpSession {
            client: build_blocking_client(&egress, &self.cookies, self.timeout)?,
            egress,
            solver: Arc::clone(&self.solver),
            runtime: self.runtime.clone(),
        })
    }
}

/// Review count shown on a listing, if any
///
/// The count element reads like `"1,234 total ratings, 567 with reviews"`;
/// the last number is the review count.
pub fn review_count(body: &str) -> Option<u64> {
    let document = Html::parse_document(body);
    let text: String = document.select(&REVIEW_COUNT).next()?.text().collect();
    text.split(|c: char| !(c.is_ascii_digit() || c == ',' || c == '.'))
        .filter(|token| token.chars().any(|c| c.is_ascii_digit()))
        .last()
        .and_then(|token| token.replace([',', '.'], "").parse().ok())
}

/// Listing pages needed for `count` reviews
pub fn page_count(count: Option<u64>) -> u32 {
    count
        .map(|n| n.div_ceil(REVIEWS_PER_PAGE))
        .map(|pages| u32::try_from(pages).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

/// Storage identifier for one listing page
///
/// `filters` narrow the listing, outermost first: a variation ASIN, a star
/// filter, or both.
pub fn page_id(asin: &str, filters: &[&str], page: u32) -> String {
    let mut id = asin.to_string();
    for filter in filters {
        id.push('-');
        id.push_str(filter);
    }
    format!("{}-p{}", id, page)
}

/// Text following `"key" :` in an inline script
fn script_value<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    let quoted = format!("\"{}\"", key);
    let rest = &body[body.find(&quoted)? + quoted.len()..];
    Some(rest.trim_start().strip_prefix(':')?.trim_start())
}

/// The balanced `{..}` object at the start of `text`
fn json_object(text: &str) -> Option<&str> {
    if !text.starts_with('{') {
        return None;
    }
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Variation ASINs named on a product page, parent last
///
/// `None` unless the page carries both the `dimensionToAsinMap` object and a
/// `parentAsin`.
pub fn variations(body: &str) -> Option<Vec<String>> {
    let map = json_object(script_value(body, "dimensionToAsinMap")?)?;
    let map: BTreeMap<String, String> = serde_json::from_str(map).ok()?;
    let parent = script_value(body, "parentAsin")?.strip_prefix('"')?;
    let parent = parent.split('"').next()?;

    let mut asins: Vec<String> = Vec::with_capacity(map.len() + 1);
    for asin in map.into_values().chain(std::iter::once(parent.to_string())) {
        if is_valid_asin(&asin) && !asins.contains(&asin) {
            asins.push(asin);
        }
    }
    Some(asins)
}

/// One review listing, optionally narrowed to a variation's own reviews or
/// to a star rating
#[derive(Debug, Clone, Copy)]
struct Listing<'a> {
    /// ASIN in the listing URL
    asin: &'a str,
    /// Only reviews of `asin` itself, not its siblings
    variation: bool,
    star: Option<&'a str>,
}

impl<'a> Listing<'a> {
    fn plain(asin: &'a str) -> Self {
        Self {
            asin,
            variation: false,
            star: None,
        }
    }

    fn variation(asin: &'a str) -> Self {
        Self {
            asin,
            variation: true,
            star: None,
        }
    }

    fn with_star(self, star: &'a str) -> Self {
        Self {
            star: Some(star),
            ..self
        }
    }

    fn url(&self, base_url: &str, page: u32) -> String {
        let mut url = review_url(base_url, self.asin, page, self.star);
        if self.variation {
            url.push_str("&formatType=current_format");
        }
        url
    }

    /// Identifier of `page`, filed under the requested ASIN `owner`
    fn page_id(&self, owner: &str, page: u32) -> String {
        let mut filters = Vec::with_capacity(2);
        if self.variation {
            filters.push(self.asin);
        }
        filters.extend(self.star);
        page_id(owner, &filters, page)
    }
}

/// Crawls review listings for many ASINs
pub struct ReviewCrawler {
    base_url: String,
    classifier: ResponseClassifier,
    exporter: Arc<dyn Exporter>,
    rundate: String,
    max_session_resets: u32,
}

impl ReviewCrawler {
    pub fn new(
        base_url: impl Into<String>,
        classifier: ResponseClassifier,
        exporter: Arc<dyn Exporter>,
        rundate: impl Into<String>,
        max_session_resets: u32,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            classifier: classifier.with_rules(review_rules()),
            exporter,
            rundate: rundate.into(),
            max_session_resets,
        }
    }

    /// Crawls every ASIN not already marked as crawled for this run date
    pub fn crawl<F>(&self, factory: &F, pool: &WorkerPool, asins: Vec<String>) -> Result<ReviewReport>
    where
        F: SessionFactory,
        F::Session: PageSource,
    {
        let requested = asins.len();
        let stored = self.exporter.fetched(REVIEW_DATASET, &self.rundate)?;
        let pending: Vec<String> = asins
            .into_iter()
            .filter(|asin| !stored.contains(&page_id(asin, &[], 1)))
            .collect();
        let already_crawled = requested - pending.len();
        if already_crawled > 0 {
            tracing::info!("Skipping {} ASINs with reviews already stored", already_crawled);
        }

        let report = pool.run(factory, pending, |slot, asin| self.crawl_asin(slot, asin));

        Ok(ReviewReport {
            rundate: self.rundate.clone(),
            requested,
            already_crawled,
            completed: report.completed,
            resubmitted: report.resubmitted,
            session_replacements: report.session_replacements,
            escalated: report.escalated,
        })
    }

    /// Crawls every listing page of one ASIN
    pub fn crawl_asin<F>(&self, slot: &mut SessionSlot<'_, F>, asin: &str) -> Result<()>
    where
        F: SessionFactory,
        F::Session: PageSource,
    {
        let first_url = Listing::plain(asin).url(&self.base_url, 1);
        let (first, first_verdict) = self.load(slot, asin, &first_url)?;
        if first_verdict == Verdict::Dropped {
            tracing::info!("{}: no review listing, dropping", asin);
            return Ok(());
        }

        let listed = match Url::parse(&first.final_url).ok().and_then(|u| extract_asin(&u)) {
            Some(redirected) if redirected != asin => {
                tracing::info!("{}: reviews redirected to {}", asin, redirected);
                redirected
            }
            _ => asin.to_string(),
        };
        let listing = Listing::plain(&listed);

        let pages = page_count(review_count(&first.body));
        tracing::debug!("{}: {} listing pages", asin, pages);

        if pages < MAX_LISTING_PAGES {
            self.crawl_pages(slot, asin, listing, 2..=pages)?;
        } else {
            match self.variations(slot, asin)? {
                Some(members) if VARIATION_SPLIT.contains(&members.len()) => {
                    tracing::info!("{}: splitting by {} variations", asin, members.len());
                    for member in &members {
                        self.crawl_variation(slot, asin, member)?;
                    }
                }
                members => {
                    tracing::info!(
                        "{}: splitting by star ({} variations)",
                        asin,
                        members.map_or(0, |m| m.len())
                    );
                    self.crawl_stars(slot, asin, listing)?;
                }
            }
        }

        self.store(asin, &page_id(asin, &[], 1), &first_verdict, &first.body)
    }

    /// Variation ASINs from the product page, if it lists any
    fn variations<F>(&self, slot: &mut SessionSlot<'_, F>, asin: &str) -> Result<Option<Vec<String>>>
    where
        F: SessionFactory,
        F::Session: PageSource,
    {
        let (page, verdict) = self.load(slot, asin, &product_url(&self.base_url, asin))?;
        if verdict == Verdict::Dropped {
            return Ok(None);
        }
        Ok(variations(&page.body))
    }

    /// One variation's own reviews: page by page when short, per star otherwise
    fn crawl_variation<F>(&self, slot: &mut SessionSlot<'_, F>, asin: &str, member: &str) -> Result<()>
    where
        F: SessionFactory,
        F::Session: PageSource,
    {
        let listing = Listing::variation(member);
        let Some(first) = self.crawl_page(slot, asin, listing, 1)? else {
            return Ok(());
        };
        let pages = page_count(review_count(&first.body));
        tracing::debug!("{}: variation {} has {} listing pages", asin, member, pages);
        if pages < MAX_LISTING_PAGES {
            self.crawl_pages(slot, asin, listing, 2..=pages)
        } else {
            self.crawl_stars(slot, asin, listing)
        }
    }

    fn crawl_stars<F>(&self, slot: &mut SessionSlot<'_, F>, asin: &str, listing: Listing<'_>) -> Result<()>
    where
        F: SessionFactory,
        F::Session: PageSource,
    {
        for star in STAR_FILTERS {
            self.crawl_filtered(slot, asin, listing.with_star(star))?;
        }
        Ok(())
    }

    /// Walks one filtered listing; its own first page says how deep to go
    fn crawl_filtered<F>(&self, slot: &mut SessionSlot<'_, F>, asin: &str, listing: Listing<'_>) -> Result<()>
    where
        F: SessionFactory,
        F::Session: PageSource,
    {
        let Some(first) = self.crawl_page(slot, asin, listing, 1)? else {
            return Ok(());
        };
        let pages = page_count(review_count(&first.body)).min(MAX_LISTING_PAGES);
        self.crawl_pages(slot, asin, listing, 2..=pages)
    }

    fn crawl_pages<F>(
        &self,
        slot: &mut SessionSlot<'_, F>,
        asin: &str,
        listing: Listing<'_>,
        pages: RangeInclusive<u32>,
    ) -> Result<()>
    where
        F: SessionFactory,
        F::Session: PageSource,
    {
        for page in pages {
            self.crawl_page(slot, asin, listing, page)?;
        }
        Ok(())
    }

    /// Loads and stores one listing page; `None` when the page does not exist
    fn crawl_page<F>(
        &self,
        slot: &mut SessionSlot<'_, F>,
        asin: &str,
        listing: Listing<'_>,
        page: u32,
    ) -> Result<Option<FetchedPage>>
    where
        F: SessionFactory,
        F::Session: PageSource,
    {
        let url = listing.url(&self.base_url, page);
        let (fetched, verdict) = self.load(slot, asin, &url)?;
        if verdict == Verdict::Dropped {
            tracing::debug!("{}: {} not found", asin, url);
            return Ok(None);
        }
        self.store(asin, &listing.page_id(asin, page), &verdict, &fetched.body)?;
        Ok(Some(fetched))
    }

    /// Loads a page, answering one CAPTCHA per load and replacing the session
    /// while the storefront blocks it
    fn load<F>(
        &self,
        slot: &mut SessionSlot<'_, F>,
        asin: &str,
        url: &str,
    ) -> Result<(FetchedPage, Verdict)>
    where
        F: SessionFactory,
        F::Session: PageSource,
    {
        let mut resets = 0;
        loop {
            let session = slot.get()?;
            let mut page = session.load(url)?;
            let mut verdict = self.classifier.classify(asin, page.status, &page.body);

            if verdict == Verdict::CaptchaChallenge {
                tracing::debug!("{}: CAPTCHA challenge on {}", asin, url);
                verdict = match session.solve_captcha(&page) {
                    Ok(solved) => {
                        let verdict = match self.classifier.classify(asin, solved.status, &solved.body) {
                            Verdict::CaptchaChallenge => Verdict::Retryable(SoftFailure::CaptchaPersisted),
                            verdict => verdict,
                        };
                        page = solved;
                        verdict
                    }
                    Err(e) => {
                        tracing::warn!("{}: CAPTCHA solve failed on {}: {}", asin, url, e);
                        Verdict::Retryable(SoftFailure::CaptchaPersisted)
                    }
                };
            }

            if !verdict.is_block() {
                return Ok((page, verdict));
            }
            if resets >= self.max_session_resets {
                return Err(HarvestError::Blocked {
                    url: url.to_string(),
                    reason: verdict.label().to_string(),
                });
            }
            resets += 1;
            tracing::warn!(
                "Worker {} blocked on {} ({}), new session {}/{}",
                slot.worker(),
                url,
                verdict.label(),
                resets,
                self.max_session_resets
            );
            slot.replace()?;
        }
    }

    fn store(&self, asin: &str, identifier: &str, verdict: &Verdict, body: &str) -> Result<()> {
        let category = match verdict {
            Verdict::Success { .. } => PageCategory::Valid,
            _ => {
                tracing::debug!("{}: {} has no review list", asin, identifier);
                PageCategory::Invalid
            }
        };
        let key = RawKey::new(REVIEW_DATASET, &self.rundate, category, identifier);
        put_raw_with_retry(self.exporter.as_ref(), &key, body)?;
        Ok(())
    }
}

/// Runs a complete review crawl from a configuration
pub async fn run_reviews(config: &Config, asins: Vec<String>, rundate: &str) -> Result<ReviewReport> {
    let market = resolve_market(config)?;
    let cookies = StaticCookieProvider::from_config(&config.session)
        .acquire(&config.market.zipcode, &market)
        .await?;

    let factory = HttpSessionFactory::new(
        ProxyPool::from_config(&config.proxy)?,
        cookies,
        Duration::from_secs(config.engine.timeout_secs),
        solver_from_config(&config.captcha),
        Handle::current(),
    );
    let classifier = ResponseClassifier::new(
        REVIEW_LIST_SELECTOR,
        config.target.footer_marker.clone(),
        None,
    )?;
    let crawler = ReviewCrawler::new(
        resolve_base_url(config, &market),
        classifier,
        open_exporter(&config.output)?,
        rundate,
        config.reviews.max_session_resets,
    );
    let pool = WorkerPool::new(config.reviews.workers);
    tracing::info!(
        "Crawling reviews for {} ASINs with {} workers",
        asins.len(),
        config.reviews.workers
    );

    tokio::task::spawn_blocking(move || crawler.crawl(&factory, &pool, asins))
        .await
        .map_err(|e| HarvestError::Session(format!("review workers panicked: {}", e)))?
}
