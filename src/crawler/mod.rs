//! Crawler module for fetching and judging Amazon pages
//!
//! This module contains the core harvesting logic, including:
//! - The global rate limiter and per-attempt HTTP fetching
//! - Response classification by ordered rules
//! - The concurrent fetch engine and the bounded retry loop
//! - Overall run coordination
//! - The review crawler on its session-owning worker pool

mod classifier;
mod coordinator;
mod engine;
mod fetcher;
mod limiter;
mod reviews;
mod scheduler;
mod worker_pool;

pub use classifier::{default_rules, review_rules, Context, Page, ResponseClassifier, Rule};
pub use coordinator::{build_engine, resolve_base_url, resolve_market, run_harvest, Harvester};
pub use engine::{EngineSettings, FetchEngine, RoundReport, SessionRounds};
pub use fetcher::{
    build_blocking_client, build_http_client, fetch_page, fetch_page_blocking, FetchedPage,
};
pub use limiter::RateLimiter;
pub use reviews::{
    page_count, page_id, review_count, run_reviews, variations, HttpSession, HttpSessionFactory,
    PageSource, ReviewCrawler, MAX_LISTING_PAGES, REVIEW_DATASET, REVIEW_LIST_SELECTOR,
    VARIATION_SPLIT,
};
pub use scheduler::{RetryOutcome, RetryScheduler, RoundRunner};
pub use worker_pool::{PoolReport, SessionFactory, SessionSlot, WorkerPool};
