//! Harvest coordinator - top-level run orchestration
//!
//! A run:
//! 1. Acquires the geotargeted session (failure aborts the run)
//! 2. Drops identifiers the run already stored
//! 3. Drives the fetch engine through the retry loop
//! 4. Flushes the last detail batch
//! 5. Reports invalid pages and the escalated residue

use crate::config::Config;
use crate::crawler::classifier::ResponseClassifier;
use crate::crawler::engine::{EngineSettings, FetchEngine};
use crate::crawler::limiter::RateLimiter;
use crate::crawler::scheduler::{RetryOutcome, RetryScheduler};
use crate::output::RunReport;
use crate::session::{
    solver_from_config, CaptchaSolver, ConfiguredSolver, CookieProvider, ProxyPool,
    StaticCookieProvider,
};
use crate::state::FetchTarget;
use crate::storage::open_exporter;
use crate::url::{product_url, Market};
use crate::{ConfigError, Result};
use std::time::Duration;

/// Storefront origin for a run: the configured override or the market's own
pub fn resolve_base_url(config: &Config, market: &Market) -> String {
    config
        .market
        .base_url
        .clone()
        .unwrap_or_else(|| market.base_url())
}

pub fn resolve_market(config: &Config) -> Result<Market> {
    Market::from_code(&config.market.country)
        .ok_or_else(|| ConfigError::UnknownMarket(config.market.country.clone()).into())
}

/// Builds the product-page engine described by a configuration
pub fn build_engine(config: &Config, rundate: &str) -> Result<FetchEngine<ConfiguredSolver>> {
    Ok(FetchEngine::new(
        EngineSettings::from_config(config, rundate),
        RateLimiter::new(config.engine.rate_per_second),
        ProxyPool::from_config(&config.proxy)?,
        ResponseClassifier::from_config(config)?,
        solver_from_config(&config.captcha),
        open_exporter(&config.output)?,
    ))
}

/// Runs product-page harvests end to end
pub struct Harvester<P, S> {
    engine: FetchEngine<S>,
    provider: P,
    scheduler: RetryScheduler,
    market: Market,
    zipcode: String,
    base_url: String,
}

impl Harvester<StaticCookieProvider, ConfiguredSolver> {
    /// Wires every component from the configuration
    pub fn from_config(config: &Config, rundate: &str) -> Result<Self> {
        let market = resolve_market(config)?;
        let scheduler = RetryScheduler::new(config.engine.stagnation_cap)
            .with_budget(config.engine.retry_budget_secs.map(Duration::from_secs));
        Ok(Self::new(
            build_engine(config, rundate)?,
            StaticCookieProvider::from_config(&config.session),
            scheduler,
            market,
            config.market.zipcode.clone(),
        )
        .with_base_url(resolve_base_url(config, &market)))
    }
}

impl<P: CookieProvider, S: CaptchaSolver> Harvester<P, S> {
    pub fn new(
        engine: FetchEngine<S>,
        provider: P,
        scheduler: RetryScheduler,
        market: Market,
        zipcode: impl Into<String>,
    ) -> Self {
        let base_url = market.base_url();
        Self {
            engine,
            provider,
            scheduler,
            market,
            zipcode: zipcode.into(),
            base_url,
        }
    }

    /// Sends every request to `base_url` instead of the market's storefront
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn engine(&self) -> &FetchEngine<S> {
        &self.engine
    }

    /// Product-page targets for a list of ASINs
    pub fn targets(&self, asins: &[String]) -> Vec<FetchTarget> {
        asins
            .iter()
            .map(|asin| FetchTarget::new(asin.as_str(), product_url(&self.base_url, asin)))
            .collect()
    }

    /// Harvests `asins`; only session acquisition and storage listing can fail
    pub async fn run(&self, asins: Vec<String>) -> Result<RunReport> {
        let settings = self.engine.settings();
        let requested = asins.len();
        tracing::info!(
            "Harvesting {} ASINs into {}/{} ({} market)",
            requested,
            settings.dataset,
            settings.rundate,
            self.market.code
        );

        let cookies = self.provider.acquire(&self.zipcode, &self.market).await?;

        let fetched = self
            .engine
            .exporter()
            .fetched(&settings.dataset, &settings.rundate)?;
        let pending: Vec<String> = asins
            .into_iter()
            .filter(|asin| !fetched.contains(asin))
            .collect();
        let already_fetched = requested - pending.len();
        if already_fetched > 0 {
            tracing::info!("Skipping {} ASINs already stored for this run", already_fetched);
        }

        let outcome = self
            .scheduler
            .run(&self.engine.with_cookies(&cookies), self.targets(&pending))
            .await;

        self.engine.finish()?;

        let counters = self.engine.counters();
        tracing::info!("Invalid pages: {}", counters.invalid);
        if let RetryOutcome::Escalated { remaining, .. } = &outcome {
            tracing::warn!("{} ASINs need a different fetch strategy", remaining.len());
        }

        Ok(RunReport {
            dataset: settings.dataset.clone(),
            rundate: settings.rundate.clone(),
            requested,
            already_fetched,
            counters,
            rounds: outcome.rounds(),
            batches_written: self.engine.batches_written(),
            escalated: outcome
                .remaining()
                .iter()
                .map(|t| t.identifier.clone())
                .collect(),
        })
    }
}

/// Runs a complete product-page harvest from a configuration
pub async fn run_harvest(config: &Config, asins: Vec<String>, rundate: &str) -> Result<RunReport> {
    Harvester::from_config(config, rundate)?.run(asins).await
}
