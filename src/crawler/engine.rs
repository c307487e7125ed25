//! The fetch engine: one attempt per target, many attempts per round
//!
//! An attempt takes a rate-limiter slot, draws a proxy and identity, sends
//! the GET, answers a CAPTCHA at most once, classifies the body and routes
//! the result: persisted (success / invalid), queued for the next round
//! (retryable) or discarded (dropped).

use crate::config::Config;
use crate::crawler::classifier::ResponseClassifier;
use crate::crawler::fetcher::{build_http_client, fetch_page};
use crate::crawler::limiter::RateLimiter;
use crate::crawler::scheduler::RoundRunner;
use crate::session::{CaptchaSolver, CookieSet, ProxyPool};
use crate::state::{
    CounterSnapshot, Counters, DetailBatch, DetailRecord, FetchOutcome, FetchTarget, RetryQueue,
    SoftFailure, Verdict,
};
use crate::storage::{put_raw_with_retry, Exporter, PageCategory, RawKey};
use crate::Result;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Knobs the engine runs with
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Attempts in flight within one round
    pub concurrency: usize,

    /// Whole-request timeout for the GET
    pub timeout: Duration,

    /// Sleep between in-place retries after an unexpected error
    pub backoff: Duration,

    /// In-place attempts before an unexpected error becomes a retry
    pub max_inner_attempts: u32,

    /// Log progress every this many requests; 0 turns progress lines off
    pub progress_every: u64,

    /// Storage prefix for raw pages and batches
    pub dataset: String,

    /// Run date partition, `YYYY/MM/DD`
    pub rundate: String,

    /// Detail batch size; `None` disables detail export
    pub batch_size: Option<usize>,
}

impl EngineSettings {
    pub fn from_config(config: &Config, rundate: impl Into<String>) -> Self {
        Self {
            concurrency: config.engine.concurrency,
            timeout: Duration::from_secs(config.engine.timeout_secs),
            backoff: Duration::from_millis(config.engine.backoff_ms),
            max_inner_attempts: config.engine.max_inner_attempts,
            progress_every: config.engine.progress_every,
            dataset: config.target.info_type.clone(),
            rundate: rundate.into(),
            batch_size: config
                .target
                .export_details
                .then_some(config.target.batch_size),
        }
    }
}

fn on_interval(count: u64, every: u64) -> bool {
    count.checked_rem(every) == Some(0)
}

/// Tally of one round
#[derive(Debug, Clone, Default)]
pub struct RoundReport {
    pub succeeded: usize,
    pub invalid: usize,
    pub dropped: usize,

    /// Targets for the next round, each exactly once
    pub retry: Vec<FetchTarget>,
}

impl RoundReport {
    /// Outcomes produced; always equals the number of targets submitted
    pub fn total(&self) -> usize {
        self.succeeded + self.invalid + self.dropped + self.retry.len()
    }
}

/// Orchestrates fetch attempts against one storefront
pub struct FetchEngine<S> {
    settings: EngineSettings,
    limiter: RateLimiter,
    proxies: ProxyPool,
    classifier: ResponseClassifier,
    solver: S,
    exporter: Arc<dyn Exporter>,
    counters: Counters,
    batch: Option<DetailBatch>,
    batches_written: AtomicU64,
}

impl<S: CaptchaSolver> FetchEngine<S> {
    pub fn new(
        settings: EngineSettings,
        limiter: RateLimiter,
        proxies: ProxyPool,
        classifier: ResponseClassifier,
        solver: S,
        exporter: Arc<dyn Exporter>,
    ) -> Self {
        let batch = settings.batch_size.map(DetailBatch::new);
        Self {
            settings,
            limiter,
            proxies,
            classifier,
            solver,
            exporter,
            counters: Counters::new(),
            batch,
            batches_written: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn exporter(&self) -> &Arc<dyn Exporter> {
        &self.exporter
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    pub fn batches_written(&self) -> u64 {
        self.batches_written.load(Ordering::Relaxed)
    }

    /// Runs one attempt for one target and routes the result
    ///
    /// Never fails: every path ends in exactly one outcome.
    pub async fn fetch(&self, target: FetchTarget, cookies: &CookieSet) -> FetchOutcome {
        let mut attempt = 0;
        let (verdict, body) = loop {
            attempt += 1;
            match self.attempt(&target, cookies).await {
                Ok(result) => break result,
                Err(e) if e.is_request_error() => {
                    tracing::debug!("{}: {}", target.identifier, e);
                    self.counters.record_retry();
                    return FetchOutcome::Retryable {
                        target,
                        reason: SoftFailure::Transport,
                    };
                }
                Err(e) if attempt >= self.settings.max_inner_attempts => {
                    tracing::warn!(
                        "{}: giving up in place after {} attempts: {}",
                        target.identifier,
                        attempt,
                        e
                    );
                    self.counters.record_retry();
                    return FetchOutcome::Retryable {
                        target,
                        reason: SoftFailure::Exhausted,
                    };
                }
                Err(e) => {
                    tracing::debug!(
                        "{}: unexpected error on attempt {}, retrying: {}",
                        target.identifier,
                        attempt,
                        e
                    );
                    tokio::time::sleep(self.settings.backoff).await;
                }
            }
        };

        self.route(target, verdict, body)
    }

    /// Slot, egress, GET, at most one CAPTCHA solve, classification
    async fn attempt(&self, target: &FetchTarget, cookies: &CookieSet) -> Result<(Verdict, String)> {
        self.limiter.acquire().await;
        let issued = self.counters.request_issued();
        if on_interval(issued, self.settings.progress_every) {
            tracing::info!("Progress: {} requests issued", issued);
        }

        let egress = self.proxies.next();
        tracing::trace!(
            "{}: via {} as {}",
            target.identifier,
            egress.proxy.as_deref().unwrap_or("direct"),
            egress.identity.name
        );
        let client = build_http_client(&egress, cookies, self.settings.timeout)?;
        let page = fetch_page(&client, target).await?;

        let received = self.counters.response_received();
        if on_interval(received, self.settings.progress_every) {
            tracing::info!("Progress: {} responses received", received);
        }

        let verdict = self
            .classifier
            .classify(&target.identifier, page.status, &page.body);
        if verdict != Verdict::CaptchaChallenge {
            return Ok((verdict, page.body));
        }

        tracing::debug!("{}: CAPTCHA challenge", target.identifier);
        let solved = self
            .solver
            .solve(&client, &page.final_url, &page.body)
            .await?;
        let verdict = match self.classifier.classify(&target.identifier, 200, &solved) {
            Verdict::CaptchaChallenge => {
                tracing::info!("{}: CAPTCHA persisted after solving", target.identifier);
                Verdict::Retryable(SoftFailure::CaptchaPersisted)
            }
            verdict => {
                tracing::debug!("{}: solved CAPTCHA", target.identifier);
                verdict
            }
        };
        Ok((verdict, solved))
    }

    fn route(&self, target: FetchTarget, verdict: Verdict, body: String) -> FetchOutcome {
        let identifier = target.identifier.clone();
        match verdict {
            Verdict::Success { detail } => {
                if let Err(reason) = self.persist(&identifier, PageCategory::Valid, &body) {
                    return self.retry(target, reason);
                }
                self.counters.record_success();
                self.append_detail(&identifier, Some(detail));
                FetchOutcome::Success { identifier, body }
            }
            Verdict::Invalid => {
                if let Err(reason) = self.persist(&identifier, PageCategory::Invalid, &body) {
                    return self.retry(target, reason);
                }
                self.counters.record_invalid();
                self.append_detail(&identifier, None);
                FetchOutcome::Invalid { identifier, body }
            }
            Verdict::Dropped => {
                tracing::info!("{}: not found, dropped", identifier);
                self.counters.record_dropped();
                FetchOutcome::Dropped { identifier }
            }
            Verdict::Retryable(reason) => {
                tracing::info!("{}: {}, will retry", identifier, reason);
                self.retry(target, reason)
            }
            Verdict::CaptchaChallenge => self.retry(target, SoftFailure::CaptchaPersisted),
        }
    }

    fn retry(&self, target: FetchTarget, reason: SoftFailure) -> FetchOutcome {
        self.counters.record_retry();
        FetchOutcome::Retryable { target, reason }
    }

    fn persist(
        &self,
        identifier: &str,
        category: PageCategory,
        body: &str,
    ) -> std::result::Result<(), SoftFailure> {
        let key = RawKey::new(
            &self.settings.dataset,
            &self.settings.rundate,
            category,
            identifier,
        );
        put_raw_with_retry(self.exporter.as_ref(), &key, body).map_err(|e| {
            tracing::error!("{}: failed to store page: {}", identifier, e);
            SoftFailure::PersistFailed
        })
    }

    fn append_detail(&self, identifier: &str, marker: Option<String>) {
        let Some(batch) = &self.batch else {
            return;
        };
        let record = DetailRecord {
            identifier: identifier.to_string(),
            marker,
        };
        if let Some(full) = batch.push(record) {
            if let Err(e) = self.write_batch(&full) {
                tracing::error!("Failed to export detail batch, keeping records: {}", e);
                batch.restore(full);
            }
        }
    }

    fn write_batch(&self, records: &[DetailRecord]) -> Result<()> {
        let name = self
            .exporter
            .put_batch(&self.settings.dataset, &self.settings.rundate, records)?;
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Exported detail batch {} ({} records)", name, records.len());
        Ok(())
    }

    /// Flushes the partial detail batch left at shutdown
    pub fn finish(&self) -> Result<()> {
        let Some(batch) = &self.batch else {
            return Ok(());
        };
        let remaining = batch.drain();
        if remaining.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.write_batch(&remaining) {
            batch.restore(remaining);
            return Err(e);
        }
        Ok(())
    }

    /// Runs one round: every target attempted once, bounded concurrency
    pub async fn fetch_all(&self, targets: Vec<FetchTarget>, cookies: &CookieSet) -> RoundReport {
        let retry = RetryQueue::new();
        let succeeded = AtomicUsize::new(0);
        let invalid = AtomicUsize::new(0);
        let dropped = AtomicUsize::new(0);

        stream::iter(targets)
            .for_each_concurrent(self.settings.concurrency, |target| {
                let (retry, succeeded, invalid, dropped) = (&retry, &succeeded, &invalid, &dropped);
                async move {
                    match self.fetch(target, cookies).await {
                        FetchOutcome::Success { .. } => {
                            succeeded.fetch_add(1, Ordering::Relaxed);
                        }
                        FetchOutcome::Invalid { .. } => {
                            invalid.fetch_add(1, Ordering::Relaxed);
                        }
                        FetchOutcome::Dropped { .. } => {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                        FetchOutcome::Retryable { target, .. } => retry.push(target),
                    }
                }
            })
            .await;

        RoundReport {
            succeeded: succeeded.into_inner(),
            invalid: invalid.into_inner(),
            dropped: dropped.into_inner(),
            retry: retry.drain(),
        }
    }

    /// Binds the session cookies so the engine can drive a retry loop
    pub fn with_cookies<'a>(&'a self, cookies: &'a CookieSet) -> SessionRounds<'a, S> {
        SessionRounds {
            engine: self,
            cookies,
        }
    }
}

/// A [`FetchEngine`] paired with the cookies of the current run
pub struct SessionRounds<'a, S> {
    engine: &'a FetchEngine<S>,
    cookies: &'a CookieSet,
}

impl<S: CaptchaSolver> RoundRunner for SessionRounds<'_, S> {
    async fn run_round(&self, targets: Vec<FetchTarget>) -> Vec<FetchTarget> {
        let submitted = targets.len();
        let report = self.engine.fetch_all(targets, self.cookies).await;
        tracing::info!(
            "Round finished: {} submitted, {} succeeded, {} invalid, {} dropped, {} to retry",
            submitted,
            report.succeeded,
            report.invalid,
            report.dropped,
            report.retry.len()
        );
        report.retry
    }
}
