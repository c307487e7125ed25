//! End-of-run statistics
//!
//! This module collects what a run did and prints it for the operator.

use crate::state::CounterSnapshot;

/// Summary of one harvest run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Dataset (info type) harvested
    pub dataset: String,

    /// Run date partition
    pub rundate: String,

    /// Identifiers given on input
    pub requested: usize,

    /// Identifiers skipped because the run already stored them
    pub already_fetched: usize,

    /// Engine counters at the end of the run
    pub counters: CounterSnapshot,

    /// Retry rounds executed, the first pass included
    pub rounds: u32,

    /// Detail batches exported
    pub batches_written: u64,

    /// Identifiers the engine could not resolve
    pub escalated: Vec<String>,
}

impl RunReport {
    /// True when nothing needs a different fetch strategy
    pub fn is_complete(&self) -> bool {
        self.escalated.is_empty()
    }

    /// Resolved identifiers (stored or dropped) over those attempted
    pub fn resolution_rate(&self) -> f64 {
        let attempted = self.requested.saturating_sub(self.already_fetched);
        if attempted == 0 {
            return 100.0;
        }
        let resolved = self.counters.succeeded + self.counters.invalid + self.counters.dropped;
        resolved as f64 / attempted as f64 * 100.0
    }
}

/// Prints the report to stdout in a formatted manner
pub fn print_report(report: &RunReport) {
    println!("=== Harvest Report ===\n");

    println!("Run:");
    println!("  Dataset: {}", report.dataset);
    println!("  Run date: {}", report.rundate);
    println!("  Requested: {}", report.requested);
    println!("  Already fetched: {}", report.already_fetched);
    println!("  Rounds: {}", report.rounds);
    println!();

    let counters = &report.counters;
    println!("Traffic:");
    println!("  Requests issued: {}", counters.requests_issued);
    println!("  Responses received: {}", counters.responses_received);
    println!("  Retries queued: {}", counters.retried);
    println!();

    println!("Outcomes:");
    println!("  Success: {}", counters.succeeded);
    println!("  Invalid: {}", counters.invalid);
    println!("  Dropped: {}", counters.dropped);
    println!("  Escalated: {}", report.escalated.len());
    println!("  Detail batches: {}", report.batches_written);
    println!();

    if !report.escalated.is_empty() {
        println!("Escalated ({}):", report.escalated.len());
        for identifier in &report.escalated {
            println!("  - {}", identifier);
        }
        println!();
    }

    println!("Resolution Rate: {:.1}%", report.resolution_rate());
}

/// Summary of one review crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewReport {
    pub rundate: String,

    pub requested: usize,

    /// ASINs whose first listing page was already stored
    pub already_crawled: usize,

    pub completed: usize,

    /// ASINs that failed once and were tried again
    pub resubmitted: usize,

    pub session_replacements: u32,

    /// ASINs that failed twice
    pub escalated: Vec<String>,
}

pub fn print_review_report(report: &ReviewReport) {
    println!("=== Review Crawl Report ===\n");
    println!("  Run date: {}", report.rundate);
    println!("  Requested: {}", report.requested);
    println!("  Already crawled: {}", report.already_crawled);
    println!("  Completed: {}", report.completed);
    println!("  Resubmitted: {}", report.resubmitted);
    println!("  Sessions replaced: {}", report.session_replacements);
    println!("  Escalated: {}", report.escalated.len());
    for asin in &report.escalated {
        println!("    - {}", asin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_rate() {
        let report = RunReport {
            requested: 10,
            already_fetched: 2,
            counters: CounterSnapshot {
                succeeded: 5,
                invalid: 1,
                dropped: 0,
                ..Default::default()
            },
            escalated: vec!["B000000001".to_string(), "B000000002".to_string()],
            ..Default::default()
        };
        assert!((report.resolution_rate() - 75.0).abs() < f64::EPSILON);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_nothing_attempted_is_complete() {
        let report = RunReport {
            requested: 3,
            already_fetched: 3,
            ..Default::default()
        };
        assert_eq!(report.resolution_rate(), 100.0);
        assert!(report.is_complete());
    }
}
