//! Bounded retry loop over fetch rounds
//!
//! Each round drains the whole queue through a [`RoundRunner`] and collects
//! the targets that still need another attempt. The loop ends `Drained` when
//! the queue empties, or `Escalated` when the queue size stops moving for
//! `stagnation_cap` consecutive rounds (or the optional wall-clock budget
//! runs out). Escalated targets need a different fetch strategy.

use crate::state::FetchTarget;
use std::future::Future;
use std::time::{Duration, Instant};

/// Runs one full round and returns the targets to try again
pub trait RoundRunner: Send + Sync {
    fn run_round(
        &self,
        targets: Vec<FetchTarget>,
    ) -> impl Future<Output = Vec<FetchTarget>> + Send;
}

/// How the retry loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Every target resolved to success, invalid or dropped
    Drained { rounds: u32 },

    /// The queue stopped shrinking; these are handed off
    Escalated {
        rounds: u32,
        remaining: Vec<FetchTarget>,
    },
}

impl RetryOutcome {
    pub fn rounds(&self) -> u32 {
        match self {
            Self::Drained { rounds } | Self::Escalated { rounds, .. } => *rounds,
        }
    }

    /// Targets left unresolved (empty when drained)
    pub fn remaining(&self) -> &[FetchTarget] {
        match self {
            Self::Drained { .. } => &[],
            Self::Escalated { remaining, .. } => remaining,
        }
    }
}

/// Stagnation-bounded round loop
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    stagnation_cap: u32,
    budget: Option<Duration>,
}

impl RetryScheduler {
    pub fn new(stagnation_cap: u32) -> Self {
        Self {
            stagnation_cap: stagnation_cap.max(1),
            budget: None,
        }
    }

    /// Escalates whatever is left once `budget` has elapsed
    pub fn with_budget(mut self, budget: Option<Duration>) -> Self {
        self.budget = budget;
        self
    }

    /// Runs rounds starting from `queue` until drained or escalated
    ///
    /// A round whose output is non-empty and the same size as its input is
    /// stagnant; any other round resets the count.
    pub async fn run<R: RoundRunner>(&self, runner: &R, mut queue: Vec<FetchTarget>) -> RetryOutcome {
        let started = Instant::now();
        let mut rounds = 0;
        let mut stagnant = 0;

        loop {
            if queue.is_empty() {
                tracing::info!("Retry queue drained after {} rounds", rounds);
                return RetryOutcome::Drained { rounds };
            }

            if let Some(budget) = self.budget {
                if rounds > 0 && started.elapsed() >= budget {
                    tracing::warn!(
                        "Retry budget of {:?} spent, escalating {} targets",
                        budget,
                        queue.len()
                    );
                    return RetryOutcome::Escalated {
                        rounds,
                        remaining: queue,
                    };
                }
            }

            let previous = queue.len();
            rounds += 1;
            tracing::info!("Round {}: {} targets", rounds, previous);
            queue = runner.run_round(queue).await;

            if !queue.is_empty() && queue.len() == previous {
                stagnant += 1;
                tracing::debug!("Round {} made no progress ({} in a row)", rounds, stagnant);
            } else {
                stagnant = 0;
            }

            if stagnant >= self.stagnation_cap {
                tracing::warn!(
                    "Queue stuck at {} targets for {} rounds, escalating",
                    queue.len(),
                    stagnant
                );
                return RetryOutcome::Escalated {
                    rounds,
                    remaining: queue,
                };
            }
        }
    }
}
