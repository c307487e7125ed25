//! Thread pool where every worker owns one long-lived session
//!
//! Sessions are never shared: each worker thread holds a [`SessionSlot`]
//! for its lifetime and replaces the session in place when it gets blocked.
//! A unit of work that fails is resubmitted once; a second failure escalates
//! it to the caller. A panicking unit counts as a failure and costs the
//! worker its session.

use crate::{HarvestError, Result};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex};

/// Creates sessions for workers
pub trait SessionFactory: Sync {
    type Session;

    /// Builds a fresh session for `worker`
    fn create(&self, worker: usize) -> Result<Self::Session>;
}

/// A worker's exclusive session handle
///
/// The session is created on first use, so a factory failure fails the
/// current unit instead of killing the worker.
pub struct SessionSlot<'a, F: SessionFactory> {
    factory: &'a F,
    worker: usize,
    session: Option<F::Session>,
    replacements: u32,
}

impl<'a, F: SessionFactory> SessionSlot<'a, F> {
    pub fn new(factory: &'a F, worker: usize) -> Self {
        Self {
            factory,
            worker,
            session: None,
            replacements: 0,
        }
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    /// The current session, created if needed
    pub fn get(&mut self) -> Result<&mut F::Session> {
        let session = match &mut self.session {
            Some(session) => session,
            empty => empty.insert(self.factory.create(self.worker)?),
        };
        Ok(session)
    }

    /// Tears down the current session and builds a new one
    pub fn replace(&mut self) -> Result<&mut F::Session> {
        self.session = None;
        self.replacements += 1;
        tracing::info!("Worker {} replacing its session", self.worker);
        self.get()
    }

    /// Sessions replaced so far
    pub fn replacements(&self) -> u32 {
        self.replacements
    }
}

/// What happened to the units of one pool run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReport<J> {
    pub completed: usize,

    /// Units that failed once and went back in the queue
    pub resubmitted: usize,

    /// Units that failed on resubmission too
    pub escalated: Vec<J>,

    /// Session replacements across all workers
    pub session_replacements: u32,
}

struct QueueState<J> {
    jobs: VecDeque<(J, u32)>,
    /// Units not yet finished, queued or in flight
    pending: usize,
}

/// Job queue that stays open while any unit may still be resubmitted
struct JobQueue<J> {
    state: Mutex<QueueState<J>>,
    ready: Condvar,
}

impl<J> JobQueue<J> {
    fn new(jobs: Vec<J>) -> Self {
        let pending = jobs.len();
        Self {
            state: Mutex::new(QueueState {
                jobs: jobs.into_iter().map(|job| (job, 0)).collect(),
                pending,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState<J>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Blocks until a unit is available; `None` once every unit is finished
    fn next(&self) -> Option<(J, u32)> {
        let mut state = self.lock();
        loop {
            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }
            if state.pending == 0 {
                return None;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn resubmit(&self, job: J, attempt: u32) {
        self.lock().jobs.push_back((job, attempt));
        self.ready.notify_one();
    }

    fn finish(&self) {
        let mut state = self.lock();
        state.pending -= 1;
        if state.pending == 0 {
            self.ready.notify_all();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Fixed-size pool of session-owning worker threads
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Runs `work` over every job and blocks until all are finished
    pub fn run<F, J, W>(&self, factory: &F, jobs: Vec<J>, work: W) -> PoolReport<J>
    where
        F: SessionFactory,
        J: Send + std::fmt::Display,
        W: Fn(&mut SessionSlot<'_, F>, &J) -> Result<()> + Sync,
    {
        let total = jobs.len();
        let queue = JobQueue::new(jobs);
        let outcome = Mutex::new((0usize, 0usize, Vec::new(), 0u32));

        std::thread::scope(|scope| {
            for worker in 0..self.workers {
                let (queue, outcome, work) = (&queue, &outcome, &work);
                scope.spawn(move || {
                    let mut slot = SessionSlot::new(factory, worker);
                    while let Some((job, attempt)) = queue.next() {
                        let result = panic::catch_unwind(AssertUnwindSafe(|| work(&mut slot, &job)))
                            .unwrap_or_else(|payload| {
                                slot.session = None;
                                Err(HarvestError::Session(format!(
                                    "worker panicked: {}",
                                    panic_message(payload.as_ref())
                                )))
                            });
                        match result {
                            Ok(()) => {
                                outcome.lock().unwrap_or_else(|p| p.into_inner()).0 += 1;
                                queue.finish();
                            }
                            Err(e) if attempt == 0 => {
                                tracing::warn!("Worker {}: {} failed, resubmitting: {}", worker, job, e);
                                outcome.lock().unwrap_or_else(|p| p.into_inner()).1 += 1;
                                queue.resubmit(job, attempt + 1);
                            }
                            Err(e) => {
                                tracing::error!("Worker {}: {} failed again, escalating: {}", worker, job, e);
                                outcome.lock().unwrap_or_else(|p| p.into_inner()).2.push(job);
                                queue.finish();
                            }
                        }
                    }
                    outcome.lock().unwrap_or_else(|p| p.into_inner()).3 += slot.replacements();
                    tracing::debug!("Worker {} done", worker);
                });
            }
        });

        let (completed, resubmitted, escalated, session_replacements) =
            outcome.into_inner().unwrap_or_else(|p| p.into_inner());
        tracing::info!(
            "Pool finished: {} of {} units completed, {} escalated",
            completed,
            total,
            escalated.len()
        );
        PoolReport {
            completed,
            resubmitted,
            escalated,
            session_replacements,
        }
    }
}
