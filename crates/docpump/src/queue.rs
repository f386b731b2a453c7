//! Bounded write queue: caps outstanding sink writes and optionally
//! rate-limits submissions per time window.
//!
//! The queue is pure mechanism. It never interprets write results;
//! tolerance policy and count aggregation belong to the pump, which reaps
//! [`WriteOutcome`]s from here. Submission blocks while the concurrency
//! cap is saturated or the rate window is exhausted; that blocking is the
//! engine's backpressure.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::trace;

use crate::config::RunConfig;
use crate::error::{PumpError, Result};

/// Concurrency and rate policy for a queue.
#[derive(Debug, Clone, Copy)]
pub struct QueuePolicy {
    /// Maximum writes outstanding at once. 0 means unbounded.
    pub concurrency: usize,

    /// Rate-window length. Zero disables the window.
    pub interval: Duration,

    /// Maximum submissions per window. 0 means unlimited.
    pub interval_cap: usize,

    /// Count writes still running at rollover against the next window.
    pub carryover: bool,
}

impl QueuePolicy {
    /// Unbounded concurrency, no rate window.
    pub fn unbounded() -> Self {
        Self {
            concurrency: 0,
            interval: Duration::ZERO,
            interval_cap: 0,
            carryover: false,
        }
    }

    /// Derive the policy from a run configuration.
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            interval: config.rate_interval(),
            interval_cap: config.interval_cap,
            carryover: config.carryover_concurrency_count,
        }
    }
}

/// The settled result of one submitted write.
#[derive(Debug)]
pub struct WriteOutcome {
    /// Fetch offset of the batch this write carried.
    pub offset: u64,

    /// Number of documents in the batch.
    pub len: usize,

    /// Sink-reported write count, or the failure.
    pub result: Result<u64>,
}

struct RateWindow {
    interval: Duration,
    cap: usize,
    carryover: bool,
    window_start: Instant,
    started: usize,
}

impl RateWindow {
    fn new(interval: Duration, cap: usize, carryover: bool) -> Self {
        Self {
            interval,
            cap,
            carryover,
            window_start: Instant::now(),
            started: 0,
        }
    }

    /// Wait until the current window has budget for one more submission.
    async fn admit_one(&mut self, running: &AtomicUsize) {
        loop {
            let now = Instant::now();
            if now.duration_since(self.window_start) >= self.interval {
                self.window_start = now;
                self.started = if self.carryover {
                    running.load(Ordering::Acquire)
                } else {
                    0
                };
            }
            if self.cap == 0 || self.started < self.cap {
                self.started += 1;
                return;
            }
            let elapsed = now.duration_since(self.window_start);
            let wait = self.interval.saturating_sub(elapsed);
            trace!(wait_ms = wait.as_millis() as u64, "rate window exhausted");
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}

/// Tracks outstanding writes under a [`QueuePolicy`].
pub struct WriteQueue {
    tasks: JoinSet<WriteOutcome>,
    semaphore: Option<Arc<Semaphore>>,
    window: Option<RateWindow>,
    running: Arc<AtomicUsize>,
}

impl WriteQueue {
    /// Create an empty queue with the given policy.
    pub fn new(policy: QueuePolicy) -> Self {
        let semaphore = match policy.concurrency {
            0 => None,
            cap => Some(Arc::new(Semaphore::new(cap))),
        };
        let window = if policy.interval.is_zero() {
            None
        } else {
            Some(RateWindow::new(
                policy.interval,
                policy.interval_cap,
                policy.carryover,
            ))
        };
        Self {
            tasks: JoinSet::new(),
            semaphore,
            window,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of writes not yet reaped.
    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    /// Submit a write. Returns once the write has been admitted and
    /// spawned; the write itself settles later and is collected via
    /// [`try_reap`](Self::try_reap) or [`drain`](Self::drain).
    ///
    /// Blocks while the concurrency cap is saturated or the rate window
    /// has no budget left.
    pub async fn submit<F>(&mut self, write: F)
    where
        F: Future<Output = WriteOutcome> + Send + 'static,
    {
        let permit = match &self.semaphore {
            // The queue never closes its own semaphore, so acquisition
            // cannot fail.
            Some(semaphore) => Some(
                Arc::clone(semaphore)
                    .acquire_owned()
                    .await
                    .expect("write queue semaphore closed"),
            ),
            None => None,
        };

        if let Some(window) = &mut self.window {
            window.admit_one(&self.running).await;
        }

        let running = Arc::clone(&self.running);
        running.fetch_add(1, Ordering::AcqRel);
        self.tasks.spawn(async move {
            let outcome = write.await;
            running.fetch_sub(1, Ordering::AcqRel);
            drop(permit);
            outcome
        });
    }

    /// Collect every write that has already settled, without waiting.
    pub fn try_reap(&mut self) -> Vec<WriteOutcome> {
        let mut outcomes = Vec::new();
        while let Some(joined) = self.tasks.try_join_next() {
            outcomes.push(flatten(joined));
        }
        outcomes
    }

    /// Await every outstanding write and collect all remaining outcomes.
    pub async fn drain(&mut self) -> Vec<WriteOutcome> {
        let mut outcomes = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            outcomes.push(flatten(joined));
        }
        outcomes
    }
}

/// A panicked write task still yields an outcome so the pump can apply
/// its normal failure policy.
fn flatten(joined: std::result::Result<WriteOutcome, tokio::task::JoinError>) -> WriteOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(err) => WriteOutcome {
            offset: 0,
            len: 0,
            result: Err(PumpError::write(0, format!("write task panicked: {}", err))),
        },
    }
}
