//! Pump loop: the core state machine.
//!
//! One iterative loop per run: fetch a page, checkpoint, transform,
//! submit the write, throttle, advance. Writes overlap the next fetch:
//! the loop never awaits a write at submission, only the queue's
//! admission (its backpressure). Fetches are strictly sequential, so the
//! offset progression is totally ordered.
//!
//! All mutable run state lives in a `RunState` owned by a single `run`
//! invocation; nothing else mutates it, so no locks are needed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::checkpoint::{CheckpointStatus, CheckpointStore};
use crate::config::RunConfig;
use crate::core::{Batch, DocumentSink, DocumentSource};
use crate::error::{PumpError, Result};
use crate::events::{ErrorEvent, EventSink, NullSink, TracingSink};
use crate::queue::{QueuePolicy, WriteOutcome, WriteQueue};
use crate::transform::{self, Modifier, TransformRegistry};

/// Result of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Total documents the sink reported as persisted.
    pub total_writes: u64,

    /// Non-empty pages fetched.
    pub pages: u64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,
}

/// Mutable state of one run: exclusively owned by the driving task.
struct RunState {
    offset: u64,
    total_writes: u64,
    pages: u64,
    queue: WriteQueue,
}

/// Moves documents from a source to a sink under the configured policy.
pub struct Pump {
    config: RunConfig,
    source: Arc<dyn DocumentSource>,
    sink: Arc<dyn DocumentSink>,
    modifiers: Vec<Modifier>,
    checkpoint: CheckpointStore,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Pump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pump")
            .field("config", &self.config)
            .field("modifiers", &self.modifiers.len())
            .finish_non_exhaustive()
    }
}

impl Pump {
    /// Create a pump with no transform plugins registered.
    ///
    /// Validates the configuration and compiles transforms up front:
    /// a bad configuration never reaches any I/O.
    pub fn new(
        config: RunConfig,
        source: Arc<dyn DocumentSource>,
        sink: Arc<dyn DocumentSink>,
    ) -> Result<Self> {
        Self::with_registry(config, source, sink, &TransformRegistry::new())
    }

    /// Create a pump resolving `@name` transform references against the
    /// given plugin registry.
    pub fn with_registry(
        config: RunConfig,
        source: Arc<dyn DocumentSource>,
        sink: Arc<dyn DocumentSink>,
        registry: &TransformRegistry,
    ) -> Result<Self> {
        let events: Arc<dyn EventSink> = if config.to_log {
            Arc::new(TracingSink)
        } else {
            Arc::new(NullSink)
        };

        if let Err(err) = config.validate() {
            if let PumpError::Validation(errors) = &err {
                events.error(&ErrorEvent::Validation(errors));
            }
            return Err(err);
        }

        let modifiers = transform::compile(&config.transform, registry)?;
        let checkpoint = CheckpointStore::new(config.checkpoint_path.clone(), &config.input);

        Ok(Self {
            config,
            source,
            sink,
            modifiers,
            checkpoint,
            events,
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the event sink (the `logger` option).
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Attach a cancellation token. On cancellation the loop stops
    /// fetching, drains outstanding writes and still writes a final
    /// checkpoint.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Drive the run to completion.
    ///
    /// Returns the run report on success. On any fatal failure a final
    /// `error` checkpoint is written with the best-effort write total and
    /// the failure is returned; the event sink observes the same failure.
    pub async fn run(self) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();

        self.events.log("starting dump");
        if self.config.offset > 0 {
            self.events.log(&format!(
                "Warning: offsetting {} rows. Using an offset doesn't guarantee that the \
                 offset rows have already been written.",
                self.config.offset
            ));
        }
        if !self.modifiers.is_empty() {
            self.events.log(&format!(
                "will modify documents using {} transform(s)",
                self.modifiers.len()
            ));
        }

        let mut state = RunState {
            offset: self.config.offset,
            total_writes: 0,
            pages: 0,
            queue: WriteQueue::new(QueuePolicy::from_config(&self.config)),
        };

        match self.drive(&mut state).await {
            Ok(()) => {
                self.events.log(&format!("Total Writes: {}", state.total_writes));
                self.events.log("dump complete");
                self.record_checkpoint(state.total_writes, CheckpointStatus::Complete);

                let completed_at = Utc::now();
                Ok(RunReport {
                    run_id,
                    total_writes: state.total_writes,
                    pages: state.pages,
                    started_at,
                    completed_at,
                    duration_seconds: (completed_at - started_at).num_milliseconds() as f64
                        / 1000.0,
                })
            }
            Err(err) => {
                // Settle whatever already finished without awaiting
                // stragglers; dropping the queue aborts them.
                for outcome in state.queue.try_reap() {
                    if let Ok(writes) = outcome.result {
                        state.total_writes += writes;
                    }
                }
                self.events.error(&ErrorEvent::Failure(&err));
                self.events.log(&format!("Total Writes: {}", state.total_writes));
                self.events.log(&format!("dump ended with error => {}", err));
                self.record_checkpoint(state.total_writes, CheckpointStatus::Error);
                Err(err)
            }
        }
    }

    /// The loop proper. `Ok(())` means the source was exhausted and every
    /// write settled acceptably.
    async fn drive(&self, state: &mut RunState) -> Result<()> {
        let limit = self.config.limit;

        loop {
            self.apply_outcomes(state.queue.try_reap(), &mut state.total_writes)?;

            if self.cancel.is_cancelled() {
                let outcomes = state.queue.drain().await;
                self.apply_outcomes(outcomes, &mut state.total_writes)?;
                return Err(PumpError::Cancelled);
            }

            let batch = match self.source.get(limit, state.offset).await {
                Ok(batch) => batch,
                Err(err) if self.config.ignore_errors => {
                    // Never touch an absent result: a failed fetch is a
                    // zero-length batch for this iteration and the offset
                    // stays put.
                    self.events.error(&ErrorEvent::Failure(&err));
                    warn!(offset = state.offset, "fetch failed, tolerated: {}", err);
                    Batch::new()
                }
                Err(err) => return Err(err),
            };

            self.events.log(&format!(
                "got {} objects from source (offset: {})",
                batch.len(),
                state.offset
            ));
            self.record_checkpoint(state.total_writes, CheckpointStatus::InProgress);

            if batch.is_empty() {
                let outcomes = state.queue.drain().await;
                self.apply_outcomes(outcomes, &mut state.total_writes)?;
                return Ok(());
            }

            let mut batch = batch;
            self.apply_modifiers(&mut batch)?;

            let fetched = batch.len();
            let sink = Arc::clone(&self.sink);
            let offset = state.offset;
            state
                .queue
                .submit(async move {
                    let result = sink.set(batch, limit, offset).await;
                    WriteOutcome {
                        offset,
                        len: fetched,
                        result,
                    }
                })
                .await;

            let throttle = self.config.throttle_delay();
            if !throttle.is_zero() {
                tokio::time::sleep(throttle).await;
            }

            state.offset += fetched as u64;
            state.pages += 1;
        }
    }

    /// Fold settled write outcomes into the running total, applying the
    /// tolerance policy: a tolerated failure contributes zero writes.
    fn apply_outcomes(&self, outcomes: Vec<WriteOutcome>, total_writes: &mut u64) -> Result<()> {
        for outcome in outcomes {
            match outcome.result {
                Ok(writes) => {
                    *total_writes += writes;
                    self.events.log(&format!(
                        "sent {} objects to destination, wrote {}",
                        outcome.len, writes
                    ));
                }
                Err(err) if self.config.ignore_errors => {
                    self.events.error(&ErrorEvent::Failure(&err));
                    warn!(offset = outcome.offset, "write failed, tolerated: {}", err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Apply the modifier list to every document in place, in order.
    /// Any failure is fatal: it signals a defect in caller-supplied
    /// logic, never a transient condition.
    fn apply_modifiers(&self, batch: &mut Batch) -> Result<()> {
        if self.modifiers.is_empty() {
            return Ok(());
        }
        for doc in batch.iter_mut() {
            for modifier in &self.modifiers {
                modifier.apply(doc)?;
            }
        }
        Ok(())
    }

    /// Persist a checkpoint, absorbing any failure: checkpointing never
    /// blocks the loop.
    fn record_checkpoint(&self, total_writes: u64, status: CheckpointStatus) {
        if let Err(err) = self.checkpoint.update(total_writes, status) {
            warn!("failed to update checkpoint: {}", err);
            self.events.log(&format!("failed to update checkpoint: {}", err));
        }
    }
}
