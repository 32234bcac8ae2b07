//! Generic stage execution: load the remaining work set, fan out to a
//! bounded worker pool, checkpoint every outcome.
//!
//! One runner drives every stage; the differences between stages live in
//! their [`UnitOfWork`] implementations and in configuration (pool size,
//! batch size). The pool bounds parallelism; throughput against external
//! APIs is bounded separately by the rate limiters the units hold.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::storage::CheckpointStore;
use crate::types::{CheckpointStatus, Stage, StageResult};

/// Outcome of processing one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The item completed and produced output.
    Done,
    /// The item completed with nothing to produce (e.g. a query with zero
    /// results). Recorded as done so it is never retried.
    DoneEmpty,
    /// Transient failure: an operator may re-queue it later.
    FailedRetryable { reason: String, attempts: u32 },
    /// Permanent failure: never worth another attempt.
    FailedTerminal { reason: String, attempts: u32 },
}

impl UnitOutcome {
    pub fn retryable(reason: impl Into<String>, attempts: u32) -> Self {
        UnitOutcome::FailedRetryable {
            reason: reason.into(),
            attempts,
        }
    }

    pub fn terminal(reason: impl Into<String>, attempts: u32) -> Self {
        UnitOutcome::FailedTerminal {
            reason: reason.into(),
            attempts,
        }
    }

    fn status(&self) -> CheckpointStatus {
        match self {
            UnitOutcome::Done | UnitOutcome::DoneEmpty => CheckpointStatus::Done,
            UnitOutcome::FailedRetryable { .. } => CheckpointStatus::FailedRetryable,
            UnitOutcome::FailedTerminal { .. } => CheckpointStatus::FailedTerminal,
        }
    }

    fn attempts(&self) -> u32 {
        match self {
            UnitOutcome::Done | UnitOutcome::DoneEmpty => 1,
            UnitOutcome::FailedRetryable { attempts, .. }
            | UnitOutcome::FailedTerminal { attempts, .. } => (*attempts).max(1),
        }
    }

    fn error(&self) -> Option<&str> {
        match self {
            UnitOutcome::Done | UnitOutcome::DoneEmpty => None,
            UnitOutcome::FailedRetryable { reason, .. }
            | UnitOutcome::FailedTerminal { reason, .. } => Some(reason),
        }
    }

    fn is_success(&self) -> bool {
        matches!(self, UnitOutcome::Done | UnitOutcome::DoneEmpty)
    }
}

/// One stage's per-item processing function.
///
/// Implementations must contain their own failures: anything that goes
/// wrong with one item is reported as a failed [`UnitOutcome`], never
/// raised past this boundary.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn process(&self, key: &str) -> UnitOutcome;
}

/// Configuration for one stage run.
#[derive(Debug, Clone, Copy)]
pub struct StageRunnerConfig {
    /// Worker pool size.
    pub concurrency: usize,
    /// Items per batch between progress reports.
    pub batch_size: usize,
}

impl Default for StageRunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            batch_size: 100,
        }
    }
}

/// Drives one pipeline stage to completion.
pub struct StageRunner {
    checkpoints: Arc<dyn CheckpointStore>,
    config: StageRunnerConfig,
    cancel: CancellationToken,
}

impl StageRunner {
    pub fn new(
        checkpoints: Arc<dyn CheckpointStore>,
        config: StageRunnerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            checkpoints,
            config,
            cancel,
        }
    }

    /// Run `stage`, dispatching every pending key to `unit`.
    ///
    /// Re-running after a partial failure only re-attempts keys not marked
    /// done. Cancellation stops dispatching new batches; in-flight items
    /// finish and their checkpoints are flushed before returning.
    pub async fn run(&self, stage: Stage, unit: Arc<dyn UnitOfWork>) -> Result<StageResult> {
        let work_set = self
            .checkpoints
            .pending(stage)
            .await
            .context("Failed to load stage work set")?;

        let total = work_set.len();
        if total == 0 {
            info!(stage = %stage, "no pending work");
            return Ok(StageResult::default());
        }

        info!(
            stage = %stage,
            total,
            concurrency = self.config.concurrency,
            batch_size = self.config.batch_size,
            "stage starting"
        );

        let started = Instant::now();
        let mut result = StageResult::default();

        let keys: Vec<String> = work_set.into_iter().map(|r| r.key).collect();
        for batch in keys.chunks(self.config.batch_size.max(1)) {
            if self.cancel.is_cancelled() {
                warn!(stage = %stage, processed = result.processed, "stage cancelled");
                break;
            }

            let batch_result = self.run_batch(stage, batch, unit.clone()).await;
            result.absorb(batch_result);

            let elapsed = started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                result.processed as f64 / elapsed
            } else {
                0.0
            };
            let remaining = total as u64 - result.processed;
            let eta_secs = if rate > 0.0 {
                remaining as f64 / rate
            } else {
                0.0
            };
            info!(
                stage = %stage,
                processed = result.processed,
                total,
                succeeded = result.succeeded,
                failed = result.failed,
                rate_per_sec = format!("{rate:.2}"),
                eta_secs = eta_secs as u64,
                "stage progress"
            );
        }

        info!(
            stage = %stage,
            processed = result.processed,
            succeeded = result.succeeded,
            failed = result.failed,
            elapsed_secs = started.elapsed().as_secs(),
            "stage finished"
        );

        Ok(result)
    }

    async fn run_batch(
        &self,
        stage: Stage,
        batch: &[String],
        unit: Arc<dyn UnitOfWork>,
    ) -> StageResult {
        let outcomes: Vec<(String, UnitOutcome)> = stream::iter(batch.iter().cloned())
            .map(|key| {
                let unit = unit.clone();
                async move {
                    let outcome = unit.process(&key).await;
                    (key, outcome)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut result = StageResult::default();
        for (key, outcome) in outcomes {
            result.processed += 1;
            if outcome.is_success() {
                result.succeeded += 1;
            } else {
                result.failed += 1;
                warn!(stage = %stage, key = %key, error = outcome.error(), "work item failed");
            }

            if let Err(e) = self
                .checkpoints
                .mark(stage, &key, outcome.status(), outcome.attempts(), outcome.error())
                .await
            {
                // A lost mark means one redundant re-attempt next run, not
                // lost data; keep the batch going.
                warn!(stage = %stage, key = %key, error = %e, "failed to mark checkpoint");
            }
        }
        result
    }
}
