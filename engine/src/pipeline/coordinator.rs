//! Batch orchestration.
//!
//! Slices the remaining work into consecutive fixed-size batches and drives
//! the per-item operation over each one. Batches run strictly in sequence;
//! after each batch the accumulated counts go to the progress reporter and,
//! on cadence, to the checkpoint manager. An individual item failure is
//! already data by the time it reaches this module, so nothing here aborts
//! the batch or the job.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::model::{ItemOutcome, WorkItem};
use crate::pipeline::checkpoint_manager::CheckpointManager;
use crate::pipeline::progress::ProgressReporter;
use crate::pipeline::throttle::ThrottleController;

/// One provider-backed operation over one item, always yielding a terminal
/// result.
#[async_trait]
pub trait ItemOperation: Send + Sync {
    type Output: ItemOutcome;

    async fn run(&self, item: &WorkItem) -> Self::Output;
}

/// How items inside one batch are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Items run concurrently; validation has no inter-item ordering
    /// requirement. Result order still matches input order.
    Concurrent,
    /// One provider call at a time behind the throttle; for sending, the
    /// inter-item delay is the rate limit being enforced.
    Paced,
}

pub struct BatchCoordinator<'a> {
    pub job_id: &'a str,
    pub batch_size: usize,
    pub mode: DispatchMode,
    pub throttle: Arc<ThrottleController>,
    pub reporter: &'a ProgressReporter,
    pub checkpoints: &'a CheckpointManager,
}

impl<'a> BatchCoordinator<'a> {
    /// Process `remaining` on top of `prior` results (from a checkpoint),
    /// returning the full accumulated result list. `total` is the size of
    /// the job's complete item list.
    pub async fn run<Op: ItemOperation>(
        &self,
        remaining: &[WorkItem],
        prior: Vec<Op::Output>,
        total: usize,
        op: &Op,
    ) -> Vec<Op::Output> {
        let batch_size = self.batch_size.max(1);
        let total_batches = remaining.len().div_ceil(batch_size);

        let mut results = prior;
        let mut valid = results.iter().filter(|r| r.is_success()).count();
        let mut invalid = results.len() - valid;

        for (index, chunk) in remaining.chunks(batch_size).enumerate() {
            let batch = index + 1;
            tracing::debug!(
                job_id = self.job_id,
                batch,
                total_batches,
                size = chunk.len(),
                "processing batch"
            );

            let outcomes = match self.mode {
                DispatchMode::Concurrent => {
                    join_all(chunk.iter().map(|item| op.run(item))).await
                }
                DispatchMode::Paced => {
                    let mut outcomes = Vec::with_capacity(chunk.len());
                    for item in chunk {
                        self.throttle.acquire().await;
                        outcomes.push(op.run(item).await);
                    }
                    outcomes
                }
            };

            for outcome in outcomes {
                if outcome.is_success() {
                    valid += 1;
                } else {
                    invalid += 1;
                }
                results.push(outcome);
            }

            self.reporter
                .update(
                    self.job_id,
                    results.len(),
                    valid,
                    invalid,
                    total,
                    Some((batch, total_batches)),
                )
                .await;

            if self.checkpoints.should_save(batch, total_batches) {
                self.checkpoints.save(self.job_id, &results).await;
            }
        }

        results
    }
}
