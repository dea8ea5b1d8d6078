//! Email list validation pipeline.

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine_config::EngineConfig;
use crate::model::{ItemOutcome, ValidationResult, WorkItem};
use crate::pipeline::checkpoint_manager::CheckpointManager;
use crate::pipeline::coordinator::{BatchCoordinator, DispatchMode, ItemOperation};
use crate::pipeline::executor::ResilientExecutor;
use crate::pipeline::progress::ProgressReporter;
use crate::pipeline::throttle::ThrottleController;
use crate::provider::MailProvider;
use crate::store::{CheckpointStore, JobStore};

struct ValidateOp {
    executor: ResilientExecutor,
}

#[async_trait]
impl ItemOperation for ValidateOp {
    type Output = ValidationResult;

    async fn run(&self, item: &WorkItem) -> ValidationResult {
        self.executor.validate(item).await
    }
}

pub struct ValidationPipeline {
    provider: Arc<dyn MailProvider>,
    jobs: Arc<dyn JobStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: EngineConfig,
}

impl ValidationPipeline {
    pub fn new(
        provider: Arc<dyn MailProvider>,
        jobs: Arc<dyn JobStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            jobs,
            checkpoints,
            config,
        }
    }

    /// Validate every address in `items`, resuming from any checkpoint left
    /// by a previous interrupted run of the same job. Completes only once
    /// every item has a terminal result; output identities exactly match
    /// input identities.
    pub async fn validate_batch(
        &self,
        job_id: &str,
        items: &[WorkItem],
        batch_size: usize,
    ) -> Vec<ValidationResult> {
        let reporter = ProgressReporter::new(self.jobs.clone());
        let checkpoint_manager =
            CheckpointManager::new(self.checkpoints.clone(), &self.config.checkpoint);
        let throttle = Arc::new(ThrottleController::new(
            &self.config.throttle,
            &self.config.retry,
        ));

        tracing::info!(job_id, items = items.len(), batch_size, "starting validation job");

        let prior: Vec<ValidationResult> = match checkpoint_manager.load(job_id).await {
            Some(checkpoint) => decode_prior(&checkpoint.results),
            None => Vec::new(),
        };
        let remaining = CheckpointManager::remaining_items(items, &prior);

        let valid = prior.iter().filter(|r| r.valid).count();
        reporter
            .update(job_id, prior.len(), valid, prior.len() - valid, items.len(), None)
            .await;

        let op = ValidateOp {
            executor: ResilientExecutor::new(
                self.provider.clone(),
                throttle.clone(),
                self.config.retry.max_attempts,
            ),
        };

        let coordinator = BatchCoordinator {
            job_id,
            batch_size,
            mode: DispatchMode::Concurrent,
            throttle,
            reporter: &reporter,
            checkpoints: &checkpoint_manager,
        };

        let results = coordinator.run(&remaining, prior, items.len(), &op).await;

        let valid = results.iter().filter(|r| r.valid).count();
        let final_progress = reporter
            .update(
                job_id,
                results.len(),
                valid,
                results.len() - valid,
                items.len(),
                None,
            )
            .await;
        tracing::info!(
            job_id,
            valid,
            invalid = results.len() - valid,
            status = %final_progress.status,
            "validation job finished"
        );

        results
    }
}

/// Decode checkpointed results, dropping entries that no longer parse.
/// A malformed entry means the matching item is processed again, which is
/// safe for validation and preferable to failing the resume.
pub(crate) fn decode_prior<R>(values: &[serde_json::Value]) -> Vec<R>
where
    R: ItemOutcome + serde::de::DeserializeOwned,
{
    values
        .iter()
        .filter_map(|value| match serde_json::from_value(value.clone()) {
            Ok(result) => Some(result),
            Err(error) => {
                tracing::warn!(%error, "dropping undecodable checkpoint entry");
                None
            }
        })
        .collect()
}
