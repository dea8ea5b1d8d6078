//! Bulk campaign sending pipeline.
//!
//! Sends are paced one provider call at a time behind the throttle; the
//! inter-item delay is the rate limit. Provider configuration and the
//! campaign template are verified before any item is attempted, and those
//! are the only conditions that fail the whole job.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine_config::{EngineConfig, ThrottleConfig};
use crate::error::{EngineError, EngineResult};
use crate::model::{ErrorReport, SendResult, WorkItem};
use crate::pipeline::checkpoint_manager::CheckpointManager;
use crate::pipeline::coordinator::{BatchCoordinator, DispatchMode, ItemOperation};
use crate::pipeline::executor::ResilientExecutor;
use crate::pipeline::progress::ProgressReporter;
use crate::pipeline::throttle::{ThrottleController, ThrottleSummary};
use crate::pipeline::validation::decode_prior;
use crate::provider::{MailProvider, QuotaUsage, ReputationMetrics};
use crate::store::{CheckpointStore, JobStore};
use crate::template::CampaignTemplate;

/// Per-job overrides for the configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendOptions {
    pub rate_per_sec: Option<u32>,
    pub batch_size: Option<usize>,
}

/// Everything a send job produced, for the caller and the operator.
#[derive(Debug, Clone, Serialize)]
pub struct SendReport {
    pub results: Vec<SendResult>,
    pub sent: usize,
    pub failed: usize,
    pub throttling: ThrottleSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reputation: Option<ReputationMetrics>,
    pub errors: ErrorReport,
}

struct SendOp {
    executor: ResilientExecutor,
    template: CampaignTemplate,
}

#[async_trait]
impl ItemOperation for SendOp {
    type Output = SendResult;

    async fn run(&self, item: &WorkItem) -> SendResult {
        let message = match self.template.render(item) {
            Ok(message) => message,
            Err(error) => {
                // The template compiled at job start, so a per-item render
                // failure is exotic; capture it as data like any other.
                return SendResult::failed(
                    &item.email,
                    format!("template rendering failed: {error}"),
                    crate::model::SendErrorDetail {
                        code: None,
                        category: crate::model::SendCategory::Sending,
                        occurred_at: chrono::Utc::now(),
                        retries: 0,
                    },
                );
            }
        };
        self.executor.send(item, &message).await
    }
}

pub struct SendingPipeline {
    provider: Arc<dyn MailProvider>,
    jobs: Arc<dyn JobStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: EngineConfig,
}

impl SendingPipeline {
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

    /// Send `template` to every item, resuming from any checkpoint left by
    /// a previous interrupted run of the same job. Every input identity
    /// appears in the report exactly once.
    pub async fn send_bulk(
        &self,
        job_id: &str,
        template: &CampaignTemplate,
        items: &[WorkItem],
        options: SendOptions,
    ) -> EngineResult<SendReport> {
        let started = std::time::Instant::now();
        let reporter = ProgressReporter::new(self.jobs.clone());

        // Escalate misconfiguration before any item is attempted.
        if let Err(error) = self.provider.check_configuration().await {
            reporter.fail(job_id, &error.to_string()).await;
            return Err(EngineError::Configuration(error.to_string()));
        }
        if let Err(error) = template.validate() {
            reporter.fail(job_id, &error.to_string()).await;
            return Err(error);
        }

        let throttle_config = ThrottleConfig {
            send_rate_per_sec: options
                .rate_per_sec
                .unwrap_or(self.config.throttle.send_rate_per_sec),
            ..self.config.throttle.clone()
        };
        let batch_size = options
            .batch_size
            .unwrap_or(self.config.batch.send_batch_size);

        let checkpoint_manager =
            CheckpointManager::new(self.checkpoints.clone(), &self.config.checkpoint);
        let throttle = Arc::new(ThrottleController::new(
            &throttle_config,
            &self.config.retry,
        ));

        tracing::info!(
            job_id,
            recipients = items.len(),
            batch_size,
            rate_per_sec = throttle_config.send_rate_per_sec,
            "starting send job"
        );

        let prior: Vec<SendResult> = match checkpoint_manager.load(job_id).await {
            Some(checkpoint) => decode_prior(&checkpoint.results),
            None => Vec::new(),
        };
        let remaining = CheckpointManager::remaining_items(items, &prior);

        let sent = prior.iter().filter(|r| r.success).count();
        reporter
            .update(job_id, prior.len(), sent, prior.len() - sent, items.len(), None)
            .await;

        let op = SendOp {
            executor: ResilientExecutor::new(
                self.provider.clone(),
                throttle.clone(),
                self.config.retry.max_attempts,
            ),
            template: template.clone(),
        };

        let coordinator = BatchCoordinator {
            job_id,
            batch_size,
            mode: DispatchMode::Paced,
            throttle: throttle.clone(),
            reporter: &reporter,
            checkpoints: &checkpoint_manager,
        };

        let results = coordinator.run(&remaining, prior, items.len(), &op).await;
        let throttling = throttle.summary(remaining.len());

        let sent = results.iter().filter(|r| r.success).count();
        let failed = results.len() - sent;
        reporter
            .update(job_id, results.len(), sent, failed, items.len(), None)
            .await;

        // Reporting side-channels; their failures never taint the job.
        let quota = match self.provider.quota().await {
            Ok(quota) => Some(quota),
            Err(error) => {
                tracing::debug!(job_id, %error, "quota lookup failed");
                None
            }
        };
        let reputation = match self.provider.reputation().await {
            Ok(reputation) => Some(reputation),
            Err(error) => {
                tracing::debug!(job_id, %error, "reputation lookup failed");
                None
            }
        };

        let errors = ErrorReport::from_results(&results);
        tracing::info!(
            job_id,
            sent,
            failed,
            throttle_events = throttling.throttle_events,
            elapsed = %crate::observability::format_elapsed(started.elapsed().as_secs()),
            "send job finished"
        );

        Ok(SendReport {
            results,
            sent,
            failed,
            throttling,
            quota,
            reputation,
            errors,
        })
    }
}
