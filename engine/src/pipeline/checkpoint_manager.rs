//! Checkpoint persistence.
//!
//! Checkpoint durability is an optimization, never a correctness
//! requirement: reads that fail are treated as "no checkpoint" and writes
//! that fail or stall are logged and dropped. The job itself is never
//! blocked or failed by this module.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::engine_config::CheckpointConfig;
use crate::model::{Checkpoint, ItemOutcome, WorkItem};
use crate::store::CheckpointStore;

pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    interval_batches: usize,
    ttl: Duration,
    write_timeout: Duration,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>, config: &CheckpointConfig) -> Self {
        Self {
            store,
            interval_batches: config.interval_batches.max(1),
            ttl: Duration::from_secs(config.ttl_secs),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
        }
    }

    /// Best-effort load. Any read or decode failure is logged and treated
    /// as "no checkpoint".
    pub async fn load(&self, job_id: &str) -> Option<Checkpoint> {
        let value = match self.store.get(job_id).await {
            Ok(value) => value?,
            Err(error) => {
                tracing::warn!(job_id, %error, "checkpoint read failed, starting fresh");
                return None;
            }
        };

        match serde_json::from_value::<Checkpoint>(value) {
            Ok(checkpoint) => {
                tracing::info!(
                    job_id,
                    processed = checkpoint.processed_emails.len(),
                    "resuming from checkpoint"
                );
                Some(checkpoint)
            }
            Err(error) => {
                tracing::warn!(job_id, %error, "checkpoint undecodable, starting fresh");
                None
            }
        }
    }

    /// The resume set: `items` minus everything `prior` already covers,
    /// preserving original order. Computed from the decoded results rather
    /// than the checkpoint's email list so an entry that failed to decode
    /// is processed again.
    pub fn remaining_items(items: &[WorkItem], prior: &[impl ItemOutcome]) -> Vec<WorkItem> {
        let processed: HashSet<&str> = prior.iter().map(ItemOutcome::identity).collect();
        items
            .iter()
            .filter(|item| !processed.contains(item.email.as_str()))
            .cloned()
            .collect()
    }

    /// Whether the batch that just finished should be checkpointed.
    /// `batch` is 1-based; the final batch always saves.
    pub fn should_save(&self, batch: usize, total_batches: usize) -> bool {
        batch == total_batches || batch % self.interval_batches == 0
    }

    /// Best-effort save of everything processed so far. Failures and slow
    /// writes are logged and swallowed.
    pub async fn save<R: ItemOutcome>(&self, job_id: &str, results: &[R]) {
        let processed_emails = results.iter().map(|r| r.identity().to_string()).collect();
        let values: Result<Vec<serde_json::Value>, _> =
            results.iter().map(serde_json::to_value).collect();
        let values = match values {
            Ok(values) => values,
            Err(error) => {
                tracing::warn!(job_id, %error, "checkpoint encode failed, skipping save");
                return;
            }
        };

        let checkpoint = Checkpoint::new(job_id, processed_emails, values);
        let payload = match serde_json::to_value(&checkpoint) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(job_id, %error, "checkpoint encode failed, skipping save");
                return;
            }
        };

        match tokio::time::timeout(self.write_timeout, self.store.put(job_id, payload, self.ttl))
            .await
        {
            Ok(Ok(())) => {
                tracing::debug!(job_id, results = results.len(), "checkpoint saved");
            }
            Ok(Err(error)) => {
                tracing::warn!(job_id, %error, "checkpoint write failed, continuing");
            }
            Err(_) => {
                tracing::warn!(job_id, "checkpoint write timed out, continuing");
            }
        }
    }
}
