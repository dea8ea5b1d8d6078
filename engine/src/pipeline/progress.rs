//! Progress publication and ETA estimation.
//!
//! Snapshots are computed after every batch and written to the job store.
//! Store failures are logged and swallowed; the computed snapshot is always
//! returned to the caller. Status only ever moves forward.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::model::{JobProgress, JobStatus};
use crate::observability::format_table;
use crate::store::JobStore;

#[derive(Clone)]
pub struct ProgressReporter {
    jobs: Arc<dyn JobStore>,
}

impl ProgressReporter {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }

    /// Publish a snapshot for `job_id`. Returns the snapshot that is now
    /// current: the freshly computed one, or the stored one when the stored
    /// status is already further along.
    pub async fn update(
        &self,
        job_id: &str,
        processed: usize,
        valid: usize,
        invalid: usize,
        total: usize,
        batch: Option<(usize, usize)>,
    ) -> JobProgress {
        let record = match self.jobs.get_job(job_id).await {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(job_id, %error, "job record read failed, publishing blind");
                None
            }
        };

        let status = compute_status(processed, total);
        let estimated_completion = record
            .as_ref()
            .filter(|_| processed > 0 && processed < total)
            .and_then(|r| estimate_completion(r.created_at, processed, total));

        let progress = JobProgress {
            job_id: job_id.to_string(),
            total,
            processed,
            valid,
            invalid,
            status,
            current_batch: batch.map(|(current, _)| current),
            total_batches: batch.map(|(_, total)| total),
            estimated_completion,
            updated_at: Utc::now(),
        };

        if let Some(stored) = record.as_ref().and_then(|r| r.progress.as_ref()) {
            if stored.status.rank() > progress.status.rank()
                || (stored.status.is_terminal() && stored.status != progress.status)
            {
                tracing::warn!(
                    job_id,
                    stored = %stored.status,
                    attempted = %progress.status,
                    "refusing status regression"
                );
                return stored.clone();
            }
        }

        if let Err(error) = self.jobs.update_job(job_id, progress.clone()).await {
            tracing::warn!(job_id, %error, "progress write failed, continuing");
        }

        self.log_snapshot(&progress);
        progress
    }

    /// Mark the whole job failed, preserving whatever counts were last
    /// published.
    pub async fn fail(&self, job_id: &str, reason: &str) {
        let last = match self.jobs.get_job(job_id).await {
            Ok(Some(record)) => record.progress,
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(job_id, %error, "job record read failed during fail");
                None
            }
        };

        let mut progress = last.unwrap_or_else(|| JobProgress::pending(job_id, 0));
        if progress.status == JobStatus::Completed {
            tracing::warn!(job_id, "job already completed, not marking failed");
            return;
        }
        progress.status = JobStatus::Failed;
        progress.estimated_completion = None;
        progress.updated_at = Utc::now();

        tracing::error!(job_id, reason, "job failed");
        if let Err(error) = self.jobs.update_job(job_id, progress).await {
            tracing::warn!(job_id, %error, "failed-status write failed");
        }
    }

    fn log_snapshot(&self, progress: &JobProgress) {
        let batch = match (progress.current_batch, progress.total_batches) {
            (Some(current), Some(total)) => format!("{current}/{total}"),
            _ => "-".to_string(),
        };
        let eta = progress
            .estimated_completion
            .map_or_else(|| "-".to_string(), |t| t.format("%H:%M:%S").to_string());
        let row = vec![
            progress.job_id.clone(),
            progress.status.to_string(),
            format!(
                "{}/{} ({:.0}%)",
                progress.processed,
                progress.total,
                progress.percentage()
            ),
            batch,
            eta,
        ];
        tracing::info!(
            "Job Progress:\n{}",
            format_table(&["Job", "Status", "Progress", "Batch", "ETA"], &row)
        );
    }
}

fn compute_status(processed: usize, total: usize) -> JobStatus {
    if total == 0 || processed >= total {
        JobStatus::Completed
    } else if processed == 0 {
        JobStatus::Pending
    } else {
        JobStatus::Processing
    }
}

/// Extrapolate completion time from the average per-item wall time since the
/// job was created. Best-effort; `None` when the math degenerates.
fn estimate_completion(
    created_at: DateTime<Utc>,
    processed: usize,
    total: usize,
) -> Option<DateTime<Utc>> {
    let elapsed_ms = (Utc::now() - created_at).num_milliseconds();
    if elapsed_ms <= 0 {
        return None;
    }
    let per_item_ms = elapsed_ms as f64 / processed as f64;
    let remaining_ms = per_item_ms * (total - processed) as f64;
    Some(Utc::now() + Duration::milliseconds(remaining_ms as i64))
}
