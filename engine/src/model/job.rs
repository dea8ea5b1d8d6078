use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Job-level state machine. Moves strictly forward:
/// pending -> processing -> (completed | failed).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Position in the forward-only ordering. Both terminal states share the
    /// same rank; neither may replace the other.
    pub(crate) fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }
}

/// Live progress snapshot for one job, published after every batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: String,
    pub total: usize,
    pub processed: usize,
    pub valid: usize,
    pub invalid: usize,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_batch: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_batches: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl JobProgress {
    pub fn pending(job_id: impl Into<String>, total: usize) -> Self {
        Self {
            job_id: job_id.into(),
            total,
            processed: 0,
            valid: 0,
            invalid: 0,
            status: JobStatus::Pending,
            current_batch: None,
            total_batches: None,
            estimated_completion: None,
            updated_at: Utc::now(),
        }
    }

    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.processed as f32 / self.total as f32) * 100.0
        }
    }
}

/// The job store's record of one job. Created by the caller that accepted
/// the item list; the engine only reads `created_at` (for ETA math) and
/// writes progress through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
}

impl JobRecord {
    pub fn status(&self) -> JobStatus {
        self.progress
            .as_ref()
            .map_or(JobStatus::Pending, |p| p.status)
    }
}
