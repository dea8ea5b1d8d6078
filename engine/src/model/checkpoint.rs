use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable record of the items processed so far and their results, written
/// to the checkpoint store at batch boundaries. Results are kept schemaless
/// so one checkpoint shape serves both pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub job_id: String,
    pub processed_emails: Vec<String>,
    pub results: Vec<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        job_id: impl Into<String>,
        processed_emails: Vec<String>,
        results: Vec<serde_json::Value>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            processed_emails,
            results,
            created_at: Utc::now(),
        }
    }
}
