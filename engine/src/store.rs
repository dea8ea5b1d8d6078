//! Collaborator store contracts and in-memory fakes.
//!
//! The engine only depends on these traits; the durable implementations
//! (database, key-value store with TTL) live with the embedding service.
//! The in-memory fakes are first-class so callers can substitute them in
//! tests without reimplementing the contracts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::Relaxed};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::model::{JobProgress, JobRecord};

/// Durable job metadata and progress. Read by status APIs at any time.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_job(&self, job_id: &str) -> anyhow::Result<Option<JobRecord>>;

    async fn update_job(&self, job_id: &str, progress: JobProgress) -> anyhow::Result<()>;
}

/// Checkpoint blobs with a finite retention window. Failures on either call
/// are non-fatal to the engine.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, job_id: &str) -> anyhow::Result<Option<serde_json::Value>>;

    async fn put(
        &self,
        job_id: &str,
        checkpoint: serde_json::Value,
        ttl: Duration,
    ) -> anyhow::Result<()>;
}

/// In-memory job store. Keeps every published snapshot so tests can assert
/// progress monotonicity.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
    history: Mutex<Vec<JobProgress>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job the way the accepting API layer would.
    pub fn create_job(&self, job_id: &str) {
        self.jobs.lock().unwrap().insert(
            job_id.to_string(),
            JobRecord {
                id: job_id.to_string(),
                created_at: Utc::now(),
                progress: None,
            },
        );
    }

    pub fn snapshots(&self) -> Vec<JobProgress> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get_job(&self, job_id: &str) -> anyhow::Result<Option<JobRecord>> {
        Ok(self.jobs.lock().unwrap().get(job_id).cloned())
    }

    async fn update_job(&self, job_id: &str, progress: JobProgress) -> anyhow::Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let record = jobs
            .entry(job_id.to_string())
            .or_insert_with(|| JobRecord {
                id: job_id.to_string(),
                created_at: Utc::now(),
                progress: None,
            });
        record.progress = Some(progress.clone());
        self.history.lock().unwrap().push(progress);
        Ok(())
    }
}

/// In-memory checkpoint store with failure injection for exercising the
/// best-effort write path.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, serde_json::Value>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    put_count: AtomicUsize,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Relaxed);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Relaxed);
    }

    /// Number of `put` calls that reached the store, including failed ones.
    pub fn put_count(&self) -> usize {
        self.put_count.load(Relaxed)
    }

    pub fn stored(&self, job_id: &str) -> Option<serde_json::Value> {
        self.checkpoints.lock().unwrap().get(job_id).cloned()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get(&self, job_id: &str) -> anyhow::Result<Option<serde_json::Value>> {
        if self.fail_reads.load(Relaxed) {
            anyhow::bail!("injected checkpoint read failure");
        }
        Ok(self.checkpoints.lock().unwrap().get(job_id).cloned())
    }

    async fn put(
        &self,
        job_id: &str,
        checkpoint: serde_json::Value,
        _ttl: Duration,
    ) -> anyhow::Result<()> {
        self.put_count.fetch_add(1, Relaxed);
        if self.fail_writes.load(Relaxed) {
            anyhow::bail!("injected checkpoint write failure");
        }
        self.checkpoints
            .lock()
            .unwrap()
            .insert(job_id.to_string(), checkpoint);
        Ok(())
    }
}
