//! End-to-end pipeline behavior against the in-memory stores and the
//! deterministic simulated provider.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use campaign_engine::engine_config::{RetryConfig, ThrottleConfig};
use campaign_engine::model::{JobStatus, SendCategory, ValidationCategory};
use campaign_engine::provider::SimulatedProvider;
use campaign_engine::store::{InMemoryCheckpointStore, InMemoryJobStore};
use campaign_engine::{
    CampaignTemplate, EngineConfig, EngineError, JobStore, ProviderError, SendOptions,
    SendingPipeline, ValidationPipeline, WorkItem,
};

fn contacts(n: usize) -> Vec<WorkItem> {
    (0..n)
        .map(|i| {
            WorkItem::new(format!("user{i}@example.com"))
                .with_name(format!("User {i}"))
                .with_company("Example Corp")
        })
        .collect()
}

struct Harness {
    provider: Arc<SimulatedProvider>,
    jobs: Arc<InMemoryJobStore>,
    checkpoints: Arc<InMemoryCheckpointStore>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

impl Harness {
    fn new() -> Self {
        init_tracing();
        Self {
            provider: Arc::new(SimulatedProvider::new()),
            jobs: Arc::new(InMemoryJobStore::new()),
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
        }
    }

    fn validation(&self, config: EngineConfig) -> ValidationPipeline {
        ValidationPipeline::new(
            self.provider.clone(),
            self.jobs.clone(),
            self.checkpoints.clone(),
            config,
        )
    }

    fn sending(&self, config: EngineConfig) -> SendingPipeline {
        SendingPipeline::new(
            self.provider.clone(),
            self.jobs.clone(),
            self.checkpoints.clone(),
            config,
        )
    }
}

fn template() -> CampaignTemplate {
    CampaignTemplate::new(
        "Hello {{ name }}",
        "Hi {{ name }}, news from {{ company }} for {{ email }}.",
    )
}

#[tokio::test]
async fn validation_covers_every_item_exactly_once() {
    let harness = Harness::new();
    harness.jobs.create_job("val-1");
    let items = contacts(10);

    let results = harness
        .validation(EngineConfig::for_testing())
        .validate_batch("val-1", &items, 3)
        .await;

    assert_eq!(results.len(), 10);
    let input: HashSet<&str> = items.iter().map(|i| i.email.as_str()).collect();
    let output: HashSet<&str> = results.iter().map(|r| r.email.as_str()).collect();
    assert_eq!(input, output);

    // 4 batches (3,3,3,1): checkpoint after batch 3 and after the final one.
    assert_eq!(harness.checkpoints.put_count(), 2);

    let record = harness.jobs.get_job("val-1").await.unwrap().unwrap();
    assert_eq!(record.status(), JobStatus::Completed);
}

#[tokio::test]
async fn error_domain_sentinel_is_deterministic_across_runs() {
    for run in 0..2 {
        let harness = Harness::new();
        let job_id = format!("sentinel-{run}");
        harness.jobs.create_job(&job_id);
        let items = vec![WorkItem::new("x@error-domain.com")];

        let results = harness
            .validation(EngineConfig::for_testing())
            .validate_batch(&job_id, &items, 1)
            .await;

        assert!(!results[0].valid);
        assert_eq!(results[0].category, Some(ValidationCategory::Hard));
        assert!(results[0]
            .reason
            .as_deref()
            .unwrap()
            .contains("validation service error"));
    }
}

#[tokio::test]
async fn interrupted_validation_resumes_from_checkpoint() {
    let items: Vec<WorkItem> = (0..10)
        .map(|i| {
            // A mix of outcomes so the merge is meaningful.
            let email = match i % 4 {
                0 => format!("bounce-{i}@example.com"),
                1 => format!("complaint-{i}@example.com"),
                _ => format!("user{i}@example.com"),
            };
            WorkItem::new(email)
        })
        .collect();

    // Baseline: one uninterrupted pass.
    let baseline_harness = Harness::new();
    baseline_harness.jobs.create_job("base");
    let baseline = baseline_harness
        .validation(EngineConfig::for_testing())
        .validate_batch("base", &items, 3)
        .await;

    // Interrupted run: the first two batches complete, then the job dies.
    // Re-invoking with the full list resumes from the checkpoint.
    let harness = Harness::new();
    harness.jobs.create_job("resumed");
    let pipeline = harness.validation(EngineConfig::for_testing());
    pipeline.validate_batch("resumed", &items[..6], 3).await;
    let merged = pipeline.validate_batch("resumed", &items, 3).await;

    assert_eq!(merged.len(), 10);
    for item in &items {
        let a = baseline.iter().find(|r| r.email == item.email).unwrap();
        let b = merged.iter().find(|r| r.email == item.email).unwrap();
        assert_eq!(a.valid, b.valid, "{}", item.email);
        assert_eq!(a.category, b.category, "{}", item.email);
    }
}

#[tokio::test]
async fn send_bulk_reports_results_and_error_taxonomy() {
    let harness = Harness::new();
    harness.jobs.create_job("send-1");
    let mut items = contacts(4);
    items.push(WorkItem::new("bounce@example.com").with_name("Bouncy"));
    items.push(WorkItem::new("complaint@example.com").with_name("Grumpy"));

    let report = harness
        .sending(EngineConfig::for_testing())
        .send_bulk("send-1", &template(), &items, SendOptions::default())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 6);
    assert_eq!(report.sent, 4);
    assert_eq!(report.failed, 2);
    assert_eq!(report.errors.total_errors, 2);
    assert_eq!(report.errors.by_category[&SendCategory::Bounce], 1);
    assert_eq!(report.errors.by_category[&SendCategory::Complaint], 1);

    // Successful results carry unique message ids and the exact content sent.
    let ids: HashSet<&str> = report
        .results
        .iter()
        .filter(|r| r.success)
        .map(|r| r.message_id.as_deref().unwrap())
        .collect();
    assert_eq!(ids.len(), 4);
    let rendered = report
        .results
        .iter()
        .find(|r| r.email == "user0@example.com")
        .and_then(|r| r.rendered.as_ref())
        .unwrap();
    assert_eq!(rendered.subject, "Hello User 0");
    assert!(rendered.body.contains("user0@example.com"));

    // Failed results carry a category, a reason and a bounded retry count.
    for result in report.results.iter().filter(|r| !r.success) {
        let detail = result.error_detail.as_ref().unwrap();
        assert!(detail.retries < EngineConfig::for_testing().retry.max_attempts);
        assert!(!result.error.as_deref().unwrap().is_empty());
        assert!(result.message_id.is_none());
    }

    assert!(report.quota.is_some());
    assert!(report.reputation.is_some());
}

#[tokio::test]
async fn interrupted_send_does_not_resend_checkpointed_recipients() {
    let items = contacts(10);

    let harness = Harness::new();
    harness.jobs.create_job("send-resume");
    let pipeline = harness.sending(EngineConfig::for_testing());

    // First invocation covers the first six recipients, then the job dies.
    pipeline
        .send_bulk("send-resume", &template(), &items[..6], SendOptions::default())
        .await
        .unwrap();
    assert_eq!(harness.provider.delivered_count(), 6);

    let report = pipeline
        .send_bulk("send-resume", &template(), &items, SendOptions::default())
        .await
        .unwrap();

    // Only the remaining four reached the provider.
    assert_eq!(harness.provider.delivered_count(), 10);
    assert_eq!(report.results.len(), 10);
    assert_eq!(report.sent, 10);
}

#[tokio::test]
async fn production_throttle_enforces_inter_send_spacing() {
    let harness = Harness::new();
    harness.jobs.create_job("paced");
    let config = EngineConfig {
        throttle: ThrottleConfig {
            send_rate_per_sec: 100,
            minimum_granularity_ms: 10,
            fast_mode: false,
        },
        ..EngineConfig::for_testing()
    };

    let start = Instant::now();
    let report = harness
        .sending(config)
        .send_bulk("paced", &template(), &contacts(6), SendOptions::default())
        .await
        .unwrap();

    // 6 sends at 10ms spacing: at least (6-1) * 10ms of wall time.
    assert!(
        start.elapsed() >= Duration::from_millis(45),
        "elapsed {:?}",
        start.elapsed()
    );
    assert_eq!(report.sent, 6);
    assert!(report.throttling.configured_rate_per_sec == 100.0);
    assert!(report.throttling.actual_rate_per_sec <= 110.0);

    let instants = harness.provider.send_instants();
    for pair in instants.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(8));
    }
}

#[tokio::test]
async fn retry_after_transient_failure_respects_send_spacing() {
    let harness = Harness::new();
    harness.jobs.create_job("retry-paced");
    harness
        .provider
        .script_failure("user0@example.com", ProviderError::Transient("blip".into()));
    let config = EngineConfig {
        throttle: ThrottleConfig {
            send_rate_per_sec: 10,
            minimum_granularity_ms: 10,
            fast_mode: false,
        },
        retry: RetryConfig {
            max_attempts: 3,
            backoff_base_ms: 1,
            backoff_cap_ms: 5_000,
        },
        ..EngineConfig::for_testing()
    };

    let report = harness
        .sending(config)
        .send_bulk("retry-paced", &template(), &contacts(1), SendOptions::default())
        .await
        .unwrap();

    assert_eq!(report.sent, 1);
    let instants = harness.provider.send_instants();
    assert_eq!(instants.len(), 2);
    // The retry waits out the spacing even though the backoff base is 1ms.
    assert!(
        instants[1].duration_since(instants[0]) >= Duration::from_millis(90),
        "retry spacing {:?}",
        instants[1].duration_since(instants[0])
    );
}

#[tokio::test]
async fn progress_snapshots_are_monotonic() {
    let harness = Harness::new();
    harness.jobs.create_job("mono");
    harness
        .validation(EngineConfig::for_testing())
        .validate_batch("mono", &contacts(9), 2)
        .await;

    let snapshots = harness.jobs.snapshots();
    assert!(!snapshots.is_empty());
    for pair in snapshots.windows(2) {
        assert!(pair[1].processed >= pair[0].processed);
        assert!(pair[1].valid >= pair[0].valid);
        assert!(pair[1].invalid >= pair[0].invalid);
        assert!(pair[1].processed <= pair[1].total);
        assert!(pair[1].valid + pair[1].invalid <= pair[1].processed);
    }
    assert_eq!(snapshots.last().unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn misconfigured_provider_fails_the_job_before_any_send() {
    let harness = Harness::new();
    let provider = Arc::new(SimulatedProvider::misconfigured());
    harness.jobs.create_job("bad-config");

    let pipeline = SendingPipeline::new(
        provider.clone(),
        harness.jobs.clone(),
        harness.checkpoints.clone(),
        EngineConfig::for_testing(),
    );
    let error = pipeline
        .send_bulk("bad-config", &template(), &contacts(3), SendOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(error, EngineError::Configuration(_)));
    assert_eq!(provider.delivered_count(), 0);
    assert!(provider.send_instants().is_empty());

    let record = harness.jobs.get_job("bad-config").await.unwrap().unwrap();
    assert_eq!(record.status(), JobStatus::Failed);
}

#[tokio::test]
async fn broken_template_fails_the_job_before_any_send() {
    let harness = Harness::new();
    harness.jobs.create_job("bad-template");

    let broken = CampaignTemplate::new("Hello {{ name", "body");
    let error = harness
        .sending(EngineConfig::for_testing())
        .send_bulk("bad-template", &broken, &contacts(3), SendOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(error, EngineError::Template(_)));
    assert_eq!(harness.provider.delivered_count(), 0);
    let record = harness.jobs.get_job("bad-template").await.unwrap().unwrap();
    assert_eq!(record.status(), JobStatus::Failed);
}

#[tokio::test]
async fn checkpoint_store_outage_never_fails_the_job() {
    let harness = Harness::new();
    harness.jobs.create_job("flaky-store");
    harness.checkpoints.fail_reads(true);
    harness.checkpoints.fail_writes(true);

    let results = harness
        .validation(EngineConfig::for_testing())
        .validate_batch("flaky-store", &contacts(7), 3)
        .await;

    assert_eq!(results.len(), 7);
    let record = harness.jobs.get_job("flaky-store").await.unwrap().unwrap();
    assert_eq!(record.status(), JobStatus::Completed);
}
