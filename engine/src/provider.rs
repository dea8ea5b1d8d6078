use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use derive_more::derive::Display;
use serde::{Deserialize, Serialize};

use crate::model::ValidationCategory;

/// A fully personalized message, ready to hand to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Provider verdict for one address.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub accepted: bool,
    pub category: Option<ValidationCategory>,
    pub reason: Option<String>,
}

impl ValidationOutcome {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            category: None,
            reason: None,
        }
    }

    pub fn rejected(category: ValidationCategory, reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            category: Some(category),
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub message_id: String,
}

/// Raw failure from a provider call, before classification.
#[derive(Debug, Clone, Display)]
pub enum ProviderError {
    /// The provider asked us to slow down.
    #[display("provider throttled the request")]
    Throttled { retry_after_ms: Option<u64> },
    /// Worth retrying after a backoff.
    #[display("transient provider failure: {_0}")]
    Transient(String),
    /// Retrying will not help.
    #[display("permanent provider failure: {_0}")]
    Permanent(String),
    /// Credentials or provider setup are unusable.
    #[display("provider configuration error: {_0}")]
    Configuration(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Throttled { .. } | ProviderError::Transient(_)
        )
    }

    /// Stable short code carried onto send error details.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::Throttled { .. } => "throttled",
            ProviderError::Transient(_) => "transient",
            ProviderError::Permanent(_) => "permanent",
            ProviderError::Configuration(_) => "configuration",
        }
    }
}

impl std::error::Error for ProviderError {}

/// Provider quota snapshot, reported on send jobs. Never used for control
/// flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub daily_limit: u64,
    pub sent_last_24h: u64,
    pub max_send_rate: f64,
}

/// Sender reputation snapshot, reported on send jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationMetrics {
    pub bounce_rate: f64,
    pub complaint_rate: f64,
}

/// The external mail-acceptance provider. Treated as a black box that
/// accepts, rejects, or throttles; every call is a suspension point.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Cheap credential/setup check, run before any item is attempted.
    async fn check_configuration(&self) -> Result<(), ProviderError>;

    async fn validate_one(&self, email: &str) -> Result<ValidationOutcome, ProviderError>;

    async fn send_one(
        &self,
        message: &RenderedMessage,
        recipient: &str,
    ) -> Result<SendOutcome, ProviderError>;

    /// Reporting side-channel.
    async fn quota(&self) -> Result<QuotaUsage, ProviderError>;

    /// Reporting side-channel.
    async fn reputation(&self) -> Result<ReputationMetrics, ProviderError>;
}

/// Domain that deterministically fails provider calls. The classifier also
/// knows about it, so simulated failures classify identically across runs.
pub const SIMULATED_ERROR_DOMAIN: &str = "error-domain.com";

/// Deterministic in-process provider for non-production runs and tests.
/// Behavior is driven entirely by address markers: the local part prefixes
/// `bounce`, `soft-bounce` and `complaint` simulate the matching rejection,
/// and any address at [`SIMULATED_ERROR_DOMAIN`] fails the call outright.
pub struct SimulatedProvider {
    configured: bool,
    seq: AtomicU64,
    send_instants: Mutex<Vec<Instant>>,
    scripted: Mutex<HashMap<String, VecDeque<ProviderError>>>,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self {
            configured: true,
            seq: AtomicU64::new(0),
            send_instants: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
        }
    }

    /// A provider whose configuration check fails, for exercising whole-job
    /// escalation.
    pub fn misconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    /// Queue a one-shot failure for the next call touching `email`.
    /// Queued failures are consumed in order before normal simulation.
    pub fn script_failure(&self, email: &str, error: ProviderError) {
        self.scripted
            .lock()
            .unwrap()
            .entry(email.to_string())
            .or_default()
            .push_back(error);
    }

    /// Wall-clock instants of every `send_one` call, for pacing assertions.
    pub fn send_instants(&self) -> Vec<Instant> {
        self.send_instants.lock().unwrap().clone()
    }

    /// Number of messages accepted by the simulation so far.
    pub fn delivered_count(&self) -> u64 {
        self.seq.load(Relaxed)
    }

    fn next_scripted(&self, email: &str) -> Option<ProviderError> {
        self.scripted
            .lock()
            .unwrap()
            .get_mut(email)
            .and_then(VecDeque::pop_front)
    }

    fn local_and_domain(email: &str) -> (&str, &str) {
        match email.split_once('@') {
            Some((local, domain)) => (local, domain),
            None => (email, ""),
        }
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailProvider for SimulatedProvider {
    async fn check_configuration(&self) -> Result<(), ProviderError> {
        if self.configured {
            Ok(())
        } else {
            Err(ProviderError::Configuration(
                "missing provider credentials".to_string(),
            ))
        }
    }

    async fn validate_one(&self, email: &str) -> Result<ValidationOutcome, ProviderError> {
        if let Some(error) = self.next_scripted(email) {
            return Err(error);
        }

        let (local, domain) = Self::local_and_domain(email);
        if domain.eq_ignore_ascii_case(SIMULATED_ERROR_DOMAIN) {
            return Err(ProviderError::Permanent(
                "validation service error: simulated provider outage".to_string(),
            ));
        }
        if !crate::pipeline::classifier::is_valid_format(email) {
            return Ok(ValidationOutcome::rejected(
                ValidationCategory::Hard,
                "malformed address",
            ));
        }
        if local.starts_with("soft-bounce") {
            return Ok(ValidationOutcome::rejected(
                ValidationCategory::Soft,
                "mailbox temporarily full",
            ));
        }
        if local.starts_with("bounce") {
            return Ok(ValidationOutcome::rejected(
                ValidationCategory::Hard,
                "mailbox does not exist",
            ));
        }
        if local.starts_with("complaint") {
            return Ok(ValidationOutcome::rejected(
                ValidationCategory::Complaint,
                "recipient flagged sender as spam",
            ));
        }

        Ok(ValidationOutcome::accepted())
    }

    async fn send_one(
        &self,
        _message: &RenderedMessage,
        recipient: &str,
    ) -> Result<SendOutcome, ProviderError> {
        self.send_instants.lock().unwrap().push(Instant::now());

        if let Some(error) = self.next_scripted(recipient) {
            return Err(error);
        }

        let (local, domain) = Self::local_and_domain(recipient);
        if domain.eq_ignore_ascii_case(SIMULATED_ERROR_DOMAIN) {
            return Err(ProviderError::Permanent(
                "delivery refused: simulated provider outage".to_string(),
            ));
        }
        if local.starts_with("bounce") {
            return Err(ProviderError::Permanent(
                "550 message bounced: unknown recipient".to_string(),
            ));
        }
        if local.starts_with("complaint") {
            return Err(ProviderError::Permanent(
                "recipient complaint on record, delivery suppressed".to_string(),
            ));
        }

        let id = self.seq.fetch_add(1, Relaxed);
        Ok(SendOutcome {
            message_id: format!("sim-{id:08}"),
        })
    }

    async fn quota(&self) -> Result<QuotaUsage, ProviderError> {
        Ok(QuotaUsage {
            daily_limit: 50_000,
            sent_last_24h: self.seq.load(Relaxed),
            max_send_rate: 14.0,
        })
    }

    async fn reputation(&self) -> Result<ReputationMetrics, ProviderError> {
        Ok(ReputationMetrics {
            bounce_rate: 0.0012,
            complaint_rate: 0.0002,
        })
    }
}
