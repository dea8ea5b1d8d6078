use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Validation failure taxonomy.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ValidationCategory {
    /// Permanent: malformed address, non-existent mailbox or domain.
    Hard,
    /// Temporary: mailbox full, server busy; a later run may succeed.
    Soft,
    /// Recipient-side abuse signal.
    Complaint,
}

/// Sending failure taxonomy.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SendCategory {
    Bounce,
    Complaint,
    Delivery,
    Sending,
    Quota,
    Authentication,
    Configuration,
}

/// Terminal per-item outcome, common to both pipelines. Lets the batch
/// coordinator and checkpoint manager account for results without caring
/// which pipeline produced them.
pub trait ItemOutcome: Clone + Send + Sync + Serialize {
    fn identity(&self) -> &str;
    fn is_success(&self) -> bool;
}

/// Outcome of validating one address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub email: String,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ValidationCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn valid(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            valid: true,
            category: None,
            reason: None,
            checked_at: Utc::now(),
        }
    }

    pub fn invalid(
        email: impl Into<String>,
        category: ValidationCategory,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            valid: false,
            category: Some(category),
            reason: Some(reason.into()),
            checked_at: Utc::now(),
        }
    }
}

impl ItemOutcome for ValidationResult {
    fn identity(&self) -> &str {
        &self.email
    }

    fn is_success(&self) -> bool {
        self.valid
    }
}

/// The exact personalized content transmitted for one recipient, kept on the
/// result for audit and preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedContent {
    pub subject: String,
    pub body: String,
}

/// Structured detail attached to a failed send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub category: SendCategory,
    pub occurred_at: DateTime<Utc>,
    /// Retries performed after the first attempt.
    pub retries: u32,
}

/// Outcome of sending one message to one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResult {
    pub email: String,
    pub success: bool,
    pub sent_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<SendErrorDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<RenderedContent>,
}

impl SendResult {
    pub fn delivered(
        email: impl Into<String>,
        message_id: impl Into<String>,
        rendered: RenderedContent,
    ) -> Self {
        Self {
            email: email.into(),
            success: true,
            sent_at: Utc::now(),
            message_id: Some(message_id.into()),
            error: None,
            error_detail: None,
            rendered: Some(rendered),
        }
    }

    pub fn failed(
        email: impl Into<String>,
        error: impl Into<String>,
        detail: SendErrorDetail,
    ) -> Self {
        Self {
            email: email.into(),
            success: false,
            sent_at: Utc::now(),
            message_id: None,
            error: Some(error.into()),
            error_detail: Some(detail),
            rendered: None,
        }
    }
}

impl ItemOutcome for SendResult {
    fn identity(&self) -> &str {
        &self.email
    }

    fn is_success(&self) -> bool {
        self.success
    }
}

/// Retry statistics across the failed items of one sending job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryStats {
    pub total: u32,
    pub max: u32,
    pub average: f64,
}

/// Per-job aggregation of send failures for operational triage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub total_errors: usize,
    pub by_category: BTreeMap<SendCategory, usize>,
    pub retries: RetryStats,
}

impl ErrorReport {
    pub fn from_results(results: &[SendResult]) -> Self {
        let mut report = Self::default();
        let mut retry_counts = Vec::new();

        for detail in results
            .iter()
            .filter(|r| !r.success)
            .filter_map(|r| r.error_detail.as_ref())
        {
            report.total_errors += 1;
            *report.by_category.entry(detail.category).or_insert(0) += 1;
            retry_counts.push(detail.retries);
        }

        if !retry_counts.is_empty() {
            report.retries.total = retry_counts.iter().sum();
            report.retries.max = retry_counts.iter().copied().max().unwrap_or(0);
            report.retries.average =
                f64::from(report.retries.total) / retry_counts.len() as f64;
        }

        report
    }
}
