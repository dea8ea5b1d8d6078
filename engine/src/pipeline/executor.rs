//! Per-item execution with bounded retries.
//!
//! Every call resolves to a terminal result; nothing raised by the provider
//! escapes past this module. Retryable failures wait out the throttle
//! controller's backoff and try again up to the configured attempt budget,
//! then the classifier turns the last failure into result data.

use std::sync::Arc;

use chrono::Utc;

use crate::model::{
    RenderedContent, SendErrorDetail, SendResult, ValidationCategory, ValidationResult, WorkItem,
};
use crate::pipeline::classifier;
use crate::pipeline::throttle::ThrottleController;
use crate::provider::{MailProvider, ProviderError, RenderedMessage};

pub struct ResilientExecutor {
    provider: Arc<dyn MailProvider>,
    throttle: Arc<ThrottleController>,
    max_attempts: u32,
}

impl ResilientExecutor {
    pub fn new(
        provider: Arc<dyn MailProvider>,
        throttle: Arc<ThrottleController>,
        max_attempts: u32,
    ) -> Self {
        Self {
            provider,
            throttle,
            max_attempts: max_attempts.max(1),
        }
    }

    async fn wait_before_retry(&self, attempt: u32, error: &ProviderError) {
        if matches!(error, ProviderError::Throttled { .. }) {
            self.throttle.note_throttle_event();
        }
        let delay = match error {
            ProviderError::Throttled {
                retry_after_ms: Some(ms),
            } => std::cmp::max(
                std::time::Duration::from_millis(*ms),
                self.throttle.backoff_delay(attempt),
            ),
            _ => self.throttle.backoff_delay(attempt),
        };
        tokio::time::sleep(delay).await;
    }

    /// Validate one address. Always yields a terminal result.
    pub async fn validate(&self, item: &WorkItem) -> ValidationResult {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.validate_one(&item.email).await {
                Ok(outcome) if outcome.accepted => return ValidationResult::valid(&item.email),
                Ok(outcome) => {
                    return ValidationResult::invalid(
                        &item.email,
                        outcome.category.unwrap_or(ValidationCategory::Hard),
                        outcome
                            .reason
                            .unwrap_or_else(|| "address rejected by provider".to_string()),
                    );
                }
                Err(error) if error.is_retryable() && attempt < self.max_attempts => {
                    tracing::debug!(
                        email = %item.email,
                        attempt,
                        %error,
                        "validation attempt failed, retrying"
                    );
                    self.wait_before_retry(attempt, &error).await;
                }
                Err(error) => {
                    let verdict = classifier::classify_validation_failure(&item.email, &error);
                    tracing::warn!(
                        email = %item.email,
                        attempts = attempt,
                        category = %verdict.category,
                        "validation failed terminally"
                    );
                    return ValidationResult::invalid(&item.email, verdict.category, verdict.reason);
                }
            }
        }
    }

    /// Send one rendered message. Always yields a terminal result; success
    /// carries the provider message id and the exact content transmitted.
    pub async fn send(&self, item: &WorkItem, message: &RenderedMessage) -> SendResult {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.send_one(message, &item.email).await {
                Ok(outcome) => {
                    return SendResult::delivered(
                        &item.email,
                        outcome.message_id,
                        RenderedContent {
                            subject: message.subject.clone(),
                            body: message.body.clone(),
                        },
                    );
                }
                Err(error) if error.is_retryable() && attempt < self.max_attempts => {
                    tracing::debug!(
                        recipient = %item.email,
                        attempt,
                        %error,
                        "send attempt failed, retrying"
                    );
                    self.wait_before_retry(attempt, &error).await;
                }
                Err(error) => {
                    let verdict = classifier::classify_send_failure(&item.email, &error);
                    tracing::warn!(
                        recipient = %item.email,
                        attempts = attempt,
                        category = %verdict.category,
                        "send failed terminally"
                    );
                    return SendResult::failed(
                        &item.email,
                        verdict.reason,
                        SendErrorDetail {
                            code: Some(error.code().to_string()),
                            category: verdict.category,
                            occurred_at: Utc::now(),
                            retries: attempt - 1,
                        },
                    );
                }
            }
        }
    }
}
