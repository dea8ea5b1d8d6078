//! Failure classification.
//!
//! Pure, order-sensitive pattern matching from a raw provider failure to the
//! fixed taxonomy: simulation sentinel markers first, then format validity,
//! then message keywords, then the pipeline's default category. Identical
//! input always yields the identical verdict, which is what makes
//! checkpoint-resume results reproducible. Every verdict carries a non-empty
//! reason.

use lettre::Address;

use crate::model::{SendCategory, ValidationCategory};
use crate::provider::{ProviderError, SIMULATED_ERROR_DOMAIN};

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationVerdict {
    pub category: ValidationCategory,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendVerdict {
    pub category: SendCategory,
    pub reason: String,
}

/// RFC-level format check.
pub fn is_valid_format(email: &str) -> bool {
    email.parse::<Address>().is_ok()
}

fn local_part(email: &str) -> &str {
    email.split_once('@').map_or(email, |(local, _)| local)
}

fn domain_part(email: &str) -> &str {
    email.split_once('@').map_or("", |(_, domain)| domain)
}

/// Classify a failed validation call for `email`.
pub fn classify_validation_failure(email: &str, error: &ProviderError) -> ValidationVerdict {
    // Sentinel markers come first so simulated runs classify identically to
    // what the simulation intended, regardless of message wording.
    if domain_part(email).eq_ignore_ascii_case(SIMULATED_ERROR_DOMAIN) {
        return ValidationVerdict {
            category: ValidationCategory::Hard,
            reason: format!("validation service error: {error}"),
        };
    }
    let local = local_part(email);
    if local.starts_with("soft-bounce") {
        return ValidationVerdict {
            category: ValidationCategory::Soft,
            reason: format!("simulated soft bounce: {error}"),
        };
    }
    if local.starts_with("bounce") {
        return ValidationVerdict {
            category: ValidationCategory::Hard,
            reason: format!("simulated bounce: {error}"),
        };
    }
    if local.starts_with("complaint") {
        return ValidationVerdict {
            category: ValidationCategory::Complaint,
            reason: format!("simulated complaint: {error}"),
        };
    }

    if !is_valid_format(email) {
        return ValidationVerdict {
            category: ValidationCategory::Hard,
            reason: "malformed email address".to_string(),
        };
    }

    let message = error.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("complaint") || lowered.contains("abuse") {
        return ValidationVerdict {
            category: ValidationCategory::Complaint,
            reason: message,
        };
    }
    if error.is_retryable()
        || lowered.contains("mailbox full")
        || lowered.contains("busy")
        || lowered.contains("timeout")
        || lowered.contains("temporar")
    {
        return ValidationVerdict {
            category: ValidationCategory::Soft,
            reason: message,
        };
    }

    ValidationVerdict {
        category: ValidationCategory::Hard,
        reason: if message.is_empty() {
            "validation failed".to_string()
        } else {
            message
        },
    }
}

/// Classify a failed send call for `recipient`.
pub fn classify_send_failure(recipient: &str, error: &ProviderError) -> SendVerdict {
    if let ProviderError::Configuration(message) = error {
        return SendVerdict {
            category: SendCategory::Configuration,
            reason: format!("provider configuration error: {message}"),
        };
    }
    if matches!(error, ProviderError::Throttled { .. }) {
        return SendVerdict {
            category: SendCategory::Quota,
            reason: "provider throttled sending beyond the retry budget".to_string(),
        };
    }

    let local = local_part(recipient);
    if local.starts_with("bounce") {
        return SendVerdict {
            category: SendCategory::Bounce,
            reason: format!("simulated bounce: {error}"),
        };
    }
    if local.starts_with("complaint") {
        return SendVerdict {
            category: SendCategory::Complaint,
            reason: format!("simulated complaint: {error}"),
        };
    }

    let message = error.to_string();
    let lowered = message.to_lowercase();
    let category = if lowered.contains("bounce") {
        SendCategory::Bounce
    } else if lowered.contains("complaint") || lowered.contains("abuse") {
        SendCategory::Complaint
    } else if lowered.contains("quota") || lowered.contains("limit exceeded") {
        SendCategory::Quota
    } else if lowered.contains("auth") || lowered.contains("credential") {
        SendCategory::Authentication
    } else if lowered.contains("config") {
        SendCategory::Configuration
    } else if lowered.contains("dns")
        || lowered.contains("connect")
        || lowered.contains("unreachable")
        || lowered.contains("deliver")
    {
        SendCategory::Delivery
    } else {
        SendCategory::Sending
    };

    SendVerdict {
        category,
        reason: if message.is_empty() {
            "send failed".to_string()
        } else {
            message
        },
    }
}
