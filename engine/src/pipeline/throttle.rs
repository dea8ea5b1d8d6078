//! Provider call pacing.
//!
//! A leaky bucket enforces the configured inter-send spacing; a separate
//! capped exponential backoff handles throttle signals from the provider.
//! In fast mode (test execution) every delay collapses to a minimal
//! constant.

use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::Arc;
use std::time::{Duration, Instant};

use leaky_bucket::RateLimiter;
use serde::{Deserialize, Serialize};

use crate::engine_config::{RetryConfig, ThrottleConfig};

const FAST_MODE_INTERVAL: Duration = Duration::from_millis(1);

/// Configured versus achieved pacing for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleSummary {
    pub configured_rate_per_sec: f64,
    pub actual_rate_per_sec: f64,
    pub throttle_events: u64,
}

pub struct ThrottleController {
    limiter: Arc<RateLimiter>,
    interval: Duration,
    rate_per_sec: u32,
    fast_mode: bool,
    backoff_base: Duration,
    backoff_cap: Duration,
    throttle_events: AtomicU64,
    started: Instant,
}

impl ThrottleController {
    pub fn new(throttle: &ThrottleConfig, retry: &RetryConfig) -> Self {
        let interval = if throttle.fast_mode {
            FAST_MODE_INTERVAL
        } else {
            // max(minimum granularity, 1000 / R)
            Duration::from_millis(
                (1_000 / u64::from(throttle.send_rate_per_sec.max(1)))
                    .max(throttle.minimum_granularity_ms),
            )
        };

        let limiter = RateLimiter::builder()
            .initial(1)
            .interval(interval)
            .max(1)
            .refill(1)
            .build();

        Self {
            limiter: Arc::new(limiter),
            interval,
            rate_per_sec: throttle.send_rate_per_sec,
            fast_mode: throttle.fast_mode,
            backoff_base: Duration::from_millis(retry.backoff_base_ms),
            backoff_cap: Duration::from_millis(retry.backoff_cap_ms),
            throttle_events: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Wait until the next provider call may be issued.
    pub async fn acquire(&self) {
        self.limiter.acquire_one().await;
    }

    /// Delay before retry number `attempt` (1-based), exponential and
    /// capped so one item can never stall the job indefinitely. Never
    /// shorter than the inter-call interval: a retry must not reach the
    /// provider faster than the configured rate allows.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.fast_mode {
            return FAST_MODE_INTERVAL;
        }
        let exp = self
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        exp.min(self.backoff_cap).max(self.interval)
    }

    /// Record that the provider signalled throttling.
    pub fn note_throttle_event(&self) {
        self.throttle_events.fetch_add(1, Relaxed);
        tracing::info!("provider throttling signalled, backing off");
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Achieved rate over the controller's lifetime so far.
    pub fn summary(&self, item_count: usize) -> ThrottleSummary {
        let wall_ms = self.started.elapsed().as_millis().max(1) as f64;
        ThrottleSummary {
            configured_rate_per_sec: f64::from(self.rate_per_sec),
            actual_rate_per_sec: item_count as f64 * 1_000.0 / wall_ms,
            throttle_events: self.throttle_events.load(Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(rate: u32, fast_mode: bool) -> ThrottleController {
        ThrottleController::new(
            &ThrottleConfig {
                send_rate_per_sec: rate,
                minimum_granularity_ms: 10,
                fast_mode,
            },
            &RetryConfig {
                max_attempts: 3,
                backoff_base_ms: 1_000,
                backoff_cap_ms: 30_000,
            },
        )
    }

    #[test]
    fn interval_is_inverse_rate_with_granularity_floor() {
        assert_eq!(controller(2, false).interval(), Duration::from_millis(500));
        assert_eq!(controller(500, false).interval(), Duration::from_millis(10));
        assert_eq!(controller(0, false).interval(), Duration::from_secs(1));
    }

    #[test]
    fn fast_mode_collapses_delays() {
        let c = controller(2, true);
        assert_eq!(c.interval(), Duration::from_millis(1));
        assert_eq!(c.backoff_delay(3), Duration::from_millis(1));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let c = controller(2, false);
        assert_eq!(c.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(c.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(c.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(c.backoff_delay(10), Duration::from_secs(30));
        assert_eq!(c.backoff_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn backoff_never_undercuts_send_spacing() {
        let c = ThrottleController::new(
            &ThrottleConfig {
                send_rate_per_sec: 10,
                minimum_granularity_ms: 10,
                fast_mode: false,
            },
            &RetryConfig {
                max_attempts: 3,
                backoff_base_ms: 1,
                backoff_cap_ms: 5_000,
            },
        );
        assert_eq!(c.interval(), Duration::from_millis(100));
        // A 1ms base would outrun the 100ms spacing; the floor holds it.
        assert_eq!(c.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(c.backoff_delay(8), Duration::from_millis(128));
    }

    #[tokio::test]
    async fn acquire_spaces_calls() {
        let c = controller(100, false); // 10ms interval
        let start = Instant::now();
        for _ in 0..4 {
            c.acquire().await;
        }
        // First acquire is immediate, the next three wait one interval each.
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn summary_reports_both_rates() {
        let c = controller(2, false);
        std::thread::sleep(Duration::from_millis(20));
        let summary = c.summary(10);
        assert_eq!(summary.configured_rate_per_sec, 2.0);
        assert!(summary.actual_rate_per_sec > 0.0);
        assert_eq!(summary.throttle_events, 0);
    }
}
