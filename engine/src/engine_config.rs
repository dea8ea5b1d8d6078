use config::{Config, ConfigError};
use serde::Deserialize;

/// Bounded per-item retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 30_000,
        }
    }
}

/// Provider call pacing. `fast_mode` collapses every delay to a minimal
/// constant so test suites run quickly; production leaves it off.
#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    pub send_rate_per_sec: u32,
    pub minimum_granularity_ms: u64,
    #[serde(default)]
    pub fast_mode: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            send_rate_per_sec: 14,
            minimum_granularity_ms: 10,
            fast_mode: false,
        }
    }
}

/// Checkpoint cadence and durability knobs. The interval is deliberately a
/// tunable rather than a fixed constant.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    /// Save every this many batches; the final batch always saves.
    pub interval_batches: usize,
    /// Retention window handed to the checkpoint store.
    pub ttl_secs: u64,
    /// Upper bound on a single checkpoint write; a slower store is treated
    /// as a failed write and the job moves on. Kept short: checkpointing is
    /// an optimization and must not hold up the batch loop.
    pub write_timeout_ms: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval_batches: 3,
            ttl_secs: 86_400,
            write_timeout_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    pub validation_batch_size: usize,
    pub send_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            validation_batch_size: 100,
            send_batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

impl EngineConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        builder.try_deserialize()
    }

    /// Defaults tuned for tests: minimal delays, short backoff.
    pub fn for_testing() -> Self {
        Self {
            retry: RetryConfig {
                max_attempts: 3,
                backoff_base_ms: 1,
                backoff_cap_ms: 5,
            },
            throttle: ThrottleConfig {
                fast_mode: true,
                ..ThrottleConfig::default()
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.checkpoint.interval_batches, 3);
        assert_eq!(cfg.checkpoint.write_timeout_ms, 1_000);
        assert!(!cfg.throttle.fast_mode);
        assert!(cfg.retry.backoff_cap_ms >= cfg.retry.backoff_base_ms);
    }

    #[test]
    fn partial_config_files_fall_back_to_defaults() {
        let cfg: EngineConfig = Config::builder()
            .add_source(config::File::from_str(
                "[retry]\nmax_attempts = 5\nbackoff_base_ms = 100\nbackoff_cap_ms = 2000\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.batch.send_batch_size, 50);
    }
}
