//! Worker pool settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent worker loops.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Sleep between polls when the queue is empty.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Tasks claimed per poll by each worker.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Claimed tasks not finished within this window are redelivered.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Delivery cap for kinds without their own.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
}

fn default_concurrency() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> u32 {
    10
}

fn default_retry_base_delay_ms() -> u64 {
    5_000
}

fn default_retry_max_delay_ms() -> u64 {
    3_600_000
}

fn default_visibility_timeout_secs() -> u64 {
    1800
}

fn default_max_attempts() -> u32 {
    25
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            default_max_attempts: default_max_attempts(),
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("workers.concurrency must be > 0".into());
        }
        if self.batch_size == 0 {
            return Err("workers.batch_size must be > 0".into());
        }
        if self.default_max_attempts == 0 {
            return Err("workers.default_max_attempts must be > 0".into());
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err("workers.retry_base_delay_ms must not exceed retry_max_delay_ms".into());
        }
        Ok(())
    }
}
