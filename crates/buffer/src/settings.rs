//! Runtime buffer settings derived from `BufferConfig`

use std::time::Duration;

use contracts::{BufferConfig, FlushMode};

/// Exponential backoff for failed chunk writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before the first retry
    pub wait: Duration,
    /// Upper bound of a single wait
    pub max_wait: Duration,
    /// Retries before a chunk is discarded
    pub max_times: u32,
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (0-based): `min(wait * 2^attempt, max_wait)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.wait
            .checked_mul(factor)
            .map_or(self.max_wait, |d| d.min(self.max_wait))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(60),
            max_times: 5,
        }
    }
}

/// Buffer limits and flush behaviour
#[derive(Debug, Clone)]
pub struct BufferSettings {
    pub chunk_limit_records: usize,
    pub chunk_limit_bytes: usize,
    pub queue_limit: usize,
    pub flush_mode: FlushMode,
    pub flush_interval: Duration,
    pub flush_at_shutdown: bool,
    pub retry: RetryPolicy,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self::from(&BufferConfig::default())
    }
}

impl From<&BufferConfig> for BufferSettings {
    fn from(config: &BufferConfig) -> Self {
        Self {
            chunk_limit_records: config.chunk_limit_records.max(1),
            chunk_limit_bytes: config.chunk_limit_bytes.max(1),
            queue_limit: config.queue_limit.max(1),
            flush_mode: config.flush_mode,
            flush_interval: Duration::from_millis(config.flush_interval_ms.max(1)),
            flush_at_shutdown: config.flush_at_shutdown,
            retry: RetryPolicy {
                wait: Duration::from_millis(config.retry_wait_ms),
                max_wait: Duration::from_millis(config.retry_max_wait_ms),
                max_times: config.retry_max_times,
            },
        }
    }
}
