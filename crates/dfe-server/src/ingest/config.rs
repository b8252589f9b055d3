//! Tuning knobs for the ingestion pipeline

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Default number of concurrent ingestion workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default capacity of the job queue between intake and workers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default (and recommended) maximum number of files in one batch.
pub const DEFAULT_MAX_BATCH_FILES: usize = 100;

/// Default number of attempts for a transiently failing store transaction.
pub const DEFAULT_MAX_STORE_RETRIES: u32 = 3;

/// Default base delay between store retries, doubled after each attempt.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub max_batch_files: usize,
    pub max_store_retries: u32,
    pub retry_backoff_ms: u64,
    /// Reject documents whose access key fails the modulo-11 check.
    pub verify_check_digit: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_batch_files: DEFAULT_MAX_BATCH_FILES,
            max_store_retries: DEFAULT_MAX_STORE_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            verify_check_digit: true,
        }
    }
}

impl IngestConfig {
    /// Read `INGEST_*` variables, keeping defaults for unset or unparsable ones.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: env_or("INGEST_WORKERS", defaults.workers),
            queue_capacity: env_or("INGEST_QUEUE_CAPACITY", defaults.queue_capacity),
            max_batch_files: env_or("INGEST_MAX_BATCH_FILES", defaults.max_batch_files),
            max_store_retries: env_or("INGEST_MAX_STORE_RETRIES", defaults.max_store_retries),
            retry_backoff_ms: env_or("INGEST_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
            verify_check_digit: env_or("INGEST_VERIFY_CHECK_DIGIT", defaults.verify_check_digit),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("Ingest workers must be greater than 0");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("Ingest queue capacity must be greater than 0");
        }
        if self.max_batch_files == 0 {
            anyhow::bail!("Ingest max_batch_files must be greater than 0");
        }
        if self.max_batch_files > self.queue_capacity {
            tracing::warn!(
                max_batch_files = self.max_batch_files,
                queue_capacity = self.queue_capacity,
                "Batches larger than the queue capacity will always be rejected"
            );
        }
        if self.max_store_retries == 0 {
            anyhow::bail!("Ingest max_store_retries must be at least 1");
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

pub(crate) fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
