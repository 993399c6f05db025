//! Runtime configuration: endpoints, worker count, retry, record logs and the
//! bucket table. Loading and env overrides live in [`crate::load_config`].

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::ChecksumCheck;
use crate::error::{Result, SyncError};
use crate::resolve::BucketTable;
use crate::retry::RetryPolicy;
use crate::sink::RecordLogConfig;

pub const DEFAULT_WORKERS: usize = 60;
pub const DEFAULT_ENDPOINTS: [&str; 2] = [
    "https://wcss3.hub.konektom.pl",
    "https://wcss1.hub.konektom.pl",
];

/// Logical storage locations and the Onedata space each one lives in.
pub const DEFAULT_BUCKETS: [(&str, &str); 21] = [
    ("mnk21", "bucket-mnk"),
    ("bn25", "bucket-bn"),
    ("bn27", "bucket-bn"),
    ("bn28", "bucket-bn"),
    ("bn29", "bucket-bn"),
    ("bn30", "bucket-bn"),
    ("bn35", "bucket-bn"),
    ("bn36", "bucket-bn"),
    ("bn37", "bucket-bn"),
    ("bn38", "bucket-bn"),
    ("bn39", "bucket-bn"),
    ("bn40", "bucket-bn"),
    ("bn46", "bucket-bn"),
    ("nac23", "bucket-nac"),
    ("nac24", "bucket-nac"),
    ("nac26", "bucket-nac"),
    ("nac31", "bucket-nac"),
    ("nac32", "bucket-nac"),
    ("nac33", "bucket-nac"),
    ("nac34", "bucket-nac"),
    ("nac", "bucket-nac"),
];

/// Full runtime configuration. Every field has a default, so an empty YAML
/// document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub endpoints: Vec<String>,
    pub workers: usize,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub checksum_check: ChecksumCheck,
    pub drain_interval_ms: u64,
    pub retry: RetrySection,
    pub confirmation_log: RecordLogConfig,
    pub failure_log: RecordLogConfig,
    pub buckets: HashMap<String, String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let buckets = DEFAULT_BUCKETS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            endpoints: DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            workers: DEFAULT_WORKERS,
            request_timeout_secs: 20,
            connect_timeout_secs: 10,
            checksum_check: ChecksumCheck::default(),
            drain_interval_ms: 100,
            retry: RetrySection::default(),
            confirmation_log: RecordLogConfig::new("./logs", "confirmed"),
            failure_log: RecordLogConfig::new("./error-logs", "failed"),
            buckets,
        }
    }
}

/// YAML form of [`RetryPolicy`]. `max_attempts: null` retries forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            jitter: policy.jitter,
        }
    }
}

impl From<&RetrySection> for RetryPolicy {
    fn from(s: &RetrySection) -> Self {
        RetryPolicy {
            max_attempts: s.max_attempts,
            initial_backoff: Duration::from_millis(s.initial_backoff_ms),
            max_backoff: Duration::from_millis(s.max_backoff_ms),
            jitter: s.jitter,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(SyncError::Config("at least one endpoint is required".into()));
        }
        if self.workers == 0 {
            return Err(SyncError::Config("workers must be at least 1".into()));
        }
        if self.buckets.is_empty() {
            return Err(SyncError::Config("bucket table is empty".into()));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(SyncError::Config(
                "retry.max_attempts must be at least 1 (or null for unbounded)".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    pub fn bucket_table(&self) -> BucketTable {
        BucketTable::new(self.buckets.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn trace_loaded(&self) {
        info!(
            endpoints = ?self.endpoints,
            workers = self.workers,
            buckets = self.buckets.len(),
            checksum_check = ?self.checksum_check,
            max_attempts = ?self.retry.max_attempts,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}
