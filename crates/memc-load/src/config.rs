//! Loader configuration
//!
//! The core never sees command-line text: `main` resolves options into a
//! [`LoaderConfig`], which is validated once and then shared read-only by the
//! scheduler, every job, and every worker.

use memc_common::{MemcError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::stats::DEFAULT_ERROR_THRESHOLD;
use crate::store::memcache::DEFAULT_TIMEOUT;
use crate::worker::{WorkerSettings, DEFAULT_POLL_INTERVAL};

// ============================================================================
// Defaults
// ============================================================================

/// Default input discovery pattern
pub const DEFAULT_PATTERN: &str = "/appsinstalled/*.tsv.gz";

/// Default number of files processed concurrently
pub const DEFAULT_WORKERS: usize = 4;

/// Default capacity of each per-type queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

pub const DEFAULT_IDFA_ADDR: &str = "127.0.0.1:33013";
pub const DEFAULT_GAID_ADDR: &str = "127.0.0.1:33014";
pub const DEFAULT_ADID_ADDR: &str = "127.0.0.1:33015";
pub const DEFAULT_DVID_ADDR: &str = "127.0.0.1:33016";

/// Default store address per device type
pub const DEFAULT_DEVICE_MEMC: [(&str, &str); 4] = [
    ("idfa", DEFAULT_IDFA_ADDR),
    ("gaid", DEFAULT_GAID_ADDR),
    ("adid", DEFAULT_ADID_ADDR),
    ("dvid", DEFAULT_DVID_ADDR),
];

#[derive(Debug, Clone, Serialize)]
pub struct LoaderConfig {
    /// Glob pattern for input files
    pub pattern: String,

    /// Device type -> store address (`host:port`)
    pub device_memc: BTreeMap<String, String>,

    /// Files processed concurrently
    pub workers: usize,

    /// Log payloads instead of writing them
    pub dry_run: bool,

    /// Jobs with an error rate at or above this are reported as failed
    pub error_threshold: f64,

    /// Capacity of each per-type queue
    pub queue_capacity: usize,

    /// Bounded wait used by workers on an empty queue
    pub poll_interval: Duration,

    /// Store connect/request timeout
    pub store_timeout: Duration,

    /// Store write retry policy
    pub retry: RetryPolicy,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            device_memc: DEFAULT_DEVICE_MEMC
                .iter()
                .map(|(dev_type, addr)| (dev_type.to_string(), addr.to_string()))
                .collect(),
            workers: DEFAULT_WORKERS,
            dry_run: false,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            store_timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    /// Replace the whole device type mapping
    pub fn with_device_memc<K, V>(mut self, mapping: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.device_memc = mapping
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_error_threshold(mut self, threshold: f64) -> Self {
        self.error_threshold = threshold;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Settings handed to every type worker
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            dry_run: self.dry_run,
            poll_interval: self.poll_interval,
            retry: self.retry,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.pattern.trim().is_empty() {
            return Err(MemcError::Config("pattern cannot be empty".to_string()));
        }
        if self.device_memc.is_empty() {
            return Err(MemcError::Config(
                "at least one device type must be configured".to_string(),
            ));
        }
        if let Some((dev_type, _)) = self.device_memc.iter().find(|(_, addr)| addr.trim().is_empty()) {
            return Err(MemcError::Config(format!(
                "store address for `{}` cannot be empty",
                dev_type
            )));
        }
        if self.workers == 0 {
            return Err(MemcError::Config("workers must be greater than 0".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(MemcError::Config(
                "queue capacity must be greater than 0".to_string(),
            ));
        }
        if !(self.error_threshold > 0.0 && self.error_threshold <= 1.0) {
            return Err(MemcError::Config(format!(
                "error threshold must be in (0, 1], got {}",
                self.error_threshold
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(MemcError::Config(
                "retry attempts must be greater than 0".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(MemcError::Config(
                "poll interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LoaderConfig::default();
        config.validate().unwrap();

        assert_eq!(config.device_memc.len(), 4);
        assert_eq!(config.device_memc["idfa"], "127.0.0.1:33013");
        assert_eq!(config.error_threshold, 0.01);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_rejects_empty_mapping() {
        let config = LoaderConfig::default().with_device_memc(Vec::<(String, String)>::new());
        assert!(matches!(config.validate(), Err(MemcError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_workers_and_capacity() {
        assert!(LoaderConfig::default().with_workers(0).validate().is_err());
        assert!(LoaderConfig::default().with_queue_capacity(0).validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        assert!(LoaderConfig::default().with_error_threshold(0.0).validate().is_err());
        assert!(LoaderConfig::default().with_error_threshold(1.5).validate().is_err());
        assert!(LoaderConfig::default().with_error_threshold(f64::NAN).validate().is_err());
        LoaderConfig::default().with_error_threshold(1.0).validate().unwrap();
    }

    #[test]
    fn test_worker_settings_follow_config() {
        let settings = LoaderConfig::default()
            .with_dry_run(true)
            .with_poll_interval(Duration::from_millis(5))
            .worker_settings();
        assert!(settings.dry_run);
        assert_eq!(settings.poll_interval, Duration::from_millis(5));
        assert_eq!(settings.retry, RetryPolicy::default());
    }
}
