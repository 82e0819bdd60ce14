//! Scheduler configuration.
//!
//! Every field carries a serde default so partial JSON documents load.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{Result, SchedulerError};

/// Configuration of the scheduler and its background tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How long a caller should wait before re-trying a pipeline that could
    /// not be admitted yet, in milliseconds.
    #[serde(default = "default_enqueue_retry_interval_ms")]
    pub enqueue_retry_interval_ms: u64,
    /// How long a cancelled running pipeline may take to stop on its own
    /// before it is force-finalized, in seconds.
    #[serde(default = "default_cancel_grace_period_secs")]
    pub cancel_grace_period_secs: u64,
    /// Base interval used when retrying platform errors, in seconds.
    #[serde(default = "default_abnormal_retry_interval_secs")]
    pub abnormal_retry_interval_secs: u64,
    /// Garbage collection settings.
    #[serde(default)]
    pub gc: GcConfig,
}

fn default_enqueue_retry_interval_ms() -> u64 {
    5_000
}

fn default_cancel_grace_period_secs() -> u64 {
    30
}

fn default_abnormal_retry_interval_secs() -> u64 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enqueue_retry_interval_ms: default_enqueue_retry_interval_ms(),
            cancel_grace_period_secs: default_cancel_grace_period_secs(),
            abnormal_retry_interval_secs: default_abnormal_retry_interval_secs(),
            gc: GcConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from JSON, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SchedulerError::Config(e.to_string()))
    }

    /// Sets the enqueue retry interval.
    #[must_use]
    pub fn with_enqueue_retry_interval(mut self, interval: Duration) -> Self {
        self.enqueue_retry_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the cancel grace period.
    #[must_use]
    pub fn with_cancel_grace_period(mut self, grace: Duration) -> Self {
        self.cancel_grace_period_secs = grace.as_secs();
        self
    }

    /// Sets the GC configuration.
    #[must_use]
    pub fn with_gc(mut self, gc: GcConfig) -> Self {
        self.gc = gc;
        self
    }

    /// Enqueue retry interval as a Duration.
    #[must_use]
    pub fn enqueue_retry_interval(&self) -> Duration {
        Duration::from_millis(self.enqueue_retry_interval_ms)
    }

    /// Cancel grace period as a Duration.
    #[must_use]
    pub fn cancel_grace_period(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_period_secs)
    }

    /// Abnormal retry base interval as a Duration.
    #[must_use]
    pub fn abnormal_retry_interval(&self) -> Duration {
        Duration::from_secs(self.abnormal_retry_interval_secs)
    }
}

/// Garbage collection settings and the TTLs applied when a pipeline leaves
/// its own GC fields unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcConfig {
    /// How often the background sweeper runs, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Maximum number of pipelines examined per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Resource TTL after a successful run, in seconds.
    #[serde(default = "default_resource_ttl_secs")]
    pub resource_success_ttl_secs: u64,
    /// Resource TTL after a failed run, in seconds.
    #[serde(default = "default_resource_ttl_secs")]
    pub resource_failed_ttl_secs: u64,
    /// Record TTL of pipelines that never ran, in seconds.
    #[serde(default = "default_analyzed_ttl_secs")]
    pub analyzed_ttl_secs: u64,
    /// Whether never-run pipelines are archived instead of deleted.
    #[serde(default)]
    pub analyzed_need_archive: bool,
    /// Record TTL of finished pipelines, in seconds.
    #[serde(default = "default_finished_ttl_secs")]
    pub finished_ttl_secs: u64,
    /// Whether finished pipelines are archived instead of deleted.
    #[serde(default = "default_finished_need_archive")]
    pub finished_need_archive: bool,
    /// How long archived never-run pipelines are kept, counted from
    /// creation, in seconds.
    #[serde(default = "default_analyzed_archive_retain_secs")]
    pub analyzed_archive_retain_secs: u64,
    /// How long other archived pipelines are kept, counted from creation,
    /// in seconds.
    #[serde(default = "default_finished_archive_retain_secs")]
    pub finished_archive_retain_secs: u64,
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    100
}

fn default_resource_ttl_secs() -> u64 {
    1_800
}

fn default_analyzed_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_finished_ttl_secs() -> u64 {
    30 * 24 * 60 * 60
}

fn default_finished_need_archive() -> bool {
    true
}

fn default_analyzed_archive_retain_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_finished_archive_retain_secs() -> u64 {
    90 * 24 * 60 * 60
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            batch_size: default_batch_size(),
            resource_success_ttl_secs: default_resource_ttl_secs(),
            resource_failed_ttl_secs: default_resource_ttl_secs(),
            analyzed_ttl_secs: default_analyzed_ttl_secs(),
            analyzed_need_archive: false,
            finished_ttl_secs: default_finished_ttl_secs(),
            finished_need_archive: default_finished_need_archive(),
            analyzed_archive_retain_secs: default_analyzed_archive_retain_secs(),
            finished_archive_retain_secs: default_finished_archive_retain_secs(),
        }
    }
}

impl GcConfig {
    /// Sets the sweep interval.
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_secs = interval.as_secs();
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the archive retention windows.
    #[must_use]
    pub fn with_archive_retention(mut self, analyzed: Duration, finished: Duration) -> Self {
        self.analyzed_archive_retain_secs = analyzed.as_secs();
        self.finished_archive_retain_secs = finished.as_secs();
        self
    }

    /// Sweep interval as a Duration. Never zero.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
