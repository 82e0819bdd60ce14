//! Outcome of an enqueue attempt.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When to try enqueueing again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOption {
    /// Whole seconds of the interval.
    pub interval_second: u64,
    /// Interval in milliseconds.
    pub interval_millisecond: u64,
}

impl RetryOption {
    /// Builds a retry option from an interval.
    #[must_use]
    pub fn from_interval(interval: Duration) -> Self {
        Self {
            interval_second: interval.as_secs(),
            interval_millisecond: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// The interval as a Duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        if self.interval_millisecond > 0 {
            Duration::from_millis(self.interval_millisecond)
        } else {
            Duration::from_secs(self.interval_second)
        }
    }
}

/// Result of trying to admit a pipeline through its queue.
///
/// `success` means the pipeline may run now. `is_end` means it never will
/// through this queue. Neither means "try again after `retry_option`".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineQueueValidateResult {
    /// The pipeline was admitted.
    pub success: bool,
    /// Why the pipeline was not admitted.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// The outcome is final.
    pub is_end: bool,
    /// When to retry, for non-final failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_option: Option<RetryOption>,
}

impl PipelineQueueValidateResult {
    /// The pipeline was admitted.
    #[must_use]
    pub fn admitted() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// The pipeline can never be admitted.
    #[must_use]
    pub fn end(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: reason.into(),
            is_end: true,
            retry_option: None,
        }
    }

    /// The pipeline has to wait.
    #[must_use]
    pub fn retry(reason: impl Into<String>, interval: Duration) -> Self {
        Self {
            success: false,
            reason: reason.into(),
            is_end: false,
            retry_option: Some(RetryOption::from_interval(interval)),
        }
    }

    /// True if the caller should try again later.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        !self.success && !self.is_end
    }
}
