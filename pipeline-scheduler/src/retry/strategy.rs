//! Task loop configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default exit condition of a task loop.
pub const DEFAULT_LOOP_BREAK: &str = "task_status == 'Success'";

/// Declining-backoff policy controlling re-execution of a task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopStrategy {
    /// Maximum number of retries, `-1` for unlimited.
    #[serde(default = "default_max_times")]
    pub max_times: i64,
    /// Multiplier applied to the interval after every attempt.
    #[serde(default)]
    pub decline_ratio: f64,
    /// Ceiling on any single interval, in seconds.
    #[serde(default)]
    pub decline_limit_sec: i64,
    /// Base interval, in seconds.
    #[serde(default)]
    pub interval_sec: u64,
}

fn default_max_times() -> i64 {
    PIPELINE_TASK_DEFAULT_LOOP_STRATEGY.max_times
}

/// The strategy used when a loop declares none.
pub const PIPELINE_TASK_DEFAULT_LOOP_STRATEGY: LoopStrategy = LoopStrategy {
    max_times: 10,
    decline_ratio: 2.0,
    decline_limit_sec: 60,
    interval_sec: 2,
};

impl Default for LoopStrategy {
    fn default() -> Self {
        PIPELINE_TASK_DEFAULT_LOOP_STRATEGY
    }
}

impl LoopStrategy {
    /// Creates the default strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn with_max_times(mut self, max_times: i64) -> Self {
        self.max_times = max_times;
        self
    }

    /// Sets the decline ratio.
    #[must_use]
    pub fn with_decline_ratio(mut self, ratio: f64) -> Self {
        self.decline_ratio = ratio;
        self
    }

    /// Sets the decline limit.
    #[must_use]
    pub fn with_decline_limit_sec(mut self, limit: i64) -> Self {
        self.decline_limit_sec = limit;
        self
    }

    /// Sets the base interval.
    #[must_use]
    pub fn with_interval_sec(mut self, interval: u64) -> Self {
        self.interval_sec = interval;
        self
    }

    /// Returns true if the loop never runs out of retries.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.max_times == -1
    }

    /// Fills unset or degenerate fields.
    ///
    /// A zero interval takes the package default. A ratio below one becomes
    /// one so intervals never shrink. A missing limit becomes the default
    /// limit when the interval was unset too, otherwise the interval itself.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let interval_unset = self.interval_sec == 0;
        let interval_sec = if interval_unset {
            PIPELINE_TASK_DEFAULT_LOOP_STRATEGY.interval_sec
        } else {
            self.interval_sec
        };

        let decline_ratio = if self.decline_ratio.is_nan() || self.decline_ratio < 1.0 {
            1.0
        } else {
            self.decline_ratio
        };

        let decline_limit_sec = if self.decline_limit_sec > 0 {
            self.decline_limit_sec
        } else if interval_unset {
            PIPELINE_TASK_DEFAULT_LOOP_STRATEGY.decline_limit_sec
        } else {
            i64::try_from(interval_sec).unwrap_or(i64::MAX)
        };

        Self {
            max_times: self.max_times,
            decline_ratio,
            decline_limit_sec,
            interval_sec,
        }
    }

    /// Interval to wait after `attempt` retries have already happened.
    #[must_use]
    pub fn interval_for(&self, attempt: u64) -> Duration {
        let strategy = self.normalized();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = strategy.interval_sec as f64 * strategy.decline_ratio.powi(exponent);
        let limit = strategy.decline_limit_sec as f64;

        let secs = if raw.is_finite() { raw.min(limit) } else { limit };
        Duration::from_secs(secs as u64)
    }
}

/// Loop settings attached to a task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineTaskLoop {
    /// Exit condition, evaluated by the caller after every attempt.
    #[serde(rename = "break", default)]
    pub break_expr: String,
    /// Backoff policy.
    #[serde(default)]
    pub strategy: Option<LoopStrategy>,
}

impl PipelineTaskLoop {
    /// Creates a loop with a break expression and the default strategy.
    #[must_use]
    pub fn new(break_expr: impl Into<String>) -> Self {
        Self {
            break_expr: break_expr.into(),
            strategy: None,
        }
    }

    /// Sets the strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: LoopStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Returns the strategy, falling back to the default.
    #[must_use]
    pub fn effective_strategy(&self) -> LoopStrategy {
        self.strategy.unwrap_or_default().normalized()
    }

    /// Merges the definition-level loop with a task-level override.
    ///
    /// The task loop wins when both are present. The result always carries a
    /// break expression and a normalized strategy. Returns `None` when
    /// neither side declares a loop.
    #[must_use]
    pub fn calculate(spec_loop: Option<&Self>, task_loop: Option<&Self>) -> Option<Self> {
        let mut calculated = task_loop.or(spec_loop)?.clone();

        if calculated.break_expr.trim().is_empty() {
            calculated.break_expr = DEFAULT_LOOP_BREAK.to_string();
        }
        calculated.strategy = Some(calculated.effective_strategy());

        Some(calculated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_strategy() {
        let strategy = LoopStrategy::default();
        assert_eq!(strategy.max_times, 10);
        assert_eq!(strategy.decline_ratio, 2.0);
        assert_eq!(strategy.decline_limit_sec, 60);
        assert_eq!(strategy.interval_sec, 2);
    }

    #[test]
    fn test_zero_ratio_means_no_growth() {
        let strategy = LoopStrategy::new()
            .with_decline_ratio(0.0)
            .with_interval_sec(5)
            .with_decline_limit_sec(100);

        for attempt in 0..5 {
            assert_eq!(strategy.interval_for(attempt), Duration::from_secs(5));
        }
    }

    #[test]
    fn test_zero_interval_uses_default() {
        let strategy = LoopStrategy::new().with_interval_sec(0);
        assert_eq!(strategy.normalized().interval_sec, 2);
        assert_eq!(strategy.interval_for(0), Duration::from_secs(2));
    }

    #[test]
    fn test_missing_limit() {
        let unset = LoopStrategy::new().with_interval_sec(0).with_decline_limit_sec(0);
        assert_eq!(unset.normalized().decline_limit_sec, 60);

        let explicit_interval = LoopStrategy::new().with_interval_sec(7).with_decline_limit_sec(0);
        assert_eq!(explicit_interval.normalized().decline_limit_sec, 7);
        assert_eq!(explicit_interval.interval_for(3), Duration::from_secs(7));
    }

    #[test]
    fn test_fractional_ratio_truncates() {
        let strategy = LoopStrategy::new()
            .with_decline_ratio(1.5)
            .with_interval_sec(3)
            .with_decline_limit_sec(100);

        // 3, 4.5, 6.75, 10.125
        let delays: Vec<u64> = (0..4).map(|a| strategy.interval_for(a).as_secs()).collect();
        assert_eq!(delays, vec![3, 4, 6, 10]);
    }

    #[test]
    fn test_huge_attempt_is_clamped() {
        let strategy = LoopStrategy::default();
        assert_eq!(strategy.interval_for(u64::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_calculate_prefers_task_loop() {
        let spec = PipelineTaskLoop::new("spec_break");
        let task = PipelineTaskLoop::new("")
            .with_strategy(LoopStrategy::new().with_max_times(3).with_decline_ratio(0.0));

        let calculated = PipelineTaskLoop::calculate(Some(&spec), Some(&task)).unwrap();
        assert_eq!(calculated.break_expr, DEFAULT_LOOP_BREAK);

        let strategy = calculated.strategy.unwrap();
        assert_eq!(strategy.max_times, 3);
        assert_eq!(strategy.decline_ratio, 1.0);
    }

    #[test]
    fn test_calculate_without_loops() {
        assert!(PipelineTaskLoop::calculate(None, None).is_none());

        let spec = PipelineTaskLoop::new("outputs.done == 'true'");
        let calculated = PipelineTaskLoop::calculate(Some(&spec), None).unwrap();
        assert_eq!(calculated.break_expr, "outputs.done == 'true'");
        assert_eq!(calculated.strategy, Some(LoopStrategy::default()));
    }

    #[test]
    fn test_deserialize_wire_form() {
        let parsed: PipelineTaskLoop = serde_json::from_str(
            r#"{"break":"task_status == 'Failed'","strategy":{"maxTimes":-1,"declineRatio":1.5,"declineLimitSec":30,"intervalSec":4}}"#,
        )
        .unwrap();

        let strategy = parsed.strategy.unwrap();
        assert!(strategy.is_unlimited());
        assert_eq!(strategy.interval_sec, 4);
        assert_eq!(parsed.break_expr, "task_status == 'Failed'");
    }
}
