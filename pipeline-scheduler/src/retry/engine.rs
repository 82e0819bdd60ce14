//! Retry decisions and the async loop driver.
//!
//! The math here is pure: given a strategy and the number of retries that
//! already happened it returns whether to go again and how long to wait.
//! Semantic break conditions stay with the caller.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::LoopStrategy;

/// Lower bound of the interval used when retrying platform errors.
pub const ABNORMAL_RETRY_MIN_INTERVAL: Duration = Duration::from_secs(30);

const ABNORMAL_RETRY_DECLINE_RATIO: f64 = 2.0;
const ABNORMAL_RETRY_DECLINE_LIMIT_SEC: i64 = 600;

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Whether another attempt should be made.
    pub should_retry: bool,
    /// How long to wait before it. Zero when `should_retry` is false.
    pub delay: Duration,
}

impl RetryDecision {
    /// A decision to stop.
    #[must_use]
    pub const fn give_up() -> Self {
        Self {
            should_retry: false,
            delay: Duration::ZERO,
        }
    }
}

/// Decides whether a failed task should run again.
///
/// `attempts_so_far` counts the retries that already happened, so the first
/// failure is evaluated with `0`.
#[must_use]
pub fn next_retry(strategy: &LoopStrategy, attempts_so_far: u64) -> RetryDecision {
    let should_retry = strategy.is_unlimited()
        || u64::try_from(strategy.max_times).is_ok_and(|max| attempts_so_far < max);

    if !should_retry {
        return RetryDecision::give_up();
    }

    RetryDecision {
        should_retry,
        delay: strategy.interval_for(attempts_so_far),
    }
}

/// Interval used when the reconciler retries a platform error.
///
/// Uses the task's own loop strategy when it has one, otherwise declines
/// from `default_interval` with ratio 2 up to ten minutes. Never shorter
/// than [`ABNORMAL_RETRY_MIN_INTERVAL`].
#[must_use]
pub fn abnormal_retry_interval(
    strategy: Option<&LoopStrategy>,
    default_interval: Duration,
    attempts: u64,
) -> Duration {
    let interval = match strategy {
        Some(strategy) => strategy.interval_for(attempts),
        None => LoopStrategy::new()
            .with_max_times(-1)
            .with_interval_sec(default_interval.as_secs())
            .with_decline_ratio(ABNORMAL_RETRY_DECLINE_RATIO)
            .with_decline_limit_sec(ABNORMAL_RETRY_DECLINE_LIMIT_SEC)
            .interval_for(attempts),
    };

    interval.max(ABNORMAL_RETRY_MIN_INTERVAL)
}

/// What an attempt inside [`drive_loop`] asks for next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStep<T> {
    /// The break condition held; stop looping.
    Break(T),
    /// Run again if the strategy allows it.
    Continue(T),
}

/// Result of a finished loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome<T> {
    /// Number of times the operation ran.
    pub executions: u64,
    /// Value returned by the last execution.
    pub value: T,
    /// True if the loop ended on a break, false if retries ran out.
    pub broke: bool,
}

/// Runs `operation` until it breaks or the strategy runs out of retries.
///
/// The operation receives the number of retries that already happened.
pub async fn drive_loop<T, F, Fut>(strategy: &LoopStrategy, mut operation: F) -> LoopOutcome<T>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = LoopStep<T>>,
{
    let mut attempt = 0u64;

    loop {
        match operation(attempt).await {
            LoopStep::Break(value) => {
                return LoopOutcome {
                    executions: attempt + 1,
                    value,
                    broke: true,
                };
            }
            LoopStep::Continue(value) => {
                let decision = next_retry(strategy, attempt);
                if !decision.should_retry {
                    debug!(attempt, "Loop retries exhausted");
                    return LoopOutcome {
                        executions: attempt + 1,
                        value,
                        broke: false,
                    };
                }

                debug!(
                    attempt,
                    delay_secs = decision.delay.as_secs(),
                    "Looping task after delay"
                );
                tokio::time::sleep(decision.delay).await;
                attempt += 1;
            }
        }
    }
}
