//! Test assertions for scheduling outcomes.

use crate::errors::SchedulerError;
use crate::queue::PipelineQueueValidateResult;
use crate::status::PipelineStatus;

/// Asserts that the pipeline was admitted.
pub fn assert_admitted(result: &PipelineQueueValidateResult) {
    assert!(
        result.success,
        "Expected admission, got reason: {:?}, is_end: {}",
        result.reason, result.is_end
    );
}

/// Asserts that the pipeline has to wait and retry.
pub fn assert_retry(result: &PipelineQueueValidateResult) {
    assert!(
        result.should_retry(),
        "Expected a retry, got success: {}, is_end: {}, reason: {:?}",
        result.success,
        result.is_end,
        result.reason
    );
    assert!(
        result.retry_option.is_some(),
        "Expected a retry option on a retry result"
    );
}

/// Asserts that the result is final and its reason contains `reason`.
pub fn assert_end(result: &PipelineQueueValidateResult, reason: &str) {
    assert!(result.is_end, "Expected a final result, got {result:?}");
    assert!(
        result.reason.contains(reason),
        "Expected reason containing {reason:?}, got {:?}",
        result.reason
    );
}

/// Asserts a status.
pub fn assert_status(actual: PipelineStatus, expected: PipelineStatus) {
    assert_eq!(
        actual, expected,
        "Expected status {expected}, got {actual}"
    );
}

/// Asserts that an operation failed with an invalid transition from `from`.
pub fn assert_transition_rejected<T: std::fmt::Debug>(
    result: Result<T, SchedulerError>,
    from: PipelineStatus,
) {
    match result {
        Err(SchedulerError::InvalidTransition { from: actual, .. }) => assert_status(actual, from),
        other => panic!("Expected an invalid transition from {from}, got {other:?}"),
    }
}
