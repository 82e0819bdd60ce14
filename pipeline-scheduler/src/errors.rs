//! Error types for the pipeline scheduling core.
//!
//! Client-caused problems surface as [`ValidationError`] or
//! [`SchedulerError::InvalidTransition`]. Transient queue outcomes are not
//! errors at all; they are reported through
//! [`PipelineQueueValidateResult`](crate::queue::PipelineQueueValidateResult).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::status::{PipelineStatus, StatusTransition};

/// Result alias used throughout the crate.
pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;

/// The main error type for scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A request failed validation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A status transition was requested from a state that does not allow it.
    #[error("invalid transition: cannot {transition} a pipeline in status {from}")]
    InvalidTransition {
        /// The status the pipeline was in.
        from: PipelineStatus,
        /// The requested transition.
        transition: StatusTransition,
    },

    /// A string did not name any member of a closed enum.
    #[error("{0}")]
    UnknownEnumValue(#[from] UnknownEnumValue),

    /// No pipeline with this ID exists.
    #[error("pipeline not found: {0}")]
    PipelineNotFound(u64),

    /// No task with this ID exists in the pipeline.
    #[error("task not found: pipelineID: {pipeline_id}, taskID: {task_id}")]
    TaskNotFound {
        /// The pipeline that was searched.
        pipeline_id: u64,
        /// The missing task.
        task_id: u64,
    },

    /// No queue matched the lookup.
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    /// The resource reclaimer failed.
    #[error("failed to release resources of pipeline {pipeline_id}: {reason}")]
    Reclaim {
        /// The pipeline whose resources were being released.
        pipeline_id: u64,
        /// What went wrong.
        reason: String,
    },

    /// The archive store failed.
    #[error("failed to archive pipeline {pipeline_id}: {reason}")]
    Archive {
        /// The pipeline being archived.
        pipeline_id: u64,
        /// What went wrong.
        reason: String,
    },

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// A generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// Returns true if the error was caused by the caller and must not be retried.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InvalidTransition { .. }
                | Self::UnknownEnumValue(_)
                | Self::PipelineNotFound(_)
                | Self::TaskNotFound { .. }
                | Self::QueueNotFound(_)
        )
    }

    /// Creates a reclaim error.
    #[must_use]
    pub fn reclaim(pipeline_id: u64, reason: impl Into<String>) -> Self {
        Self::Reclaim {
            pipeline_id,
            reason: reason.into(),
        }
    }

    /// Creates an archive error.
    #[must_use]
    pub fn archive(pipeline_id: u64, reason: impl Into<String>) -> Self {
        Self::Archive {
            pipeline_id,
            reason: reason.into(),
        }
    }
}

/// Error raised when a request is rejected before any state changes.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ValidationError {
    /// The error message.
    pub message: String,
    /// The offending request field, if any.
    pub field: Option<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    /// Sets the offending field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::json!(self.message));
        if let Some(ref field) = self.field {
            map.insert("field".to_string(), serde_json::json!(field));
        }
        map
    }
}

/// Error raised when parsing a string into one of the crate's closed enums.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownEnumValue {
    /// Name of the enum type.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl UnknownEnumValue {
    /// Creates a new unknown-value error.
    #[must_use]
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_with_field() {
        let err = ValidationError::new("invalid queue name").with_field("name");

        assert_eq!(err.to_string(), "invalid queue name");
        assert_eq!(err.field.as_deref(), Some("name"));

        let dict = err.to_dict();
        assert_eq!(dict.get("field").unwrap(), "name");
    }

    #[test]
    fn test_validation_converts_into_scheduler_error() {
        let err: SchedulerError = ValidationError::new("cannot change queue's source").into();
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "cannot change queue's source");
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = SchedulerError::InvalidTransition {
            from: PipelineStatus::Success,
            transition: StatusTransition::Cancel,
        };
        assert_eq!(
            err.to_string(),
            "invalid transition: cannot cancel a pipeline in status Success"
        );
    }

    #[test]
    fn test_unknown_enum_value() {
        let err = UnknownEnumValue::new("PipelineStatus", "Sleeping");
        assert_eq!(err.to_string(), r#"unknown PipelineStatus: "Sleeping""#);
    }

    #[test]
    fn test_collaborator_errors_are_not_client_errors() {
        assert!(!SchedulerError::reclaim(1, "volume busy").is_client_error());
        assert!(!SchedulerError::archive(1, "disk full").is_client_error());
    }
}
