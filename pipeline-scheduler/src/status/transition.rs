//! Transition guards on top of [`PipelineStatus`].

use serde::{Deserialize, Serialize};
use std::fmt;

use super::PipelineStatus;
use crate::errors::{Result, SchedulerError};

/// A status change requested by a user or by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTransition {
    /// Pause a single task that has not been scheduled yet.
    PauseTask,
    /// Resume a paused task.
    UnpauseTask,
    /// Pause a pipeline before it is queued.
    Pause,
    /// Cancel a created, queued or running pipeline.
    Cancel,
    /// Enable a disabled item.
    Enable,
    /// Disable an item before it runs.
    Disable,
    /// Delete the record.
    Delete,
    /// Apply the manual review overlay.
    ManualReview,
    /// Put a born pipeline into its queue.
    Enqueue,
    /// Let a queued pipeline start running.
    Admit,
}

impl fmt::Display for StatusTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PauseTask => "pause task of",
            Self::UnpauseTask => "unpause task of",
            Self::Pause => "pause",
            Self::Cancel => "cancel",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Delete => "delete",
            Self::ManualReview => "review",
            Self::Enqueue => "enqueue",
            Self::Admit => "admit",
        };
        f.write_str(name)
    }
}

/// The result of an allowed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    /// Always true for a returned outcome; kept for the wire contract.
    pub allowed: bool,
    /// The status after the transition.
    pub status: PipelineStatus,
    /// False when the transition was accepted as a no-op.
    pub changed: bool,
}

impl TransitionOutcome {
    fn to(from: PipelineStatus, status: PipelineStatus) -> Self {
        Self {
            allowed: true,
            status,
            changed: from != status,
        }
    }
}

/// Applies `transition` to `current`.
///
/// Returns the resulting status, or [`SchedulerError::InvalidTransition`]
/// when the guard of the transition rejects the current status.
pub fn apply_transition(
    current: PipelineStatus,
    transition: StatusTransition,
) -> Result<TransitionOutcome> {
    use PipelineStatus as S;

    let next = match transition {
        StatusTransition::PauseTask if current.can_pause_task() => S::Paused,
        StatusTransition::UnpauseTask if current.can_unpause_task() => S::Born,
        StatusTransition::Pause if current.can_pause() => S::Paused,
        StatusTransition::Cancel if current.can_cancel() => S::StopByUser,
        StatusTransition::Disable if current.can_enable_disable() => S::Disabled,
        StatusTransition::Enable if current == S::Disabled => S::Analyzed,
        // enabling something that was never disabled changes nothing
        StatusTransition::Enable if current.can_enable_disable() => current,
        StatusTransition::Delete if current.can_delete() => current,
        StatusTransition::ManualReview => current.change_state_for_manual_review(),
        StatusTransition::Enqueue
            if matches!(current, S::Born | S::Mark | S::Created | S::Queue) =>
        {
            S::Queue
        }
        StatusTransition::Admit if current == S::Queue => S::Running,
        _ => {
            return Err(SchedulerError::InvalidTransition {
                from: current,
                transition,
            })
        }
    };

    Ok(TransitionOutcome::to(current, next))
}
