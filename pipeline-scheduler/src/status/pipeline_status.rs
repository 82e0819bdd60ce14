//! Pipeline and task execution states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::UnknownEnumValue;

/// The execution status of a pipeline or one of its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStatus {
    /// Being initialized, not analyzed yet.
    Initializing,
    /// Disabled by the user, will not run.
    Disabled,
    /// Analysis of the pipeline definition failed.
    AnalyzeFailed,
    /// Analyzed and ready to run.
    Analyzed,
    /// Handed to the reconciler, waiting to be scheduled.
    Born,
    /// Paused before running.
    Paused,
    /// Marked by the reconciler.
    Mark,
    /// Created on the executor side.
    Created,
    /// Waiting in a queue.
    Queue,
    /// Running.
    Running,
    /// Finished successfully.
    Success,
    /// Failed because of user code or configuration.
    Failed,
    /// Exceeded its configured timeout.
    Timeout,
    /// Stopped by the user.
    StopByUser,
    /// Skipped by the system because it was not needed.
    NoNeedBySystem,
    /// The executor failed to create it.
    CreateError,
    /// The executor failed to start it.
    StartError,
    /// Generic platform error.
    Error,
    /// Database error.
    #[serde(rename = "DBError")]
    DbError,
    /// Status could not be determined.
    Unknown,
    /// Lost connection to the executor.
    LostConn,
    /// Cancelled by a remote system.
    CancelByRemote,
    /// Waiting for manual approval.
    WaitApproval,
    /// Approved by a reviewer.
    Accept,
    /// Rejected by a reviewer.
    Reject,
}

/// The mutually exclusive classes every status belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// Not yet handed to the reconciler.
    PreRun,
    /// Owned by the reconciler: waiting, queued or running.
    ReconcilerRunning,
    /// Finished successfully.
    Success,
    /// User-actionable failure.
    NormalFailure,
    /// Platform fault.
    AbnormalFailure,
    /// Part of the human approval overlay.
    Approval,
}

impl PipelineStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 25] = [
        Self::Initializing,
        Self::Disabled,
        Self::AnalyzeFailed,
        Self::Analyzed,
        Self::Born,
        Self::Paused,
        Self::Mark,
        Self::Created,
        Self::Queue,
        Self::Running,
        Self::Success,
        Self::Failed,
        Self::Timeout,
        Self::StopByUser,
        Self::NoNeedBySystem,
        Self::CreateError,
        Self::StartError,
        Self::Error,
        Self::DbError,
        Self::Unknown,
        Self::LostConn,
        Self::CancelByRemote,
        Self::WaitApproval,
        Self::Accept,
        Self::Reject,
    ];

    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Disabled => "Disabled",
            Self::AnalyzeFailed => "AnalyzeFailed",
            Self::Analyzed => "Analyzed",
            Self::Born => "Born",
            Self::Paused => "Paused",
            Self::Mark => "Mark",
            Self::Created => "Created",
            Self::Queue => "Queue",
            Self::Running => "Running",
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::Timeout => "Timeout",
            Self::StopByUser => "StopByUser",
            Self::NoNeedBySystem => "NoNeedBySystem",
            Self::CreateError => "CreateError",
            Self::StartError => "StartError",
            Self::Error => "Error",
            Self::DbError => "DBError",
            Self::Unknown => "Unknown",
            Self::LostConn => "LostConn",
            Self::CancelByRemote => "CancelByRemote",
            Self::WaitApproval => "WaitApproval",
            Self::Accept => "Accept",
            Self::Reject => "Reject",
        }
    }

    /// Returns a human-readable description of the status.
    #[must_use]
    pub const fn desc(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Disabled => "disabled",
            Self::AnalyzeFailed => "failed to analyze pipeline definition",
            Self::Analyzed => "analyzed, waiting to run",
            Self::Born => "waiting to be scheduled",
            Self::Paused => "paused",
            Self::Mark => "marked",
            Self::Created => "created",
            Self::Queue => "waiting in queue",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timed out",
            Self::StopByUser => "stopped by user",
            Self::NoNeedBySystem => "skipped by system",
            Self::CreateError => "platform error: failed to create",
            Self::StartError => "platform error: failed to start",
            Self::Error => "platform error",
            Self::DbError => "platform error: database",
            Self::Unknown => "unknown",
            Self::LostConn => "platform error: lost connection to executor",
            Self::CancelByRemote => "cancelled by remote system",
            Self::WaitApproval => "waiting for approval",
            Self::Accept => "approved",
            Self::Reject => "rejected",
        }
    }

    /// Returns the class the status belongs to.
    #[must_use]
    pub const fn class(&self) -> StatusClass {
        match self {
            Self::Initializing | Self::Disabled | Self::Analyzed => StatusClass::PreRun,
            Self::Born
            | Self::Paused
            | Self::Mark
            | Self::Created
            | Self::Queue
            | Self::Running => StatusClass::ReconcilerRunning,
            Self::Success => StatusClass::Success,
            Self::AnalyzeFailed
            | Self::Failed
            | Self::Timeout
            | Self::StopByUser
            | Self::NoNeedBySystem => StatusClass::NormalFailure,
            Self::CreateError
            | Self::StartError
            | Self::Error
            | Self::DbError
            | Self::Unknown
            | Self::LostConn
            | Self::CancelByRemote => StatusClass::AbnormalFailure,
            Self::WaitApproval | Self::Accept | Self::Reject => StatusClass::Approval,
        }
    }

    /// Returns true if the status has not been handed to the reconciler yet.
    #[must_use]
    pub const fn is_pre_run_status(&self) -> bool {
        matches!(self.class(), StatusClass::PreRun)
    }

    /// Returns true if the reconciler currently owns the pipeline.
    #[must_use]
    pub const fn is_reconciler_running_status(&self) -> bool {
        matches!(self.class(), StatusClass::ReconcilerRunning)
    }

    /// Returns true for `Success`.
    #[must_use]
    pub const fn is_success_status(&self) -> bool {
        matches!(self.class(), StatusClass::Success)
    }

    /// Returns true for user-actionable failures.
    #[must_use]
    pub const fn is_normal_failed_status(&self) -> bool {
        matches!(self.class(), StatusClass::NormalFailure)
    }

    /// Returns true for platform-fault failures.
    #[must_use]
    pub const fn is_abnormal_failed_status(&self) -> bool {
        matches!(self.class(), StatusClass::AbnormalFailure)
    }

    /// Returns true for any failure, normal or abnormal.
    #[must_use]
    pub const fn is_failed_status(&self) -> bool {
        self.is_normal_failed_status() || self.is_abnormal_failed_status()
    }

    /// Returns true for statuses from which no automatic transition occurs.
    #[must_use]
    pub const fn is_end_status(&self) -> bool {
        self.is_success_status() || self.is_failed_status()
    }

    /// Returns true if the status is part of the manual approval overlay.
    #[must_use]
    pub const fn is_approval_status(&self) -> bool {
        matches!(self.class(), StatusClass::Approval)
    }

    /// Returns true once the pipeline has left the queue stage.
    #[must_use]
    pub const fn after_pipeline_queue(&self) -> bool {
        matches!(self, Self::Running) || self.is_end_status()
    }

    /// A single task may only be paused before it is scheduled.
    #[must_use]
    pub const fn can_pause_task(&self) -> bool {
        matches!(self, Self::Born)
    }

    /// Only a paused task can be unpaused.
    #[must_use]
    pub const fn can_unpause_task(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Returns true if the pipeline can be cancelled.
    #[must_use]
    pub const fn can_cancel(&self) -> bool {
        matches!(self, Self::Created | Self::Queue | Self::Running)
    }

    /// Returns true if the pipeline can be enabled or disabled.
    #[must_use]
    pub const fn can_enable_disable(&self) -> bool {
        matches!(self, Self::Initializing | Self::Analyzed)
    }

    /// Returns true if the pipeline can be paused before it is queued.
    #[must_use]
    pub const fn can_pause(&self) -> bool {
        matches!(self, Self::Initializing | Self::Analyzed | Self::Paused)
    }

    /// Returns true if the pipeline record can be deleted.
    #[must_use]
    pub const fn can_delete(&self) -> bool {
        matches!(self, Self::Analyzed) || self.is_end_status()
    }

    /// Maps a status onto the manual review overlay.
    ///
    /// `Success` becomes `Accept` and `Running` becomes `WaitApproval`; every
    /// other status, including the overlay statuses themselves, passes
    /// through unchanged, so applying it twice is the same as applying it once.
    #[must_use]
    pub const fn change_state_for_manual_review(self) -> Self {
        match self {
            Self::Success => Self::Accept,
            Self::Running => Self::WaitApproval,
            other => other,
        }
    }
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::Analyzed
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStatus {
    type Err = UnknownEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownEnumValue::new("PipelineStatus", s))
    }
}
