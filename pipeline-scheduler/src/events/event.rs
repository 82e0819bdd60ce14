//! Lifecycle events.

use serde::Serialize;

use crate::status::PipelineStatus;

/// Something that happened to a pipeline, a queue or a GC target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// A pipeline record was created.
    PipelineCreated {
        /// Pipeline ID.
        pipeline_id: u64,
        /// Bound queue, if any.
        queue_id: Option<u64>,
    },
    /// A pipeline changed status.
    PipelineStatusChanged {
        /// Pipeline ID.
        pipeline_id: u64,
        /// Previous status.
        from: PipelineStatus,
        /// New status.
        to: PipelineStatus,
    },
    /// A pipeline started waiting in a queue.
    QueueEnqueued {
        /// Pipeline ID.
        pipeline_id: u64,
        /// Queue ID.
        queue_id: u64,
        /// Effective priority.
        priority: i64,
    },
    /// A pipeline got a running slot.
    QueueAdmitted {
        /// Pipeline ID.
        pipeline_id: u64,
        /// Queue ID.
        queue_id: u64,
    },
    /// A pipeline left its queue.
    QueueReleased {
        /// Pipeline ID.
        pipeline_id: u64,
        /// Queue ID.
        queue_id: u64,
    },
    /// Compute resources of a pipeline were released.
    GcResourcesReleased {
        /// Pipeline ID.
        pipeline_id: u64,
    },
    /// A record was archived and removed.
    GcRecordArchived {
        /// Pipeline ID.
        pipeline_id: u64,
    },
    /// A record was deleted.
    GcRecordDeleted {
        /// Pipeline ID.
        pipeline_id: u64,
    },
}

impl SchedulerEvent {
    /// Dotted event name, e.g. `queue.admitted`.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::PipelineCreated { .. } => "pipeline.created",
            Self::PipelineStatusChanged { .. } => "pipeline.status_changed",
            Self::QueueEnqueued { .. } => "queue.enqueued",
            Self::QueueAdmitted { .. } => "queue.admitted",
            Self::QueueReleased { .. } => "queue.released",
            Self::GcResourcesReleased { .. } => "gc.resources_released",
            Self::GcRecordArchived { .. } => "gc.record_archived",
            Self::GcRecordDeleted { .. } => "gc.record_deleted",
        }
    }

    /// The pipeline the event is about.
    #[must_use]
    pub const fn pipeline_id(&self) -> u64 {
        match self {
            Self::PipelineCreated { pipeline_id, .. }
            | Self::PipelineStatusChanged { pipeline_id, .. }
            | Self::QueueEnqueued { pipeline_id, .. }
            | Self::QueueAdmitted { pipeline_id, .. }
            | Self::QueueReleased { pipeline_id, .. }
            | Self::GcResourcesReleased { pipeline_id }
            | Self::GcRecordArchived { pipeline_id }
            | Self::GcRecordDeleted { pipeline_id } => *pipeline_id,
        }
    }

    /// Event payload as JSON.
    #[must_use]
    pub fn data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
