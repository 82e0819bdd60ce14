//! Request and response shapes of the pipeline service.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::gc::{PipelineGC, ResourceGcState};
use crate::pipeline::{PipelineRecord, PipelineSource, PipelineTask, QueueBinding};
use crate::priority::PipelineTaskPriority;
use crate::queue::Resources;
use crate::retry::PipelineTaskLoop;
use crate::status::PipelineStatus;
use crate::utils::Timestamp;

/// Request to create a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineCreateRequest {
    /// Raw pipeline definition.
    pub pipeline_yml: String,
    /// Cluster to run on.
    pub cluster_name: String,
    /// Name of the definition.
    pub pipeline_yml_name: String,
    /// Creating source, as its wire name.
    pub pipeline_source: String,
    /// Labels, including the queue binding labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Run once created.
    #[serde(default)]
    pub auto_run: bool,
    /// Run once created, ahead of any other handling.
    #[serde(default)]
    pub auto_run_at_once: bool,
    /// Accepted for compatibility; cron triggering happens elsewhere.
    #[serde(default)]
    pub auto_start_cron: bool,
    /// GC settings; unset fields take the configured defaults.
    #[serde(default)]
    pub gc: Option<PipelineGC>,
    /// Run parameters.
    #[serde(default)]
    pub run_params: HashMap<String, serde_json::Value>,
    /// Name of the queue to bind, within the pipeline's source.
    #[serde(default)]
    pub bind_queue: Option<String>,
    /// Queue selection rules, used when no queue is bound explicitly.
    #[serde(default)]
    pub task_priority: Option<PipelineTaskPriority>,
    /// Requested resources.
    #[serde(default)]
    pub resources: Resources,
    /// Maximum running time in seconds.
    #[serde(default)]
    pub timeout_second: Option<u64>,
    /// Definition-level loop.
    #[serde(default, rename = "loop")]
    pub task_loop: Option<PipelineTaskLoop>,
    /// Parsed tasks.
    #[serde(default)]
    pub tasks: Vec<PipelineTask>,
}

impl PipelineCreateRequest {
    /// Creates a request with the required fields.
    #[must_use]
    pub fn new(
        pipeline_yml_name: impl Into<String>,
        pipeline_source: PipelineSource,
        cluster_name: impl Into<String>,
    ) -> Self {
        Self {
            pipeline_yml: "version: \"1.1\"\nstages: []\n".to_string(),
            cluster_name: cluster_name.into(),
            pipeline_yml_name: pipeline_yml_name.into(),
            pipeline_source: pipeline_source.as_str().to_string(),
            ..Default::default()
        }
    }

    /// Sets a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Binds a queue by name.
    #[must_use]
    pub fn with_bind_queue(mut self, queue_name: impl Into<String>) -> Self {
        self.bind_queue = Some(queue_name.into());
        self
    }

    /// Sets the queue selection rules.
    #[must_use]
    pub fn with_task_priority(mut self, task_priority: PipelineTaskPriority) -> Self {
        self.task_priority = Some(task_priority);
        self
    }

    /// Sets the requested resources.
    #[must_use]
    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    /// Sets the running time limit.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_second = Some(timeout.as_secs());
        self
    }

    /// Sets the GC settings.
    #[must_use]
    pub fn with_gc(mut self, gc: PipelineGC) -> Self {
        self.gc = Some(gc);
        self
    }

    /// Sets the definition-level loop.
    #[must_use]
    pub fn with_loop(mut self, task_loop: PipelineTaskLoop) -> Self {
        self.task_loop = Some(task_loop);
        self
    }

    /// Adds a task.
    #[must_use]
    pub fn with_task(mut self, task: PipelineTask) -> Self {
        self.tasks.push(task);
        self
    }

    /// Runs the pipeline right after creation.
    #[must_use]
    pub fn auto_run(mut self) -> Self {
        self.auto_run = true;
        self
    }
}

/// Operation on one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOperation {
    /// Task ID.
    #[serde(rename = "taskID")]
    pub task_id: u64,
    /// Disable (`true`) or enable (`false`).
    #[serde(default)]
    pub disable: Option<bool>,
    /// Pause (`true`) or unpause (`false`).
    #[serde(default)]
    pub pause: Option<bool>,
}

/// What an executor reports when a task attempt ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    /// End status of the attempt.
    pub status: PipelineStatus,
    /// Result of the loop break expression, if the executor evaluated it.
    /// When unset the loop breaks on success.
    pub loop_break: Option<bool>,
}

impl TaskReport {
    /// A report carrying only a status.
    #[must_use]
    pub const fn new(status: PipelineStatus) -> Self {
        Self {
            status,
            loop_break: None,
        }
    }

    /// Sets the evaluated break expression.
    #[must_use]
    pub const fn with_loop_break(mut self, loop_break: bool) -> Self {
        self.loop_break = Some(loop_break);
        self
    }
}

/// What to do with a task after a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResultAction {
    /// Run the task again after `delay`.
    Retry {
        /// Wait before the next attempt.
        delay: Duration,
        /// Retries made so far, including this one.
        attempts: u64,
    },
    /// The task is finished with `status`.
    Done {
        /// Final task status.
        status: PipelineStatus,
    },
}

/// How a cancel request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The pipeline had not started and was stopped directly.
    Stopped,
    /// The running pipeline was signalled; it is force-stopped after the
    /// grace period.
    Signalled,
}

/// A pipeline as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDTO {
    /// Pipeline ID.
    pub id: u64,
    /// Creating source.
    pub source: PipelineSource,
    /// Definition name.
    pub yml_name: String,
    /// Cluster name.
    pub cluster_name: String,
    /// Status.
    pub status: PipelineStatus,
    /// Readable status.
    pub status_desc: String,
    /// Review outcome, for pipelines under manual review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<PipelineStatus>,
    /// Labels.
    pub labels: HashMap<String, String>,
    /// Queue binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueBinding>,
    /// Tasks.
    pub tasks: Vec<PipelineTask>,
    /// Creation time.
    pub time_created: Timestamp,
    /// Queue entry time.
    #[serde(default)]
    pub time_enqueued: Option<Timestamp>,
    /// Start time.
    #[serde(default)]
    pub time_begin: Option<Timestamp>,
    /// End time.
    #[serde(default)]
    pub time_end: Option<Timestamp>,
    /// Running time in seconds, once ended.
    #[serde(default)]
    pub cost_time_sec: Option<i64>,
    /// Whether the resources were released.
    pub resources_released: bool,
    /// The pipeline this one reruns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerun_of: Option<u64>,
}

impl From<&PipelineRecord> for PipelineDTO {
    fn from(record: &PipelineRecord) -> Self {
        let cost_time_sec = match (record.started_at, record.ended_at) {
            (Some(begin), Some(end)) => Some((end - begin).num_seconds()),
            _ => None,
        };

        Self {
            id: record.id,
            source: record.source,
            yml_name: record.yml_name.clone(),
            cluster_name: record.cluster_name.clone(),
            status: record.status,
            status_desc: record.status.desc().to_string(),
            approval_status: record.approval_status(),
            labels: record.labels.clone(),
            queue: record.queue.clone(),
            tasks: record.tasks.clone(),
            time_created: record.time_created,
            time_enqueued: record.enqueued_at,
            time_begin: record.started_at,
            time_end: record.ended_at,
            cost_time_sec,
            resources_released: record.resource_gc_state == ResourceGcState::Done,
            rerun_of: record.rerun_of,
        }
    }
}
