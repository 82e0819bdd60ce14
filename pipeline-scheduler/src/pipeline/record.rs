//! Pipeline and task records.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::PipelineSource;
use crate::errors::{Result, SchedulerError};
use crate::gc::{PipelineGC, ResourceGcState};
use crate::priority::ActionConcurrency;
use crate::queue::{AdmissionRequest, EnqueueCondition, Resources};
use crate::retry::PipelineTaskLoop;
use crate::status::{apply_transition, PipelineStatus, StatusTransition, TransitionOutcome};
use crate::utils::{add_duration, Timestamp};

/// Label carrying the ID of the queue a pipeline binds.
pub const LABEL_BIND_QUEUE_ID: &str = "bindQueueId";
/// Label overriding the queue priority for one pipeline.
pub const LABEL_BIND_QUEUE_CUSTOM_PRIORITY: &str = "bindQueueCustomPriority";
/// Label carrying an [`EnqueueCondition`].
pub const LABEL_BIND_QUEUE_ENQUEUE_CONDITION: &str = "bindQueueEnqueueCondition";

/// The queue a pipeline is scheduled through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueBinding {
    /// Queue ID.
    pub queue_id: u64,
    /// Queue name as of the last admission attempt.
    pub queue_name: String,
    /// Overrides the queue priority when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_priority: Option<i64>,
    /// Extra admission behavior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueue_condition: Option<EnqueueCondition>,
    /// Running limit granted by the matched priority rule. The pipeline is
    /// only admitted while fewer pipelines than this run in the queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u64>,
}

impl QueueBinding {
    /// Binds a queue with no overrides.
    #[must_use]
    pub fn new(queue_id: u64, queue_name: impl Into<String>) -> Self {
        Self {
            queue_id,
            queue_name: queue_name.into(),
            custom_priority: None,
            enqueue_condition: None,
            concurrency: None,
        }
    }

    /// Sets the custom priority.
    #[must_use]
    pub fn with_custom_priority(mut self, priority: i64) -> Self {
        self.custom_priority = Some(priority);
        self
    }

    /// Sets the enqueue condition.
    #[must_use]
    pub fn with_enqueue_condition(mut self, condition: EnqueueCondition) -> Self {
        self.enqueue_condition = Some(condition);
        self
    }

    /// Sets the running limit.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: u64) -> Self {
        self.concurrency = Some(concurrency);
        self
    }
}

/// One task of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTask {
    /// Task ID, unique within the pipeline.
    pub id: u64,
    /// Task name.
    pub name: String,
    /// Action type the task runs, e.g. `git-checkout`.
    pub action_type: String,
    /// Current status.
    #[serde(default)]
    pub status: PipelineStatus,
    /// Loop settings.
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub task_loop: Option<PipelineTaskLoop>,
    /// Per-action concurrency limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<ActionConcurrency>,
    /// Retries already made.
    #[serde(default)]
    pub attempts: u64,
}

impl PipelineTask {
    /// Creates an analyzed task.
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            action_type: action_type.into(),
            status: PipelineStatus::Analyzed,
            task_loop: None,
            concurrency: None,
            attempts: 0,
        }
    }

    /// Sets the loop.
    #[must_use]
    pub fn with_loop(mut self, task_loop: PipelineTaskLoop) -> Self {
        self.task_loop = Some(task_loop);
        self
    }

    /// Sets the action concurrency.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: ActionConcurrency) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Applies a status transition to the task.
    pub fn apply(&mut self, transition: StatusTransition) -> Result<TransitionOutcome> {
        let outcome = apply_transition(self.status, transition)?;
        self.status = outcome.status;
        Ok(outcome)
    }
}

/// A pipeline and its scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRecord {
    /// Pipeline ID.
    pub id: u64,
    /// Creating source.
    pub source: PipelineSource,
    /// Name of the pipeline definition.
    pub yml_name: String,
    /// Raw pipeline definition.
    #[serde(default)]
    pub yml: String,
    /// Cluster the pipeline runs on.
    pub cluster_name: String,
    /// Current status.
    pub status: PipelineStatus,
    /// Labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Run parameters.
    #[serde(default)]
    pub run_params: HashMap<String, serde_json::Value>,
    /// Queue binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueBinding>,
    /// Requested resources.
    #[serde(default)]
    pub resources: Resources,
    /// Maximum running time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_second: Option<u64>,
    /// GC settings.
    #[serde(default)]
    pub gc: PipelineGC,
    /// Tasks.
    #[serde(default)]
    pub tasks: Vec<PipelineTask>,
    /// Definition-level loop, used by tasks without their own.
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub task_loop: Option<PipelineTaskLoop>,
    /// Creation time.
    pub time_created: Timestamp,
    /// When the pipeline first entered its queue.
    #[serde(default)]
    pub enqueued_at: Option<Timestamp>,
    /// When the pipeline started running.
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    /// When the pipeline reached an end status.
    #[serde(default)]
    pub ended_at: Option<Timestamp>,
    /// Resource reclamation progress.
    #[serde(default)]
    pub resource_gc_state: ResourceGcState,
    /// The pipeline this one reruns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerun_of: Option<u64>,
    /// Under manual review. The review outcome is shown next to `status`
    /// and never replaces it.
    #[serde(default)]
    pub manual_review: bool,
}

impl PipelineRecord {
    /// Creates an analyzed pipeline.
    #[must_use]
    pub fn new(
        id: u64,
        source: PipelineSource,
        yml_name: impl Into<String>,
        cluster_name: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            source,
            yml_name: yml_name.into(),
            yml: String::new(),
            cluster_name: cluster_name.into(),
            status: PipelineStatus::Analyzed,
            labels: HashMap::new(),
            run_params: HashMap::new(),
            queue: None,
            resources: Resources::default(),
            timeout_second: None,
            gc: PipelineGC::default(),
            tasks: Vec::new(),
            task_loop: None,
            time_created: now,
            enqueued_at: None,
            started_at: None,
            ended_at: None,
            resource_gc_state: ResourceGcState::NotDone,
            rerun_of: None,
            manual_review: false,
        }
    }

    /// Applies a status transition.
    pub fn apply(&mut self, transition: StatusTransition) -> Result<TransitionOutcome> {
        let outcome = apply_transition(self.status, transition)?;
        self.status = outcome.status;
        Ok(outcome)
    }

    /// Moves the pipeline to an end status, stamping `ended_at` once.
    ///
    /// Returns false if the pipeline had already ended.
    pub fn finish(&mut self, status: PipelineStatus, now: Timestamp) -> Result<bool> {
        if !status.is_end_status() {
            return Err(SchedulerError::Internal(format!(
                "cannot finish pipeline {} with non-end status {status}",
                self.id
            )));
        }
        if self.status.is_end_status() {
            return Ok(false);
        }

        self.status = status;
        self.ended_at = Some(now);
        Ok(true)
    }

    /// Status as seen by reviewers, if the pipeline is under review.
    #[must_use]
    pub fn approval_status(&self) -> Option<PipelineStatus> {
        self.manual_review
            .then(|| self.status.change_state_for_manual_review())
    }

    /// Priority used in the queue: the custom priority, else the queue's.
    #[must_use]
    pub fn effective_priority(&self, queue_priority: i64) -> i64 {
        self.queue
            .as_ref()
            .and_then(|binding| binding.custom_priority)
            .unwrap_or(queue_priority)
    }

    /// What this pipeline asks of a queue with `queue_priority`.
    #[must_use]
    pub fn admission_request(&self, queue_priority: i64) -> AdmissionRequest {
        AdmissionRequest {
            priority: self.effective_priority(queue_priority),
            resources: self.resources,
            skip_running_limit: self.queue.as_ref().is_some_and(|binding| {
                binding.enqueue_condition == Some(EnqueueCondition::SkipAlreadyRunningLimit)
            }),
            concurrency: self.queue.as_ref().and_then(|binding| binding.concurrency),
        }
    }

    /// Running time limit.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_second.map(Duration::from_secs)
    }

    /// True if the pipeline runs past its timeout at `now`.
    #[must_use]
    pub fn is_timed_out(&self, now: Timestamp) -> bool {
        match (self.status, self.started_at, self.timeout()) {
            (PipelineStatus::Running, Some(started), Some(timeout)) => {
                add_duration(started, timeout) <= now
            }
            _ => false,
        }
    }

    /// Looks up a task.
    pub fn task(&self, task_id: u64) -> Result<&PipelineTask> {
        self.tasks
            .iter()
            .find(|task| task.id == task_id)
            .ok_or(SchedulerError::TaskNotFound {
                pipeline_id: self.id,
                task_id,
            })
    }

    /// Looks up a task for modification.
    pub fn task_mut(&mut self, task_id: u64) -> Result<&mut PipelineTask> {
        let pipeline_id = self.id;
        self.tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or(SchedulerError::TaskNotFound {
                pipeline_id,
                task_id,
            })
    }

    /// Loop of a task, merged with the definition-level loop.
    pub fn loop_of(&self, task_id: u64) -> Result<Option<PipelineTaskLoop>> {
        let task = self.task(task_id)?;
        Ok(PipelineTaskLoop::calculate(
            self.task_loop.as_ref(),
            task.task_loop.as_ref(),
        ))
    }

    /// Tasks that did not succeed, for a rerun of failed tasks.
    pub fn failed_tasks(&self) -> impl Iterator<Item = &PipelineTask> {
        self.tasks
            .iter()
            .filter(|task| !task.status.is_success_status() && task.status != PipelineStatus::Disabled)
    }
}
