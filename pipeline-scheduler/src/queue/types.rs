//! Queue definitions and requests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::UnknownEnumValue;
use crate::pipeline::PipelineSource;
use crate::utils::Timestamp;

/// Priority of a queue that does not declare one.
pub const PIPELINE_QUEUE_DEFAULT_PRIORITY: i64 = 10;

/// Concurrency of a queue that does not declare one.
pub const PIPELINE_QUEUE_DEFAULT_CONCURRENCY: u64 = 1;

/// Order in which pending pipelines are considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScheduleStrategy {
    /// Higher priority first, arrival order within a priority.
    #[default]
    #[serde(rename = "FIFO")]
    Fifo,
}

/// How strictly a queue applies its concurrency ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueueMode {
    /// The ceiling is never exceeded.
    #[default]
    Strict,
    /// Pipelines that opt in may run past the ceiling.
    Loose,
}

impl QueueMode {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "STRICT",
            Self::Loose => "LOOSE",
        }
    }
}

impl fmt::Display for QueueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueMode {
    type Err = UnknownEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STRICT" => Ok(Self::Strict),
            "LOOSE" => Ok(Self::Loose),
            other => Err(UnknownEnumValue::new("queue mode", other)),
        }
    }
}

/// Extra admission behavior requested by a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnqueueCondition {
    /// Run even if the queue already reached its concurrency.
    #[serde(rename = "SkipAlreadyRunningLimit")]
    SkipAlreadyRunningLimit,
}

impl EnqueueCondition {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SkipAlreadyRunningLimit => "SkipAlreadyRunningLimit",
        }
    }
}

impl FromStr for EnqueueCondition {
    type Err = UnknownEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SkipAlreadyRunningLimit" => Ok(Self::SkipAlreadyRunningLimit),
            other => Err(UnknownEnumValue::new("enqueue condition", other)),
        }
    }
}

/// CPU and memory requested by a pipeline or held by a queue.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    /// CPU cores.
    #[serde(default)]
    pub cpu: f64,
    /// Memory in megabytes.
    #[serde(default, rename = "memoryMB")]
    pub memory_mb: f64,
}

impl Resources {
    /// Creates a resource amount.
    #[must_use]
    pub const fn new(cpu: f64, memory_mb: f64) -> Self {
        Self { cpu, memory_mb }
    }

    /// Component-wise sum.
    #[must_use]
    pub fn plus(self, other: Self) -> Self {
        Self {
            cpu: self.cpu + other.cpu,
            memory_mb: self.memory_mb + other.memory_mb,
        }
    }

    /// True if both components fit under `ceiling`.
    #[must_use]
    pub fn fits_within(&self, ceiling: &Self) -> bool {
        self.cpu <= ceiling.cpu && self.memory_mb <= ceiling.memory_mb
    }
}

/// A named admission queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineQueue {
    /// Assigned ID.
    pub id: u64,
    /// Name, unique within the source.
    pub name: String,
    /// Owning source. Immutable after creation.
    pub pipeline_source: PipelineSource,
    /// Cluster the queued pipelines run on.
    pub cluster_name: String,
    /// Ordering strategy.
    pub schedule_strategy: ScheduleStrategy,
    /// Concurrency enforcement mode.
    pub mode: QueueMode,
    /// Default priority of pipelines in this queue.
    pub priority: i64,
    /// Maximum number of running pipelines.
    pub concurrency: u64,
    /// CPU ceiling over all running pipelines.
    #[serde(rename = "maxCPU")]
    pub max_cpu: f64,
    /// Memory ceiling over all running pipelines, in megabytes.
    #[serde(rename = "maxMemoryMB")]
    pub max_memory_mb: f64,
    /// Free-form labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Creation time.
    pub time_created: Timestamp,
    /// Last update time.
    pub time_updated: Timestamp,
}

impl PipelineQueue {
    /// Resource ceiling as a [`Resources`] value.
    #[must_use]
    pub fn max_resources(&self) -> Resources {
        Resources::new(self.max_cpu, self.max_memory_mb)
    }
}

/// Request to create a queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineQueueCreateRequest {
    /// Queue name.
    pub name: String,
    /// Owning source, as its wire name.
    pub pipeline_source: String,
    /// Cluster name.
    pub cluster_name: String,
    /// Ordering strategy; FIFO when unset.
    #[serde(default)]
    pub schedule_strategy: Option<ScheduleStrategy>,
    /// Mode; STRICT when unset.
    #[serde(default)]
    pub mode: Option<QueueMode>,
    /// Priority; 10 when unset.
    #[serde(default)]
    pub priority: Option<i64>,
    /// Concurrency; 1 when unset.
    #[serde(default)]
    pub concurrency: Option<i64>,
    /// CPU ceiling.
    #[serde(default, rename = "maxCPU")]
    pub max_cpu: f64,
    /// Memory ceiling in megabytes.
    #[serde(default, rename = "maxMemoryMB")]
    pub max_memory_mb: f64,
    /// Labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl PipelineQueueCreateRequest {
    /// Creates a request with the required fields.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        pipeline_source: PipelineSource,
        cluster_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pipeline_source: pipeline_source.as_str().to_string(),
            cluster_name: cluster_name.into(),
            ..Default::default()
        }
    }

    /// Sets the mode.
    #[must_use]
    pub fn with_mode(mut self, mode: QueueMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the concurrency.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: i64) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Sets the resource ceilings.
    #[must_use]
    pub fn with_max_resources(mut self, cpu: f64, memory_mb: f64) -> Self {
        self.max_cpu = cpu;
        self.max_memory_mb = memory_mb;
        self
    }
}

/// Request to update a queue. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineQueueUpdateRequest {
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// Must equal the current source when set.
    #[serde(default)]
    pub pipeline_source: Option<String>,
    /// New cluster.
    #[serde(default)]
    pub cluster_name: Option<String>,
    /// New strategy.
    #[serde(default)]
    pub schedule_strategy: Option<ScheduleStrategy>,
    /// New mode.
    #[serde(default)]
    pub mode: Option<QueueMode>,
    /// New priority.
    #[serde(default)]
    pub priority: Option<i64>,
    /// New concurrency.
    #[serde(default)]
    pub concurrency: Option<i64>,
    /// New CPU ceiling.
    #[serde(default, rename = "maxCPU")]
    pub max_cpu: Option<f64>,
    /// New memory ceiling.
    #[serde(default, rename = "maxMemoryMB")]
    pub max_memory_mb: Option<f64>,
    /// Replacement labels.
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

/// Filter for listing queues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueListFilter {
    /// Only queues of this source.
    pub pipeline_source: Option<PipelineSource>,
    /// Only queues on this cluster.
    pub cluster_name: Option<String>,
}

impl QueueListFilter {
    /// True if `queue` passes the filter.
    #[must_use]
    pub fn matches(&self, queue: &PipelineQueue) -> bool {
        self.pipeline_source
            .map_or(true, |source| source == queue.pipeline_source)
            && self
                .cluster_name
                .as_deref()
                .map_or(true, |cluster| cluster == queue.cluster_name)
    }
}

/// Current load of a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueUsage {
    /// Queue ID.
    pub queue_id: u64,
    /// Number of running pipelines.
    pub running_count: usize,
    /// Number of pending pipelines.
    pub pending_count: usize,
    /// Running pipeline IDs, ascending.
    pub running_ids: Vec<u64>,
    /// Pending pipeline IDs in admission order.
    pub pending_ids: Vec<u64>,
    /// Resources held by running pipelines.
    pub used: Resources,
}
