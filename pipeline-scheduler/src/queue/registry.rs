//! Queue CRUD.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

use super::state::QueueState;
use super::types::{
    PipelineQueue, PipelineQueueCreateRequest, PipelineQueueUpdateRequest, QueueListFilter,
    PIPELINE_QUEUE_DEFAULT_CONCURRENCY, PIPELINE_QUEUE_DEFAULT_PRIORITY,
};
use crate::errors::{Result, SchedulerError, ValidationError};
use crate::pipeline::PipelineSource;
use crate::utils::now_utc;

/// Longest accepted queue name.
pub const QUEUE_NAME_MAX_LEN: usize = 191;

static QUEUE_NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").ok());

/// Shared handle to a queue's state.
pub type QueueHandle = Arc<Mutex<QueueState>>;

/// All queues, addressable by ID or by `(source, name)`.
///
/// Each queue sits behind its own lock so queues are scheduled
/// independently.
#[derive(Debug, Default)]
pub struct QueueRegistry {
    queues: DashMap<u64, QueueHandle>,
    names: DashMap<(PipelineSource, String), u64>,
    next_id: AtomicU64,
}

impl QueueRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue.
    pub fn create(&self, req: PipelineQueueCreateRequest) -> Result<PipelineQueue> {
        let source: PipelineSource = req.pipeline_source.parse().map_err(|_| {
            ValidationError::new(format!("invalid pipeline source: {}", req.pipeline_source))
                .with_field("pipelineSource")
        })?;
        validate_name(&req.name)?;
        if req.cluster_name.trim().is_empty() {
            return Err(ValidationError::new("missing cluster name")
                .with_field("clusterName")
                .into());
        }

        let priority = req.priority.unwrap_or(PIPELINE_QUEUE_DEFAULT_PRIORITY);
        validate_priority(priority)?;
        let concurrency = match req.concurrency {
            Some(value) => validate_concurrency(value)?,
            None => PIPELINE_QUEUE_DEFAULT_CONCURRENCY,
        };
        validate_resource("maxCPU", req.max_cpu)?;
        validate_resource("maxMemoryMB", req.max_memory_mb)?;

        let now = now_utc();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let queue = PipelineQueue {
            id,
            name: req.name,
            pipeline_source: source,
            cluster_name: req.cluster_name,
            schedule_strategy: req.schedule_strategy.unwrap_or_default(),
            mode: req.mode.unwrap_or_default(),
            priority,
            concurrency,
            max_cpu: req.max_cpu,
            max_memory_mb: req.max_memory_mb,
            labels: req.labels,
            time_created: now,
            time_updated: now,
        };

        match self.names.entry((source, queue.name.clone())) {
            Entry::Occupied(_) => {
                return Err(ValidationError::new(format!(
                    "queue already exists: source: {source}, name: {}",
                    queue.name
                ))
                .with_field("name")
                .into());
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
                self.queues
                    .insert(id, Arc::new(Mutex::new(QueueState::new(queue.clone()))));
            }
        }

        info!(
            queue_id = id,
            queue_name = %queue.name,
            source = %source,
            cluster = %queue.cluster_name,
            mode = %queue.mode,
            concurrency,
            priority,
            "Created pipeline queue"
        );
        Ok(queue)
    }

    /// Returns the state handle of a queue.
    pub fn handle(&self, queue_id: u64) -> Result<QueueHandle> {
        self.queues
            .get(&queue_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SchedulerError::QueueNotFound(queue_id.to_string()))
    }

    /// Returns the state handle of a queue looked up by source and name.
    #[must_use]
    pub fn handle_by_name(&self, source: PipelineSource, name: &str) -> Option<QueueHandle> {
        let id = *self.names.get(&(source, name.to_string()))?;
        self.handle(id).ok()
    }

    /// Returns a queue by ID.
    pub fn get(&self, queue_id: u64) -> Result<PipelineQueue> {
        Ok(self.handle(queue_id)?.lock().queue().clone())
    }

    /// Returns a queue by source and name.
    pub fn get_by_name(&self, source: PipelineSource, name: &str) -> Result<PipelineQueue> {
        self.handle_by_name(source, name)
            .map(|handle| handle.lock().queue().clone())
            .ok_or_else(|| SchedulerError::QueueNotFound(format!("{source}/{name}")))
    }

    /// Lists queues matching `filter`, ordered by ID.
    #[must_use]
    pub fn list(&self, filter: &QueueListFilter) -> Vec<PipelineQueue> {
        let handles: Vec<QueueHandle> = self
            .queues
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut queues: Vec<PipelineQueue> = handles
            .iter()
            .map(|handle| handle.lock().queue().clone())
            .filter(|queue| filter.matches(queue))
            .collect();
        queues.sort_by_key(|queue| queue.id);
        queues
    }

    /// Updates a queue. The source can never change.
    pub fn update(&self, queue_id: u64, req: PipelineQueueUpdateRequest) -> Result<PipelineQueue> {
        let handle = self.handle(queue_id)?;
        let mut state = handle.lock();
        let current = state.queue().clone();

        if let Some(source) = req.pipeline_source.as_deref() {
            if source != current.pipeline_source.as_str() {
                return Err(ValidationError::new("cannot change queue's source")
                    .with_field("pipelineSource")
                    .into());
            }
        }

        let mut updated = current.clone();
        if let Some(name) = req.name {
            validate_name(&name)?;
            updated.name = name;
        }
        if let Some(cluster) = req.cluster_name {
            if cluster.trim().is_empty() {
                return Err(ValidationError::new("missing cluster name")
                    .with_field("clusterName")
                    .into());
            }
            updated.cluster_name = cluster;
        }
        if let Some(strategy) = req.schedule_strategy {
            updated.schedule_strategy = strategy;
        }
        if let Some(mode) = req.mode {
            updated.mode = mode;
        }
        if let Some(priority) = req.priority {
            validate_priority(priority)?;
            updated.priority = priority;
        }
        if let Some(concurrency) = req.concurrency {
            updated.concurrency = validate_concurrency(concurrency)?;
        }
        if let Some(max_cpu) = req.max_cpu {
            validate_resource("maxCPU", max_cpu)?;
            updated.max_cpu = max_cpu;
        }
        if let Some(max_memory_mb) = req.max_memory_mb {
            validate_resource("maxMemoryMB", max_memory_mb)?;
            updated.max_memory_mb = max_memory_mb;
        }
        if let Some(labels) = req.labels {
            updated.labels = labels;
        }

        if updated.name != current.name {
            match self.names.entry((updated.pipeline_source, updated.name.clone())) {
                Entry::Occupied(_) => {
                    return Err(ValidationError::new(format!(
                        "queue already exists: source: {}, name: {}",
                        updated.pipeline_source, updated.name
                    ))
                    .with_field("name")
                    .into());
                }
                Entry::Vacant(slot) => {
                    slot.insert(queue_id);
                }
            }
            self.names.remove(&(current.pipeline_source, current.name.clone()));
        }

        updated.time_updated = now_utc();
        *state.queue_mut() = updated.clone();

        debug!(queue_id, queue_name = %updated.name, "Updated pipeline queue");
        Ok(updated)
    }

    /// Deletes a queue. Refused while pipelines are pending or running in it.
    pub fn delete(&self, queue_id: u64) -> Result<PipelineQueue> {
        let handle = self.handle(queue_id)?;
        let state = handle.lock();

        if !state.is_idle() {
            let usage = state.usage();
            return Err(ValidationError::new(format!(
                "cannot delete queue {queue_id}: {} running and {} pending pipelines",
                usage.running_count, usage.pending_count
            ))
            .into());
        }

        let queue = state.queue().clone();
        self.names.remove(&(queue.pipeline_source, queue.name.clone()));
        self.queues.remove(&queue_id);

        info!(queue_id, queue_name = %queue.name, "Deleted pipeline queue");
        Ok(queue)
    }

    /// Number of queues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// True if there are no queues.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

fn validate_name(name: &str) -> Result<()> {
    let pattern = QUEUE_NAME_PATTERN
        .as_ref()
        .ok_or_else(|| SchedulerError::Internal("queue name pattern failed to compile".into()))?;

    if name.is_empty() {
        return Err(ValidationError::new("missing queue name").with_field("name").into());
    }
    if name.len() > QUEUE_NAME_MAX_LEN {
        return Err(ValidationError::new(format!(
            "queue name too long: {} > {QUEUE_NAME_MAX_LEN}",
            name.len()
        ))
        .with_field("name")
        .into());
    }
    if !pattern.is_match(name) {
        return Err(ValidationError::new(format!("invalid queue name: {name}"))
            .with_field("name")
            .into());
    }
    Ok(())
}

fn validate_priority(priority: i64) -> Result<()> {
    if priority < 0 {
        return Err(ValidationError::new(format!("invalid priority: {priority}, must be >= 0"))
            .with_field("priority")
            .into());
    }
    Ok(())
}

fn validate_concurrency(concurrency: i64) -> Result<u64> {
    match u64::try_from(concurrency) {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(ValidationError::new(format!(
            "invalid concurrency: {concurrency}, must be >= 1"
        ))
        .with_field("concurrency")
        .into()),
    }
}

fn validate_resource(field: &'static str, value: f64) -> Result<()> {
    if value.is_nan() || value < 0.0 {
        return Err(ValidationError::new(format!("invalid {field}: {value}, must be >= 0"))
            .with_field(field)
            .into());
    }
    Ok(())
}
