//! In-memory state of one queue.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use super::types::{PipelineQueue, QueueMode, QueueUsage, Resources};

/// Ordering key of a pending pipeline: higher priority first, then arrival.
type PendingKey = (Reverse<i64>, u64);

/// What a pipeline asks for when it tries to run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionRequest {
    /// Effective priority.
    pub priority: i64,
    /// Requested resources.
    pub resources: Resources,
    /// Skip the running limit (honored in LOOSE queues only).
    pub skip_running_limit: bool,
    /// Lower running limit for this pipeline, if any.
    pub concurrency: Option<u64>,
}

/// Outcome of [`QueueState::try_admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Moved from pending to running.
    Admitted,
    /// Already running in this queue.
    AlreadyRunning,
    /// Left pending.
    Wait(String),
    /// Can never run in this queue.
    Never(String),
}

/// A queue definition together with its pending and running sets.
#[derive(Debug, Clone)]
pub struct QueueState {
    queue: PipelineQueue,
    pending: BTreeMap<PendingKey, u64>,
    pending_keys: HashMap<u64, PendingKey>,
    running: HashMap<u64, Resources>,
    next_seq: u64,
}

impl QueueState {
    /// Creates an empty state for `queue`.
    #[must_use]
    pub fn new(queue: PipelineQueue) -> Self {
        Self {
            queue,
            pending: BTreeMap::new(),
            pending_keys: HashMap::new(),
            running: HashMap::new(),
            next_seq: 0,
        }
    }

    /// The queue definition.
    #[must_use]
    pub fn queue(&self) -> &PipelineQueue {
        &self.queue
    }

    /// Mutable access to the queue definition.
    pub fn queue_mut(&mut self) -> &mut PipelineQueue {
        &mut self.queue
    }

    /// True if the pipeline waits in this queue.
    #[must_use]
    pub fn is_pending(&self, pipeline_id: u64) -> bool {
        self.pending_keys.contains_key(&pipeline_id)
    }

    /// True if the pipeline holds a running slot.
    #[must_use]
    pub fn is_running(&self, pipeline_id: u64) -> bool {
        self.running.contains_key(&pipeline_id)
    }

    /// True if nothing is pending or running.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }

    /// Adds a pipeline to the pending set. Returns false if it was already there.
    pub fn push_pending(&mut self, pipeline_id: u64, priority: i64) -> bool {
        if self.pending_keys.contains_key(&pipeline_id) {
            return false;
        }

        let key = (Reverse(priority), self.next_seq);
        self.next_seq += 1;
        self.pending.insert(key, pipeline_id);
        self.pending_keys.insert(pipeline_id, key);
        true
    }

    /// Removes a pipeline from the pending set.
    pub fn remove_pending(&mut self, pipeline_id: u64) -> bool {
        match self.pending_keys.remove(&pipeline_id) {
            Some(key) => {
                self.pending.remove(&key);
                true
            }
            None => false,
        }
    }

    /// The pipeline next in line.
    #[must_use]
    pub fn head(&self) -> Option<u64> {
        self.pending.values().next().copied()
    }

    /// Sum of resources held by running pipelines.
    #[must_use]
    pub fn used_resources(&self) -> Resources {
        self.running
            .values()
            .fold(Resources::default(), |acc, r| acc.plus(*r))
    }

    fn concurrency_for(&self, request: &AdmissionRequest) -> u64 {
        request
            .concurrency
            .map_or(self.queue.concurrency, |limit| limit.min(self.queue.concurrency))
    }

    fn has_free_slot(&self, request: &AdmissionRequest) -> bool {
        u64::try_from(self.running.len()).map_or(false, |n| n < self.concurrency_for(request))
    }

    /// Tries to move a pipeline into the running set.
    ///
    /// The pipeline is added to the pending set first if it is not there.
    /// It is admitted only when it heads the pending order, a concurrency
    /// slot is free and the resources fit. A LOOSE queue lets a pipeline
    /// that asks to skip the running limit jump the line and the
    /// concurrency ceiling, never the resource ceiling.
    pub fn try_admit(&mut self, pipeline_id: u64, request: &AdmissionRequest) -> Admission {
        if self.is_running(pipeline_id) {
            return Admission::AlreadyRunning;
        }

        let ceiling = self.queue.max_resources();
        if !request.resources.fits_within(&ceiling) {
            self.remove_pending(pipeline_id);
            return Admission::Never(format!(
                "resource request (cpu: {}, memoryMB: {}) exceeds queue limit (cpu: {}, memoryMB: {})",
                request.resources.cpu, request.resources.memory_mb, ceiling.cpu, ceiling.memory_mb
            ));
        }

        self.push_pending(pipeline_id, request.priority);

        let bypass = self.queue.mode == QueueMode::Loose && request.skip_running_limit;

        if !bypass {
            if let Some(head) = self.head() {
                if head != pipeline_id {
                    return Admission::Wait(format!("waiting for pipeline {head} ahead in queue"));
                }
            }
            if !self.has_free_slot(request) {
                return Admission::Wait(format!(
                    "queue is full: running {}, concurrency {}",
                    self.running.len(),
                    self.concurrency_for(request)
                ));
            }
        }

        if !self.used_resources().plus(request.resources).fits_within(&ceiling) {
            return Admission::Wait("insufficient free resources in queue".to_string());
        }

        self.remove_pending(pipeline_id);
        self.running.insert(pipeline_id, request.resources);
        Admission::Admitted
    }

    /// Frees the running slot of a pipeline, returning its resources.
    pub fn release(&mut self, pipeline_id: u64) -> Option<Resources> {
        self.running.remove(&pipeline_id)
    }

    /// Pending pipeline IDs in admission order.
    #[must_use]
    pub fn pending_order(&self) -> Vec<u64> {
        self.pending.values().copied().collect()
    }

    /// Snapshot of the current load.
    #[must_use]
    pub fn usage(&self) -> QueueUsage {
        let mut running_ids: Vec<u64> = self.running.keys().copied().collect();
        running_ids.sort_unstable();

        QueueUsage {
            queue_id: self.queue.id,
            running_count: self.running.len(),
            pending_count: self.pending.len(),
            running_ids,
            pending_ids: self.pending_order(),
            used: self.used_resources(),
        }
    }
}
