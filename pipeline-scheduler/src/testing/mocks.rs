//! Recording and failing GC collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

use crate::errors::{Result, SchedulerError};
use crate::gc::{ArchiveCutoff, ArchiveStore, ResourceReclaimer};
use crate::pipeline::PipelineRecord;

/// A reclaimer that records its calls and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingReclaimer {
    calls: Mutex<Vec<(u64, String)>>,
    failing: Mutex<HashSet<u64>>,
}

impl RecordingReclaimer {
    /// Creates a reclaimer that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes releases of `pipeline_id` fail until [`Self::recover`].
    pub fn fail_for(&self, pipeline_id: u64) {
        self.failing.lock().insert(pipeline_id);
    }

    /// Lets releases of `pipeline_id` succeed again.
    pub fn recover(&self, pipeline_id: u64) {
        self.failing.lock().remove(&pipeline_id);
    }

    /// Calls made so far, failed ones included.
    #[must_use]
    pub fn calls(&self) -> Vec<(u64, String)> {
        self.calls.lock().clone()
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ResourceReclaimer for RecordingReclaimer {
    async fn release(&self, pipeline_id: u64, cluster_name: &str) -> Result<()> {
        self.calls.lock().push((pipeline_id, cluster_name.to_string()));
        if self.failing.lock().contains(&pipeline_id) {
            return Err(SchedulerError::reclaim(pipeline_id, "injected failure"));
        }
        Ok(())
    }
}

/// An archive that rejects everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingArchiveStore;

#[async_trait]
impl ArchiveStore for FailingArchiveStore {
    async fn archive(&self, record: PipelineRecord) -> Result<()> {
        Err(SchedulerError::archive(record.id, "archive unavailable"))
    }

    async fn get(&self, pipeline_id: u64) -> Result<Option<PipelineRecord>> {
        Err(SchedulerError::archive(pipeline_id, "archive unavailable"))
    }

    async fn purge_before(&self, _cutoff: ArchiveCutoff) -> Result<usize> {
        Err(SchedulerError::Internal("archive unavailable".to_string()))
    }
}
