//! In-memory pipeline store.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::PipelineRecord;
use crate::errors::{Result, SchedulerError};

/// Shared handle to one pipeline record.
pub type RecordHandle = Arc<Mutex<PipelineRecord>>;

/// Pipeline records keyed by ID, each behind its own lock.
///
/// Handles are cloned out of the map before they are locked, so holding a
/// record lock never pins a map shard. When a queue lock is needed too it
/// must be taken first.
#[derive(Debug, Default)]
pub struct PipelineStore {
    records: DashMap<u64, RecordHandle>,
    next_id: AtomicU64,
}

impl PipelineStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next pipeline ID.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Inserts or replaces a record.
    pub fn insert(&self, record: PipelineRecord) -> RecordHandle {
        let id = record.id;
        let handle = Arc::new(Mutex::new(record));
        self.records.insert(id, Arc::clone(&handle));
        handle
    }

    /// Returns the handle of a record.
    pub fn handle(&self, pipeline_id: u64) -> Result<RecordHandle> {
        self.records
            .get(&pipeline_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(SchedulerError::PipelineNotFound(pipeline_id))
    }

    /// Returns a snapshot of a record.
    pub fn get(&self, pipeline_id: u64) -> Result<PipelineRecord> {
        Ok(self.handle(pipeline_id)?.lock().clone())
    }

    /// True if the record exists.
    #[must_use]
    pub fn contains(&self, pipeline_id: u64) -> bool {
        self.records.contains_key(&pipeline_id)
    }

    /// Runs `f` with the record locked.
    pub fn with_record<T>(
        &self,
        pipeline_id: u64,
        f: impl FnOnce(&mut PipelineRecord) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(pipeline_id)?;
        let mut record = handle.lock();
        f(&mut record)
    }

    /// Removes the record if `predicate` holds on its current value.
    ///
    /// The check and the removal happen under the record lock, so a record
    /// that changed since it was selected is left alone.
    pub fn remove_if(
        &self,
        pipeline_id: u64,
        predicate: impl FnOnce(&PipelineRecord) -> bool,
    ) -> Option<PipelineRecord> {
        let handle = self.handle(pipeline_id).ok()?;
        let record = handle.lock();
        if !predicate(&record) {
            return None;
        }

        let removed = self
            .records
            .remove_if(&pipeline_id, |_, current| Arc::ptr_eq(current, &handle));
        removed.map(|_| record.clone())
    }

    /// All pipeline IDs in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.records.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Snapshots of all records, ordered by ID.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PipelineRecord> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.get(id).ok())
            .collect()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
