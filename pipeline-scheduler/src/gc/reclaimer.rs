//! Collaborators used by garbage collection.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use crate::errors::Result;
use crate::pipeline::PipelineRecord;
use crate::status::PipelineStatus;
use crate::utils::Timestamp;

/// Releases the compute resources (volumes, namespaces) of a pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceReclaimer: Send + Sync {
    /// Releases everything the pipeline holds on `cluster_name`.
    ///
    /// Must tolerate being called for a pipeline whose resources are
    /// already gone.
    async fn release(&self, pipeline_id: u64, cluster_name: &str) -> Result<()>;
}

/// Creation time limits of archived records; older records are purged.
///
/// Pipelines that never ran and finished pipelines keep separate windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveCutoff {
    /// Limit for records archived in `Analyzed`.
    pub analyzed_before: Timestamp,
    /// Limit for every other record.
    pub finished_before: Timestamp,
}

impl ArchiveCutoff {
    /// True if `record` is past its retention window.
    #[must_use]
    pub fn is_expired(&self, record: &PipelineRecord) -> bool {
        let before = if record.status == PipelineStatus::Analyzed {
            self.analyzed_before
        } else {
            self.finished_before
        };
        record.time_created < before
    }
}

/// Receives records removed by database GC that need archiving.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Stores the record. An error keeps the record in the live store.
    async fn archive(&self, record: PipelineRecord) -> Result<()>;

    /// Looks up an archived record.
    async fn get(&self, pipeline_id: u64) -> Result<Option<PipelineRecord>>;

    /// Drops archived records past `cutoff`, returning how many went.
    async fn purge_before(&self, cutoff: ArchiveCutoff) -> Result<usize>;
}

/// Reclaimer that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReclaimer;

#[async_trait]
impl ResourceReclaimer for LoggingReclaimer {
    async fn release(&self, pipeline_id: u64, cluster_name: &str) -> Result<()> {
        info!(pipeline_id, cluster_name, "Released pipeline resources");
        Ok(())
    }
}

/// Archive kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryArchiveStore {
    records: RwLock<Vec<PipelineRecord>>,
}

impl InMemoryArchiveStore {
    /// Creates an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Archived records in archive order.
    #[must_use]
    pub fn archived(&self) -> Vec<PipelineRecord> {
        self.records.read().clone()
    }

    /// Number of archived records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True if nothing was archived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl ArchiveStore for InMemoryArchiveStore {
    async fn archive(&self, record: PipelineRecord) -> Result<()> {
        self.records.write().push(record);
        Ok(())
    }

    async fn get(&self, pipeline_id: u64) -> Result<Option<PipelineRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|record| record.id == pipeline_id)
            .cloned())
    }

    async fn purge_before(&self, cutoff: ArchiveCutoff) -> Result<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|record| !cutoff.is_expired(record));
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineSource;
    use crate::utils::now_utc;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_in_memory_archive() {
        let archive = InMemoryArchiveStore::new();
        assert!(archive.is_empty());

        let record = PipelineRecord::new(9, PipelineSource::Qa, "qa.yml", "dev", now_utc());
        archive.archive(record.clone()).await.unwrap();

        assert_eq!(archive.len(), 1);
        assert_eq!(archive.get(9).await.unwrap(), Some(record));
        assert!(archive.get(10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_uses_separate_windows() {
        let base = now_utc();
        let hour = chrono::Duration::hours(1);
        let archive = InMemoryArchiveStore::new();

        let never_ran = PipelineRecord::new(1, PipelineSource::Dice, "a.yml", "dev", base - hour * 3);
        let mut old_finished =
            PipelineRecord::new(2, PipelineSource::Dice, "b.yml", "dev", base - hour * 3);
        old_finished.status = PipelineStatus::Success;
        let mut new_finished =
            PipelineRecord::new(3, PipelineSource::Dice, "c.yml", "dev", base - hour);
        new_finished.status = PipelineStatus::Failed;
        for record in [never_ran, old_finished, new_finished] {
            archive.archive(record).await.unwrap();
        }

        let cutoff = ArchiveCutoff {
            analyzed_before: base - hour * 4,
            finished_before: base - hour * 2,
        };
        assert_eq!(archive.purge_before(cutoff).await.unwrap(), 1);

        let left: Vec<u64> = archive.archived().iter().map(|record| record.id).collect();
        assert_eq!(left, vec![1, 3]);
        assert_eq!(archive.purge_before(cutoff).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_logging_reclaimer_succeeds() {
        LoggingReclaimer.release(1, "dev").await.unwrap();
    }
}
