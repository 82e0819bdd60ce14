//! Fixtures for records and queues.

use std::time::Duration;

use crate::errors::Result;
use crate::pipeline::{PipelineRecord, PipelineSource, PipelineStore, QueueBinding};
use crate::queue::{
    PipelineQueue, PipelineQueueCreateRequest, QueueMode, QueueRegistry, Resources,
};
use crate::status::PipelineStatus;
use crate::utils::{add_duration, now_utc, Timestamp};

/// A pipeline record builder with test defaults: source `dice`, cluster
/// `dev`, status `Analyzed`.
#[derive(Debug, Clone)]
pub struct RecordFixture {
    source: PipelineSource,
    cluster_name: String,
    status: PipelineStatus,
    queue: Option<QueueBinding>,
    resources: Resources,
    created_at: Timestamp,
    ended_after: Option<Duration>,
}

impl Default for RecordFixture {
    fn default() -> Self {
        Self {
            source: PipelineSource::Dice,
            cluster_name: "dev".to_string(),
            status: PipelineStatus::Analyzed,
            queue: None,
            resources: Resources::default(),
            created_at: now_utc(),
            ended_after: None,
        }
    }
}

impl RecordFixture {
    /// Creates a fixture with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source.
    #[must_use]
    pub fn source(mut self, source: PipelineSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn status(mut self, status: PipelineStatus) -> Self {
        self.status = status;
        self
    }

    /// Binds a queue.
    #[must_use]
    pub fn queue(mut self, binding: QueueBinding) -> Self {
        self.queue = Some(binding);
        self
    }

    /// Sets the requested resources.
    #[must_use]
    pub fn resources(mut self, cpu: f64, memory_mb: f64) -> Self {
        self.resources = Resources::new(cpu, memory_mb);
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub fn created_at(mut self, at: Timestamp) -> Self {
        self.created_at = at;
        self
    }

    /// Ends the pipeline with `status`, `after` its creation.
    #[must_use]
    pub fn ended(mut self, status: PipelineStatus, after: Duration) -> Self {
        self.status = status;
        self.ended_after = Some(after);
        self
    }

    /// Builds the record with `id`.
    #[must_use]
    pub fn build(&self, id: u64) -> PipelineRecord {
        let mut record = PipelineRecord::new(
            id,
            self.source,
            "pipeline.yml",
            self.cluster_name.clone(),
            self.created_at,
        );
        record.status = self.status;
        record.queue = self.queue.clone();
        record.resources = self.resources;
        record.ended_at = self
            .ended_after
            .map(|after| add_duration(self.created_at, after));
        record
    }

    /// Builds the record under a fresh ID and stores it.
    pub fn insert(&self, store: &PipelineStore) -> u64 {
        let id = store.next_id();
        store.insert(self.build(id));
        id
    }
}

/// A queue request builder with test defaults: source `dice`, cluster
/// `dev`, STRICT, concurrency 1, 8 CPU and 8 GiB.
#[derive(Debug, Clone)]
pub struct QueueFixture {
    request: PipelineQueueCreateRequest,
}

impl QueueFixture {
    /// Creates a fixture for a queue named `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            request: PipelineQueueCreateRequest::new(name, PipelineSource::Dice, "dev")
                .with_concurrency(1)
                .with_max_resources(8.0, 8192.0),
        }
    }

    /// Sets the mode.
    #[must_use]
    pub fn mode(mut self, mode: QueueMode) -> Self {
        self.request = self.request.with_mode(mode);
        self
    }

    /// Sets the concurrency.
    #[must_use]
    pub fn concurrency(mut self, concurrency: i64) -> Self {
        self.request = self.request.with_concurrency(concurrency);
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn priority(mut self, priority: i64) -> Self {
        self.request = self.request.with_priority(priority);
        self
    }

    /// The create request.
    #[must_use]
    pub fn request(&self) -> PipelineQueueCreateRequest {
        self.request.clone()
    }

    /// Creates the queue in `registry`.
    pub fn create(&self, registry: &QueueRegistry) -> Result<PipelineQueue> {
        registry.create(self.request())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_fixture() {
        let store = PipelineStore::new();
        let id = RecordFixture::new()
            .resources(1.0, 512.0)
            .ended(PipelineStatus::Failed, Duration::from_secs(90))
            .insert(&store);

        let record = store.get(id).unwrap();
        assert_eq!(record.status, PipelineStatus::Failed);
        assert_eq!(
            record.ended_at,
            Some(add_duration(record.time_created, Duration::from_secs(90)))
        );
        assert_eq!(record.resources, Resources::new(1.0, 512.0));
    }

    #[test]
    fn test_queue_fixture() {
        let registry = QueueRegistry::new();
        let queue = QueueFixture::new("ci")
            .mode(QueueMode::Loose)
            .priority(30)
            .create(&registry)
            .unwrap();

        assert_eq!(queue.mode, QueueMode::Loose);
        assert_eq!(queue.priority, 30);
        assert_eq!(queue.concurrency, 1);
    }
}
