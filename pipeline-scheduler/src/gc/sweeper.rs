//! TTL driven resource and record reclamation.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{ArchiveCutoff, ArchiveStore, ResourceGcState, ResourceReclaimer};
use crate::config::GcConfig;
use crate::errors::{Result, SchedulerError};
use crate::events::{noop_sink, SchedulerEvent, SharedEventSink};
use crate::pipeline::{PipelineRecord, PipelineStore};
use crate::utils::{generate_worker_id, sub_duration, ttl_elapsed, Timestamp};

/// Outcome of resource GC for one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceGcOutcome {
    /// Resources were released by this call.
    Reclaimed,
    /// Resources had already been released.
    AlreadyReclaimed,
    /// Another sweeper holds the claim.
    InProgress,
    /// The TTL has not elapsed yet.
    NotDue,
    /// The pipeline has not ended.
    NotEnded,
}

/// Outcome of database GC for one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbGcOutcome {
    /// Archived, then removed from the store.
    Archived,
    /// Removed without archiving.
    Deleted,
    /// The TTL has not elapsed yet.
    NotDue,
    /// Running, or resources still held.
    NotEligible,
    /// The record changed or vanished while being collected.
    Skipped,
}

/// Totals of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Pipelines looked at.
    pub examined: usize,
    /// Pipelines whose resources were released.
    pub resources_released: usize,
    /// Records archived.
    pub archived: usize,
    /// Records deleted.
    pub deleted: usize,
    /// Archived records dropped after their retention window.
    pub archive_purged: usize,
    /// Pipelines on which a collaborator failed.
    pub failures: usize,
}

impl GcReport {
    pub(crate) fn merge(&mut self, other: Self) {
        self.examined += other.examined;
        self.resources_released += other.resources_released;
        self.archived += other.archived;
        self.deleted += other.deleted;
        self.archive_purged += other.archive_purged;
        self.failures += other.failures;
    }

    /// True if the sweep changed nothing.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.resources_released == 0
            && self.archived == 0
            && self.deleted == 0
            && self.archive_purged == 0
    }
}

enum Claim {
    Claimed { cluster_name: String },
    Skip(ResourceGcOutcome),
}

/// Applies resource and database GC to the pipelines of a store.
///
/// Several sweepers may run over the same store: resource release is
/// claimed under the record lock, and record removal only happens if the
/// record did not change since it was selected.
pub struct GcSweeper {
    store: Arc<PipelineStore>,
    reclaimer: Arc<dyn ResourceReclaimer>,
    archive: Arc<dyn ArchiveStore>,
    config: GcConfig,
    events: SharedEventSink,
    worker_id: Uuid,
}

impl GcSweeper {
    /// Creates a sweeper.
    #[must_use]
    pub fn new(
        store: Arc<PipelineStore>,
        reclaimer: Arc<dyn ResourceReclaimer>,
        archive: Arc<dyn ArchiveStore>,
        config: GcConfig,
    ) -> Self {
        Self {
            store,
            reclaimer,
            archive,
            config,
            events: noop_sink(),
            worker_id: generate_worker_id(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    /// The ID this sweeper claims records with.
    #[must_use]
    pub fn worker_id(&self) -> Uuid {
        self.worker_id
    }

    /// The GC configuration.
    #[must_use]
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Releases a pipeline's resources once its TTL has elapsed.
    ///
    /// Calling it again after success is a no-op. A failing reclaimer
    /// drops the claim so a later sweep retries.
    pub async fn gc_pipeline_resources(
        &self,
        pipeline_id: u64,
        now: Timestamp,
    ) -> Result<ResourceGcOutcome> {
        let worker = self.worker_id;
        let config = &self.config;

        let claim = self.store.with_record(pipeline_id, |record| {
            match record.resource_gc_state {
                ResourceGcState::Done => return Ok(Claim::Skip(ResourceGcOutcome::AlreadyReclaimed)),
                ResourceGcState::Claimed { .. } => return Ok(Claim::Skip(ResourceGcOutcome::InProgress)),
                ResourceGcState::NotDone => {}
            }

            let (Some(ended_at), Some(ttl)) = (record.ended_at, record.gc.resource_ttl(record.status, config))
            else {
                return Ok(Claim::Skip(ResourceGcOutcome::NotEnded));
            };
            if !ttl_elapsed(ended_at, ttl, now) {
                return Ok(Claim::Skip(ResourceGcOutcome::NotDue));
            }

            record.resource_gc_state = ResourceGcState::Claimed { worker };
            Ok(Claim::Claimed {
                cluster_name: record.cluster_name.clone(),
            })
        })?;

        let cluster_name = match claim {
            Claim::Claimed { cluster_name } => cluster_name,
            Claim::Skip(outcome) => return Ok(outcome),
        };

        let released = self.reclaimer.release(pipeline_id, &cluster_name).await;
        let held_by_us = |record: &PipelineRecord| {
            record.resource_gc_state == ResourceGcState::Claimed { worker }
        };

        match released {
            Ok(()) => {
                self.store.with_record(pipeline_id, |record| {
                    if held_by_us(record) {
                        record.resource_gc_state = ResourceGcState::Done;
                    }
                    Ok(())
                })?;
                info!(pipeline_id, cluster_name = %cluster_name, "Pipeline resources reclaimed");
                self.events
                    .emit(&SchedulerEvent::GcResourcesReleased { pipeline_id })
                    .await;
                Ok(ResourceGcOutcome::Reclaimed)
            }
            Err(err) => {
                let restored = self.store.with_record(pipeline_id, |record| {
                    if held_by_us(record) {
                        record.resource_gc_state = ResourceGcState::NotDone;
                    }
                    Ok(())
                });
                match restored {
                    // the record is gone and the claim with it
                    Ok(()) | Err(SchedulerError::PipelineNotFound(_)) => {}
                    Err(restore_err) => {
                        error!(pipeline_id, error = %restore_err, "Failed to drop resource GC claim");
                    }
                }
                warn!(pipeline_id, error = %err, "Failed to reclaim pipeline resources");
                Err(err)
            }
        }
    }

    /// Archives or deletes a record once its database TTL has elapsed.
    ///
    /// Pre-run pipelines use the `analyzed` timer counted from creation;
    /// ended pipelines use the `finished` timer counted from their end and
    /// are only removed after their resources were released.
    pub async fn gc_pipeline_record(&self, pipeline_id: u64, now: Timestamp) -> Result<DbGcOutcome> {
        let snapshot = self.store.get(pipeline_id)?;

        let (rule, since) = if snapshot.status.is_pre_run_status() {
            (snapshot.gc.analyzed_rule(&self.config), snapshot.time_created)
        } else if snapshot.status.is_end_status() {
            if snapshot.resource_gc_state != ResourceGcState::Done {
                return Ok(DbGcOutcome::NotEligible);
            }
            let since = snapshot.ended_at.unwrap_or(snapshot.time_created);
            (snapshot.gc.finished_rule(&self.config), since)
        } else {
            return Ok(DbGcOutcome::NotEligible);
        };

        if !ttl_elapsed(since, rule.ttl, now) {
            return Ok(DbGcOutcome::NotDue);
        }

        let Some(removed) = self.store.remove_if(pipeline_id, |current| {
            current.status == snapshot.status
                && current.ended_at == snapshot.ended_at
                && current.resource_gc_state == snapshot.resource_gc_state
        }) else {
            debug!(pipeline_id, "Record changed during GC, skipping");
            return Ok(DbGcOutcome::Skipped);
        };

        if !rule.need_archive {
            info!(pipeline_id, status = %removed.status, "Pipeline record deleted");
            self.events
                .emit(&SchedulerEvent::GcRecordDeleted { pipeline_id })
                .await;
            return Ok(DbGcOutcome::Deleted);
        }

        match self.archive.archive(removed.clone()).await {
            Ok(()) => {
                info!(pipeline_id, status = %removed.status, "Pipeline record archived");
                self.events
                    .emit(&SchedulerEvent::GcRecordArchived { pipeline_id })
                    .await;
                Ok(DbGcOutcome::Archived)
            }
            Err(err) => {
                self.store.insert(removed);
                warn!(pipeline_id, error = %err, "Failed to archive pipeline record, restored");
                if matches!(err, SchedulerError::Archive { .. }) {
                    Err(err)
                } else {
                    Err(SchedulerError::archive(pipeline_id, err.to_string()))
                }
            }
        }
    }

    async fn sweep_pipeline(&self, pipeline_id: u64, now: Timestamp) -> GcReport {
        let mut report = GcReport {
            examined: 1,
            ..GcReport::default()
        };

        match self.gc_pipeline_resources(pipeline_id, now).await {
            Ok(ResourceGcOutcome::Reclaimed) => report.resources_released += 1,
            Ok(_) => {}
            Err(SchedulerError::PipelineNotFound(_)) => return report,
            Err(err) => {
                error!(pipeline_id, error = %err, "Resource GC failed");
                report.failures += 1;
                return report;
            }
        }

        match self.gc_pipeline_record(pipeline_id, now).await {
            Ok(DbGcOutcome::Archived) => report.archived += 1,
            Ok(DbGcOutcome::Deleted) => report.deleted += 1,
            Ok(_) | Err(SchedulerError::PipelineNotFound(_)) => {}
            Err(err) => {
                error!(pipeline_id, error = %err, "Database GC failed");
                report.failures += 1;
            }
        }
        report
    }

    /// Retention limits of the archive at `now`.
    #[must_use]
    pub fn archive_cutoff(&self, now: Timestamp) -> ArchiveCutoff {
        ArchiveCutoff {
            analyzed_before: sub_duration(
                now,
                Duration::from_secs(self.config.analyzed_archive_retain_secs),
            ),
            finished_before: sub_duration(
                now,
                Duration::from_secs(self.config.finished_archive_retain_secs),
            ),
        }
    }

    /// Runs resource and database GC over every pipeline, one batch at a
    /// time, then purges archived records past their retention window.
    pub async fn sweep_once(&self, now: Timestamp) -> GcReport {
        let ids = self.store.ids();
        let batch_size = self.config.batch_size.max(1);
        let mut report = GcReport::default();

        for batch in ids.chunks(batch_size) {
            let results = join_all(batch.iter().map(|&id| self.sweep_pipeline(id, now))).await;
            for result in results {
                report.merge(result);
            }
            debug!(batch_len = batch.len(), "GC batch processed");
        }

        match self.archive.purge_before(self.archive_cutoff(now)).await {
            Ok(purged) => report.archive_purged = purged,
            Err(err) => {
                error!(error = %err, "Archive GC failed");
                report.failures += 1;
            }
        }

        if !report.is_idle() || report.failures > 0 {
            info!(
                examined = report.examined,
                resources_released = report.resources_released,
                archived = report.archived,
                deleted = report.deleted,
                archive_purged = report.archive_purged,
                failures = report.failures,
                "GC sweep finished"
            );
        }
        report
    }
}
