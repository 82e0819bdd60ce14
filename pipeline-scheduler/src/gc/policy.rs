//! Per-pipeline GC settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::config::GcConfig;
use crate::status::PipelineStatus;

/// GC settings attached to a pipeline.
///
/// Every leaf is optional so that an explicit zero or `false` stays
/// distinguishable from "not set"; [`GcConfig`] supplies the fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineGC {
    /// When to release compute resources.
    #[serde(default, rename = "resourceGC")]
    pub resource_gc: PipelineResourceGC,
    /// When to archive or delete the record.
    #[serde(default, rename = "databaseGC")]
    pub database_gc: PipelineDatabaseGC,
}

/// Resource release TTLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResourceGC {
    /// Seconds after a successful end.
    #[serde(default, rename = "successTTLSecond", skip_serializing_if = "Option::is_none")]
    pub success_ttl_second: Option<u64>,
    /// Seconds after any other end. Usually longer than the success TTL so a
    /// failed run can be inspected or rerun.
    #[serde(default, rename = "failedTTLSecond", skip_serializing_if = "Option::is_none")]
    pub failed_ttl_second: Option<u64>,
}

/// Database record TTLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDatabaseGC {
    /// Pipelines that were analyzed but never ran.
    #[serde(default)]
    pub analyzed: PipelineDbGcItem,
    /// Pipelines in an end status.
    #[serde(default)]
    pub finished: PipelineDbGcItem,
}

/// One database GC timer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDbGcItem {
    /// Archive the record before removing it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub need_archive: Option<bool>,
    /// Seconds before the record is removed.
    #[serde(default, rename = "ttlSecond", skip_serializing_if = "Option::is_none")]
    pub ttl_second: Option<u64>,
}

/// A resolved database GC rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbGcRule {
    /// Archive before removing.
    pub need_archive: bool,
    /// Time to live.
    pub ttl: Duration,
}

impl PipelineGC {
    /// Returns a copy with every unset field filled from `defaults`.
    #[must_use]
    pub fn with_defaults(&self, defaults: &GcConfig) -> Self {
        let resource = &self.resource_gc;
        let analyzed = &self.database_gc.analyzed;
        let finished = &self.database_gc.finished;

        Self {
            resource_gc: PipelineResourceGC {
                success_ttl_second: resource
                    .success_ttl_second
                    .or(Some(defaults.resource_success_ttl_secs)),
                failed_ttl_second: resource
                    .failed_ttl_second
                    .or(Some(defaults.resource_failed_ttl_secs)),
            },
            database_gc: PipelineDatabaseGC {
                analyzed: PipelineDbGcItem {
                    need_archive: analyzed
                        .need_archive
                        .or(Some(defaults.analyzed_need_archive)),
                    ttl_second: analyzed.ttl_second.or(Some(defaults.analyzed_ttl_secs)),
                },
                finished: PipelineDbGcItem {
                    need_archive: finished
                        .need_archive
                        .or(Some(defaults.finished_need_archive)),
                    ttl_second: finished.ttl_second.or(Some(defaults.finished_ttl_secs)),
                },
            },
        }
    }

    /// Resource TTL for a pipeline that ended in `status`.
    ///
    /// `None` while the pipeline has not ended.
    #[must_use]
    pub fn resource_ttl(&self, status: PipelineStatus, defaults: &GcConfig) -> Option<Duration> {
        if !status.is_end_status() {
            return None;
        }

        let secs = if status.is_success_status() {
            self.resource_gc
                .success_ttl_second
                .unwrap_or(defaults.resource_success_ttl_secs)
        } else {
            self.resource_gc
                .failed_ttl_second
                .unwrap_or(defaults.resource_failed_ttl_secs)
        };
        Some(Duration::from_secs(secs))
    }

    /// Rule applied to pipelines that never ran.
    #[must_use]
    pub fn analyzed_rule(&self, defaults: &GcConfig) -> DbGcRule {
        let item = &self.database_gc.analyzed;
        DbGcRule {
            need_archive: item.need_archive.unwrap_or(defaults.analyzed_need_archive),
            ttl: Duration::from_secs(item.ttl_second.unwrap_or(defaults.analyzed_ttl_secs)),
        }
    }

    /// Rule applied to finished pipelines.
    #[must_use]
    pub fn finished_rule(&self, defaults: &GcConfig) -> DbGcRule {
        let item = &self.database_gc.finished;
        DbGcRule {
            need_archive: item.need_archive.unwrap_or(defaults.finished_need_archive),
            ttl: Duration::from_secs(item.ttl_second.unwrap_or(defaults.finished_ttl_secs)),
        }
    }
}

/// Progress of resource reclamation for one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResourceGcState {
    /// Resources are still held.
    #[default]
    NotDone,
    /// A sweeper is releasing them.
    Claimed {
        /// The sweeper holding the claim.
        worker: Uuid,
    },
    /// Resources were released.
    Done,
}
