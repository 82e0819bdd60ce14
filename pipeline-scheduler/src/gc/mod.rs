//! Resource and database garbage collection.
//!
//! Once a pipeline ends, its compute resources are released after a TTL and
//! its record is archived or deleted after a second, longer TTL. Pipelines
//! that never ran are removed on their own timer.

mod policy;
mod reclaimer;
mod sweeper;
mod task;

pub use policy::{
    DbGcRule, PipelineDatabaseGC, PipelineDbGcItem, PipelineGC, PipelineResourceGC,
    ResourceGcState,
};
#[cfg(test)]
pub use reclaimer::MockResourceReclaimer;
pub use reclaimer::{
    ArchiveCutoff, ArchiveStore, InMemoryArchiveStore, LoggingReclaimer, ResourceReclaimer,
};
pub use sweeper::{DbGcOutcome, GcReport, GcSweeper, ResourceGcOutcome};
pub use task::GcTask;
