//! # Pipeline Scheduler
//!
//! The scheduling core of a CI/CD pipeline engine.
//!
//! It provides:
//!
//! - **Status model**: the closed set of pipeline statuses, their classes and
//!   transition guards
//! - **Queue scheduling**: named queues with priority, concurrency and
//!   resource ceilings, admitting pipelines in priority then arrival order
//! - **Task loops**: declining backoff for re-running tasks
//! - **Priority propagation**: action concurrency limits and queue selection
//!   rules
//! - **Garbage collection**: TTL driven release of resources and records
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipeline_scheduler::prelude::*;
//!
//! let service = PipelineService::new(SchedulerConfig::default());
//! service.registry().create(
//!     PipelineQueueCreateRequest::new("builds", PipelineSource::Dice, "dev")
//!         .with_concurrency(2),
//! )?;
//!
//! let pipeline = service.create(
//!     PipelineCreateRequest::new("pipeline.yml", PipelineSource::Dice, "dev")
//!         .with_bind_queue("builds")
//!         .auto_run(),
//! )?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod errors;
pub mod events;
pub mod gc;
pub mod observability;
pub mod pipeline;
pub mod priority;
pub mod queue;
pub mod retry;
pub mod service;
pub mod status;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{GcConfig, SchedulerConfig};
    pub use crate::errors::{Result, SchedulerError, UnknownEnumValue, ValidationError};
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, SchedulerEvent,
    };
    pub use crate::gc::{
        ArchiveCutoff, ArchiveStore, GcReport, GcSweeper, GcTask, PipelineGC, ResourceReclaimer,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        CancelSignal, PipelineRecord, PipelineSource, PipelineStore, PipelineTask, QueueBinding,
    };
    pub use crate::priority::{
        resolve_concurrency, resolve_priority, ActionConcurrency, PipelineTaskPriority,
    };
    pub use crate::queue::{
        EnqueueCondition, PipelineQueue, PipelineQueueCreateRequest, PipelineQueueUpdateRequest,
        PipelineQueueValidateResult, QueueMode, QueueRegistry, QueueScheduler, Resources,
    };
    pub use crate::retry::{next_retry, LoopStrategy, PipelineTaskLoop, RetryDecision};
    pub use crate::service::{
        CancelOutcome, PipelineCreateRequest, PipelineDTO, PipelineService, TaskOperation,
        TaskReport, TaskResultAction,
    };
    pub use crate::status::{PipelineStatus, StatusClass, StatusTransition};
    pub use crate::utils::{now_utc, Timestamp};
}
