//! Queue based admission.
//!
//! This module contains:
//! - Queue definitions and CRUD ([`QueueRegistry`])
//! - Per-queue pending and running sets ([`QueueState`])
//! - Admission over the pipeline store ([`QueueScheduler`])

mod registry;
mod scheduler;
mod state;
mod types;
mod validate_result;

pub use registry::{QueueHandle, QueueRegistry, QUEUE_NAME_MAX_LEN};
pub use scheduler::QueueScheduler;
pub use state::{Admission, AdmissionRequest, QueueState};
pub use types::{
    EnqueueCondition, PipelineQueue, PipelineQueueCreateRequest, PipelineQueueUpdateRequest,
    QueueListFilter, QueueMode, QueueUsage, Resources, ScheduleStrategy,
    PIPELINE_QUEUE_DEFAULT_CONCURRENCY, PIPELINE_QUEUE_DEFAULT_PRIORITY,
};
pub use validate_result::{PipelineQueueValidateResult, RetryOption};
