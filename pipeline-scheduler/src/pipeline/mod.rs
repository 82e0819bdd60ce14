//! Pipeline records and their store.
//!
//! This module contains:
//! - [`PipelineRecord`] and [`PipelineTask`], the scheduling state of a run
//! - [`PipelineStore`], a lock-per-record in-memory store
//! - [`CancelSignal`], the cooperative stop signal handed to executors

mod cancel;
mod record;
mod source;
mod store;

pub use cancel::CancelSignal;
pub use record::{
    PipelineRecord, PipelineTask, QueueBinding, LABEL_BIND_QUEUE_CUSTOM_PRIORITY,
    LABEL_BIND_QUEUE_ENQUEUE_CONDITION, LABEL_BIND_QUEUE_ID,
};
pub use source::PipelineSource;
pub use store::{PipelineStore, RecordHandle};
