//! Concurrency and priority resolution.
//!
//! Rules arrive in their `{enable, v1}` wire form and are resolved into
//! tagged variants when deserialized.

mod concurrency;
mod task_priority;

pub use concurrency::{
    resolve_concurrency, ActionConcurrency, ActionConcurrencyLimiter, ActionConcurrencyV1,
    ConcurrencyItem,
};
pub use task_priority::{resolve_priority, PipelineTaskPriority, PriorityRule, ResolvedPriority};
