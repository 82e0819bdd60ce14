//! Task loop and retry engine.
//!
//! Provides the declining-backoff strategy used to re-run failed tasks,
//! the pure retry decision, and an async driver built on tokio timers.

mod engine;
mod strategy;

pub use engine::{
    abnormal_retry_interval, drive_loop, next_retry, LoopOutcome, LoopStep, RetryDecision,
    ABNORMAL_RETRY_MIN_INTERVAL,
};
pub use strategy::{
    LoopStrategy, PipelineTaskLoop, DEFAULT_LOOP_BREAK, PIPELINE_TASK_DEFAULT_LOOP_STRATEGY,
};
