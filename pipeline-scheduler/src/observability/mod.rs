//! Logging setup and pipeline spans.

mod logging;

pub use logging::{init_tracing, pipeline_span, queue_span, LogFormat};
