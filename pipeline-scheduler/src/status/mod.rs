//! Pipeline status model.
//!
//! This module contains:
//! - The closed set of pipeline/task statuses and their classification
//! - Transition guards (pause, cancel, enable/disable, delete)
//! - The manual review overlay

mod pipeline_status;
mod transition;

pub use pipeline_status::{PipelineStatus, StatusClass};
pub use transition::{apply_transition, StatusTransition, TransitionOutcome};
