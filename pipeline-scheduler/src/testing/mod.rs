//! Testing utilities for scheduler users.
//!
//! This module provides:
//! - Record and queue fixtures
//! - Recording and failing GC collaborators
//! - Assertions on enqueue results and statuses

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_admitted, assert_end, assert_retry, assert_status, assert_transition_rejected,
};
pub use fixtures::{QueueFixture, RecordFixture};
pub use mocks::{FailingArchiveStore, RecordingReclaimer};
