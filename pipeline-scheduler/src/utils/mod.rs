//! Utility helpers for timestamps and identifiers.

pub mod timestamps;

pub use timestamps::{
    add_duration, elapsed_between, now_utc, sub_duration, ttl_elapsed, Timestamp,
};

use uuid::Uuid;

/// Generates an identifier for a GC worker.
#[must_use]
pub fn generate_worker_id() -> Uuid {
    Uuid::new_v4()
}
