//! Scheduler events.
//!
//! Every state change the scheduler makes is reported to an [`EventSink`].
//! Sinks are injected; the default discards events.

mod event;
mod sink;

pub use event::SchedulerEvent;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use std::sync::Arc;

/// Shared sink handle.
pub type SharedEventSink = Arc<dyn EventSink>;

/// Returns a sink that discards everything.
#[must_use]
pub fn noop_sink() -> SharedEventSink {
    Arc::new(NoOpEventSink)
}
