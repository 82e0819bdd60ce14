//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

use super::SchedulerEvent;

/// Receives scheduler events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    async fn emit(&self, event: &SchedulerEvent);

    /// Emits an event without waiting. Must never fail or block for long;
    /// it is called while scheduling work is in progress.
    fn try_emit(&self, event: &SchedulerEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &SchedulerEvent) {}

    fn try_emit(&self, _event: &SchedulerEvent) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &SchedulerEvent) {
        if self.level == Level::DEBUG {
            debug!(
                event_type = event.event_type(),
                pipeline_id = event.pipeline_id(),
                event_data = %event.data(),
                "Event: {}", event.event_type()
            );
        } else {
            info!(
                event_type = event.event_type(),
                pipeline_id = event.pipeline_id(),
                event_data = %event.data(),
                "Event: {}", event.event_type()
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &SchedulerEvent) {
        self.log_event(event);
    }

    fn try_emit(&self, event: &SchedulerEvent) {
        self.log_event(event);
    }
}

/// Keeps every event in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<SchedulerEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.read().clone()
    }

    /// Names of all collected events in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(SchedulerEvent::event_type).collect()
    }

    /// Events whose name starts with `prefix`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<SchedulerEvent> {
        self.events
            .read()
            .iter()
            .filter(|event| event.event_type().starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// True if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &SchedulerEvent) {
        self.events.write().push(event.clone());
    }

    fn try_emit(&self, event: &SchedulerEvent) {
        self.events.write().push(event.clone());
    }
}
