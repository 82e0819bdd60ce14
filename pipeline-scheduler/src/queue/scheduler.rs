//! Queue admission over the pipeline store.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::registry::QueueRegistry;
use super::state::Admission;
use super::types::QueueUsage;
use super::validate_result::PipelineQueueValidateResult;
use crate::config::SchedulerConfig;
use crate::errors::{Result, SchedulerError};
use crate::events::{noop_sink, SchedulerEvent, SharedEventSink};
use crate::observability::queue_span;
use crate::pipeline::{PipelineRecord, PipelineStore};
use crate::status::{PipelineStatus, StatusTransition};
use crate::utils::now_utc;

enum DequeueStep {
    Admitted,
    Blocked,
    Dropped,
}

/// Admits pipelines through their queues.
///
/// Locks are always taken queue first, then pipeline. Events are emitted
/// after both are released.
pub struct QueueScheduler {
    registry: Arc<QueueRegistry>,
    store: Arc<PipelineStore>,
    events: SharedEventSink,
    retry_interval: Duration,
}

impl QueueScheduler {
    /// Creates a scheduler over `registry` and `store`.
    #[must_use]
    pub fn new(
        registry: Arc<QueueRegistry>,
        store: Arc<PipelineStore>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            store,
            events: noop_sink(),
            retry_interval: config.enqueue_retry_interval(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    /// The queue registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<QueueRegistry> {
        &self.registry
    }

    /// Tries to admit a pipeline through the queue it is bound to.
    ///
    /// A pipeline in `Born`, `Mark` or `Created` joins the pending set and
    /// moves to `Queue`; once admitted it moves to `Running`. Calling again
    /// for a running pipeline is a successful no-op. Any other pre-run
    /// status is an [`SchedulerError::InvalidTransition`]. A queue that no
    /// longer exists is the only final refusal besides the queue's own.
    pub fn enqueue(&self, pipeline_id: u64, queue_id: u64) -> Result<PipelineQueueValidateResult> {
        let handle = match self.registry.handle(queue_id) {
            Ok(handle) => handle,
            Err(SchedulerError::QueueNotFound(_)) => {
                warn!(pipeline_id, queue_id, "Queue not found for pipeline");
                return Ok(PipelineQueueValidateResult::end(format!(
                    "queue not found: {queue_id}"
                )));
            }
            Err(err) => return Err(err),
        };

        let mut events = Vec::new();
        let result = {
            let mut queue = handle.lock();
            let _span = queue_span(queue.queue()).entered();
            let queue_priority = queue.queue().priority;
            let retry_interval = self.retry_interval;

            let result = self.store.with_record(pipeline_id, |record| {
                if let Some(binding) = record.queue.as_mut() {
                    if binding.queue_name != queue.queue().name {
                        binding.queue_name.clone_from(&queue.queue().name);
                    }
                }
                if record.status.is_end_status() {
                    queue.remove_pending(pipeline_id);
                    return Ok(PipelineQueueValidateResult::end(format!(
                        "pipeline already ended, status: {}",
                        record.status
                    )));
                }
                if queue.is_running(pipeline_id) {
                    return Ok(PipelineQueueValidateResult::admitted());
                }

                let now = now_utc();
                let from = record.status;
                let outcome = record.apply(StatusTransition::Enqueue)?;
                if outcome.changed {
                    record.enqueued_at.get_or_insert(now);
                    events.push(SchedulerEvent::PipelineStatusChanged {
                        pipeline_id,
                        from,
                        to: outcome.status,
                    });
                }

                let request = record.admission_request(queue_priority);
                let was_pending = queue.is_pending(pipeline_id);

                let admission = queue.try_admit(pipeline_id, &request);
                if !was_pending
                    && matches!(admission, Admission::Admitted | Admission::Wait(_))
                {
                    events.push(SchedulerEvent::QueueEnqueued {
                        pipeline_id,
                        queue_id,
                        priority: request.priority,
                    });
                }

                let result = match admission {
                    Admission::Admitted => {
                        mark_admitted(record, queue_id, &mut events)?;
                        PipelineQueueValidateResult::admitted()
                    }
                    Admission::AlreadyRunning => PipelineQueueValidateResult::admitted(),
                    Admission::Wait(reason) => {
                        PipelineQueueValidateResult::retry(reason, retry_interval)
                    }
                    Admission::Never(reason) => PipelineQueueValidateResult::end(reason),
                };
                Ok(result)
            });
            result
        };

        for event in &events {
            self.events.try_emit(event);
        }

        if let Ok(ref result) = result {
            debug!(
                pipeline_id,
                queue_id,
                success = result.success,
                is_end = result.is_end,
                reason = %result.reason,
                "Enqueue attempt"
            );
        }
        result
    }

    /// Admits the head of a queue if capacity allows.
    ///
    /// Pending pipelines that ended or vanished meanwhile are dropped from
    /// the queue. Returns the admitted pipeline, if any.
    pub fn dequeue(&self, queue_id: u64) -> Result<Option<u64>> {
        let handle = self.registry.handle(queue_id)?;
        let mut events = Vec::new();
        let mut admitted = None;

        {
            let mut queue = handle.lock();
            let _span = queue_span(queue.queue()).entered();
            let queue_priority = queue.queue().priority;

            while let Some(head) = queue.head() {
                let step = self.store.with_record(head, |record| {
                    if record.status.is_end_status() {
                        queue.remove_pending(head);
                        return Ok(DequeueStep::Dropped);
                    }

                    let request = record.admission_request(queue_priority);
                    match queue.try_admit(head, &request) {
                        Admission::Admitted => {
                            mark_admitted(record, queue_id, &mut events)?;
                            Ok(DequeueStep::Admitted)
                        }
                        Admission::Wait(_) => Ok(DequeueStep::Blocked),
                        Admission::AlreadyRunning => {
                            queue.remove_pending(head);
                            Ok(DequeueStep::Dropped)
                        }
                        Admission::Never(reason) => {
                            warn!(pipeline_id = head, queue_id, reason = %reason, "Pipeline can never run in queue");
                            let from = record.status;
                            if record.finish(PipelineStatus::Error, now_utc())? {
                                events.push(SchedulerEvent::PipelineStatusChanged {
                                    pipeline_id: head,
                                    from,
                                    to: PipelineStatus::Error,
                                });
                            }
                            Ok(DequeueStep::Dropped)
                        }
                    }
                });

                match step {
                    Ok(DequeueStep::Admitted) => {
                        admitted = Some(head);
                        break;
                    }
                    Ok(DequeueStep::Blocked) => break,
                    Ok(DequeueStep::Dropped) => {}
                    Err(SchedulerError::PipelineNotFound(_)) => {
                        queue.remove_pending(head);
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        for event in &events {
            self.events.try_emit(event);
        }
        Ok(admitted)
    }

    /// Frees the queue slot or pending entry of a pipeline.
    ///
    /// Returns false if the pipeline held neither.
    pub fn release(&self, pipeline_id: u64) -> Result<bool> {
        let Some(binding) = self.store.get(pipeline_id)?.queue else {
            return Ok(false);
        };
        let Ok(handle) = self.registry.handle(binding.queue_id) else {
            return Ok(false);
        };

        let (was_running, was_pending) = {
            let mut queue = handle.lock();
            (queue.release(pipeline_id).is_some(), queue.remove_pending(pipeline_id))
        };

        if !(was_running || was_pending) {
            return Ok(false);
        }

        info!(
            pipeline_id,
            queue_id = binding.queue_id,
            was_running,
            "Released pipeline from queue"
        );
        self.events.try_emit(&SchedulerEvent::QueueReleased {
            pipeline_id,
            queue_id: binding.queue_id,
        });
        Ok(true)
    }

    /// Pending pipelines of a queue in admission order.
    pub fn pending_order(&self, queue_id: u64) -> Result<Vec<u64>> {
        Ok(self.registry.handle(queue_id)?.lock().pending_order())
    }

    /// Current load of a queue.
    pub fn queue_usage(&self, queue_id: u64) -> Result<QueueUsage> {
        Ok(self.registry.handle(queue_id)?.lock().usage())
    }
}

fn mark_admitted(
    record: &mut PipelineRecord,
    queue_id: u64,
    events: &mut Vec<SchedulerEvent>,
) -> Result<()> {
    let outcome = record.apply(StatusTransition::Admit)?;
    record.started_at = Some(now_utc());

    info!(pipeline_id = record.id, queue_id, "Pipeline admitted");
    events.push(SchedulerEvent::QueueAdmitted {
        pipeline_id: record.id,
        queue_id,
    });
    events.push(SchedulerEvent::PipelineStatusChanged {
        pipeline_id: record.id,
        from: PipelineStatus::Queue,
        to: outcome.status,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::pipeline::{PipelineSource, QueueBinding};
    use crate::queue::{
        PipelineQueueCreateRequest, PipelineQueueUpdateRequest, QueueMode, Resources, RetryOption,
    };
    use pretty_assertions::assert_eq;

    struct Harness {
        scheduler: QueueScheduler,
        store: Arc<PipelineStore>,
        events: Arc<CollectingEventSink>,
        queue_id: u64,
    }

    fn harness(mode: QueueMode, concurrency: i64) -> Harness {
        let registry = Arc::new(QueueRegistry::new());
        let store = Arc::new(PipelineStore::new());
        let events = Arc::new(CollectingEventSink::new());

        let queue = registry
            .create(
                PipelineQueueCreateRequest::new("q", PipelineSource::Dice, "dev")
                    .with_mode(mode)
                    .with_concurrency(concurrency)
                    .with_max_resources(4.0, 4096.0),
            )
            .unwrap();

        let scheduler = QueueScheduler::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            &SchedulerConfig::default(),
        )
        .with_event_sink(events.clone());

        Harness {
            scheduler,
            store,
            events,
            queue_id: queue.id,
        }
    }

    impl Harness {
        fn born(&self, binding: impl FnOnce(QueueBinding) -> QueueBinding) -> u64 {
            let id = self.store.next_id();
            let mut record =
                PipelineRecord::new(id, PipelineSource::Dice, "pipeline.yml", "dev", now_utc());
            record.status = PipelineStatus::Born;
            record.queue = Some(binding(QueueBinding::new(self.queue_id, "q")));
            self.store.insert(record);
            id
        }

        fn status(&self, id: u64) -> PipelineStatus {
            self.store.get(id).unwrap().status
        }
    }

    #[test]
    fn test_strict_queue_retry_scenario() {
        let h = harness(QueueMode::Strict, 1);
        let first = h.born(|b| b);
        let second = h.born(|b| b);

        assert!(h.scheduler.enqueue(first, h.queue_id).unwrap().success);
        assert_eq!(h.status(first), PipelineStatus::Running);

        let waiting = h.scheduler.enqueue(second, h.queue_id).unwrap();
        assert!(!waiting.success);
        assert!(!waiting.is_end);
        assert_eq!(
            waiting.retry_option,
            Some(RetryOption {
                interval_second: 5,
                interval_millisecond: 5_000
            })
        );
        assert_eq!(h.status(second), PipelineStatus::Queue);

        assert!(h.scheduler.release(first).unwrap());
        assert!(h.scheduler.enqueue(second, h.queue_id).unwrap().success);
        assert_eq!(h.status(second), PipelineStatus::Running);
    }

    #[test]
    fn test_dequeue_order_by_priority_then_arrival() {
        let h = harness(QueueMode::Strict, 1);
        let blocker = h.born(|b| b);
        h.scheduler.enqueue(blocker, h.queue_id).unwrap();

        let low = h.born(|b| b.with_custom_priority(10));
        let mid = h.born(|b| b.with_custom_priority(20));
        let high = h.born(|b| b.with_custom_priority(30));
        let mid_later = h.born(|b| b.with_custom_priority(20));
        for id in [low, mid, high, mid_later] {
            assert!(h.scheduler.enqueue(id, h.queue_id).unwrap().should_retry());
        }

        assert_eq!(
            h.scheduler.pending_order(h.queue_id).unwrap(),
            vec![high, mid, mid_later, low]
        );

        let mut admitted = Vec::new();
        let mut running = blocker;
        for _ in 0..4 {
            h.scheduler.release(running).unwrap();
            running = h.scheduler.dequeue(h.queue_id).unwrap().unwrap();
            admitted.push(running);
        }
        assert_eq!(admitted, vec![high, mid, mid_later, low]);
        assert_eq!(h.scheduler.dequeue(h.queue_id).unwrap(), None);
    }

    #[test]
    fn test_enqueue_is_idempotent_for_running_pipeline() {
        let h = harness(QueueMode::Strict, 1);
        let id = h.born(|b| b);

        assert!(h.scheduler.enqueue(id, h.queue_id).unwrap().success);
        assert!(h.scheduler.enqueue(id, h.queue_id).unwrap().success);
        assert_eq!(h.scheduler.queue_usage(h.queue_id).unwrap().running_count, 1);
    }

    #[test]
    fn test_final_outcomes() {
        let h = harness(QueueMode::Strict, 1);

        let id = h.born(|b| b);
        let missing = h.scheduler.enqueue(id, 999).unwrap();
        assert!(missing.is_end);

        h.store
            .with_record(id, |r| r.finish(PipelineStatus::StopByUser, now_utc()))
            .unwrap();
        assert!(h.scheduler.enqueue(id, h.queue_id).unwrap().is_end);

        let big = h.born(|b| b);
        h.store
            .with_record(big, |r| {
                r.resources = Resources::new(16.0, 0.0);
                Ok(())
            })
            .unwrap();
        let oversized = h.scheduler.enqueue(big, h.queue_id).unwrap();
        assert!(oversized.is_end);
        assert!(oversized.reason.contains("exceeds queue limit"));
        assert!(h.scheduler.pending_order(h.queue_id).unwrap().is_empty());
    }

    #[test]
    fn test_renamed_queue_keeps_bound_pipelines() {
        let h = harness(QueueMode::Strict, 1);
        let first = h.born(|b| b);
        let waiting = h.born(|b| b);
        assert!(h.scheduler.enqueue(first, h.queue_id).unwrap().success);
        assert!(h.scheduler.enqueue(waiting, h.queue_id).unwrap().should_retry());

        let rename = |name: &str| PipelineQueueUpdateRequest {
            name: Some(name.to_string()),
            ..Default::default()
        };
        h.scheduler.registry().update(h.queue_id, rename("q-old")).unwrap();
        let other = h
            .scheduler
            .registry()
            .create(PipelineQueueCreateRequest::new("q", PipelineSource::Dice, "dev"))
            .unwrap();

        let retry = h.scheduler.enqueue(waiting, h.queue_id).unwrap();
        assert!(retry.should_retry());
        assert_eq!(h.status(waiting), PipelineStatus::Queue);

        h.scheduler.release(first).unwrap();
        assert!(h.scheduler.enqueue(waiting, h.queue_id).unwrap().success);
        assert_eq!(h.store.get(waiting).unwrap().queue.unwrap().queue_name, "q-old");
        assert_eq!(h.scheduler.queue_usage(other.id).unwrap().running_count, 0);

        assert!(h.scheduler.release(waiting).unwrap());
        assert_eq!(h.scheduler.queue_usage(h.queue_id).unwrap().running_count, 0);
    }

    #[test]
    fn test_enqueue_rejects_pre_run_pipeline() {
        let h = harness(QueueMode::Strict, 1);
        let id = h.born(|b| b);
        h.store
            .with_record(id, |r| {
                r.status = PipelineStatus::Analyzed;
                Ok(())
            })
            .unwrap();

        let err = h.scheduler.enqueue(id, h.queue_id).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTransition { .. }));
    }

    #[test]
    fn test_loose_queue_skip_running_limit() {
        let h = harness(QueueMode::Loose, 1);
        let first = h.born(|b| b);
        let normal = h.born(|b| b);
        let skipping = h.born(|b| {
            b.with_enqueue_condition(crate::queue::EnqueueCondition::SkipAlreadyRunningLimit)
        });

        assert!(h.scheduler.enqueue(first, h.queue_id).unwrap().success);
        assert!(h.scheduler.enqueue(normal, h.queue_id).unwrap().should_retry());
        assert!(h.scheduler.enqueue(skipping, h.queue_id).unwrap().success);
        assert_eq!(h.scheduler.queue_usage(h.queue_id).unwrap().running_count, 2);
    }

    #[test]
    fn test_dequeue_drops_ended_pipelines() {
        let h = harness(QueueMode::Strict, 1);
        let blocker = h.born(|b| b);
        let cancelled = h.born(|b| b);
        let next = h.born(|b| b);
        h.scheduler.enqueue(blocker, h.queue_id).unwrap();
        h.scheduler.enqueue(cancelled, h.queue_id).unwrap();
        h.scheduler.enqueue(next, h.queue_id).unwrap();

        h.store
            .with_record(cancelled, |r| r.finish(PipelineStatus::StopByUser, now_utc()))
            .unwrap();
        h.scheduler.release(blocker).unwrap();

        assert_eq!(h.scheduler.dequeue(h.queue_id).unwrap(), Some(next));
        assert!(h.scheduler.pending_order(h.queue_id).unwrap().is_empty());
    }

    #[test]
    fn test_events() {
        let h = harness(QueueMode::Strict, 1);
        let id = h.born(|b| b);
        h.scheduler.enqueue(id, h.queue_id).unwrap();
        h.scheduler.release(id).unwrap();

        assert_eq!(
            h.events.event_types(),
            vec![
                "pipeline.status_changed",
                "queue.enqueued",
                "queue.admitted",
                "pipeline.status_changed",
                "queue.released",
            ]
        );
    }
}
