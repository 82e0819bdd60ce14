//! Pipeline lifecycle service.
//!
//! Drives a pipeline from creation through queue admission and execution to
//! its end, and hands ended pipelines to garbage collection. Executors talk
//! to the service: they take the [`CancelSignal`] of the pipeline they run,
//! start tasks through the concurrency limiter and report every attempt.

mod dto;
#[cfg(test)]
mod integration_tests;

pub use dto::{
    CancelOutcome, PipelineCreateRequest, PipelineDTO, TaskOperation, TaskReport,
    TaskResultAction,
};

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::errors::{Result, SchedulerError, ValidationError};
use crate::events::{noop_sink, SchedulerEvent, SharedEventSink};
use crate::gc::{ArchiveStore, GcSweeper, InMemoryArchiveStore, ResourceReclaimer};
use crate::observability::pipeline_span;
use crate::pipeline::{
    CancelSignal, PipelineRecord, PipelineSource, PipelineStore, QueueBinding,
    LABEL_BIND_QUEUE_CUSTOM_PRIORITY, LABEL_BIND_QUEUE_ENQUEUE_CONDITION, LABEL_BIND_QUEUE_ID,
};
use crate::priority::{resolve_priority, ActionConcurrencyLimiter};
use crate::queue::{
    EnqueueCondition, PipelineQueue, PipelineQueueValidateResult, QueueListFilter, QueueRegistry,
    QueueScheduler,
};
use crate::retry::{abnormal_retry_interval, next_retry, LoopStrategy};
use crate::status::{apply_transition, PipelineStatus, StatusTransition};
use crate::utils::{now_utc, Timestamp};

enum RunStep {
    Enqueue(u64),
    Started,
    Ended(PipelineStatus),
}

/// Owns the pipeline store and schedules pipelines through their queues.
pub struct PipelineService {
    store: Arc<PipelineStore>,
    registry: Arc<QueueRegistry>,
    scheduler: QueueScheduler,
    limiter: ActionConcurrencyLimiter,
    signals: DashMap<u64, Arc<CancelSignal>>,
    archive: Arc<dyn ArchiveStore>,
    config: SchedulerConfig,
    events: SharedEventSink,
}

impl PipelineService {
    /// Creates a service with empty stores.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let store = Arc::new(PipelineStore::new());
        let registry = Arc::new(QueueRegistry::new());
        let scheduler = QueueScheduler::new(Arc::clone(&registry), Arc::clone(&store), &config);

        Self {
            store,
            registry,
            scheduler,
            limiter: ActionConcurrencyLimiter::new(),
            signals: DashMap::new(),
            archive: Arc::new(InMemoryArchiveStore::new()),
            config,
            events: noop_sink(),
        }
    }

    /// Sets the store that receives archived records.
    #[must_use]
    pub fn with_archive_store(mut self, archive: Arc<dyn ArchiveStore>) -> Self {
        self.archive = archive;
        self
    }

    /// Sets the event sink used by the service and its scheduler.
    #[must_use]
    pub fn with_event_sink(mut self, events: SharedEventSink) -> Self {
        self.scheduler = QueueScheduler::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            &self.config,
        )
        .with_event_sink(Arc::clone(&events));
        self.events = events;
        self
    }

    /// The pipeline store.
    #[must_use]
    pub fn store(&self) -> &Arc<PipelineStore> {
        &self.store
    }

    /// The queue registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<QueueRegistry> {
        &self.registry
    }

    /// The queue scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &QueueScheduler {
        &self.scheduler
    }

    /// The task concurrency limiter.
    #[must_use]
    pub fn limiter(&self) -> &ActionConcurrencyLimiter {
        &self.limiter
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The archive store.
    #[must_use]
    pub fn archive_store(&self) -> &Arc<dyn ArchiveStore> {
        &self.archive
    }

    /// Builds a GC sweeper over this service's store and archive.
    #[must_use]
    pub fn gc_sweeper(&self, reclaimer: Arc<dyn ResourceReclaimer>) -> GcSweeper {
        GcSweeper::new(
            Arc::clone(&self.store),
            reclaimer,
            Arc::clone(&self.archive),
            self.config.gc.clone(),
        )
        .with_event_sink(Arc::clone(&self.events))
    }

    /// Creates a pipeline, binding its queue, and runs it if asked to.
    pub fn create(&self, req: PipelineCreateRequest) -> Result<PipelineDTO> {
        let source = validate_create(&req)?;
        let binding = self.resolve_binding(&req, source)?;

        let id = self.store.next_id();
        let mut record = PipelineRecord::new(
            id,
            source,
            req.pipeline_yml_name,
            req.cluster_name,
            now_utc(),
        );
        record.yml = req.pipeline_yml;
        record.labels = req.labels;
        record.run_params = req.run_params;
        record.queue = binding;
        record.resources = req.resources;
        record.timeout_second = req.timeout_second;
        record.gc = req.gc.unwrap_or_default().with_defaults(&self.config.gc);
        record.task_loop = req.task_loop;
        record.tasks = req.tasks;

        if req.auto_start_cron {
            debug!(pipeline_id = id, "Cron start requested, left to the cron trigger");
        }

        let queue_id = record.queue.as_ref().map(|binding| binding.queue_id);
        self.store.insert(record);
        info!(pipeline_id = id, source = %source, ?queue_id, "Pipeline created");
        self.events.try_emit(&SchedulerEvent::PipelineCreated {
            pipeline_id: id,
            queue_id,
        });

        if req.auto_run || req.auto_run_at_once {
            self.run(id)?;
        }
        self.get(id)
    }

    fn resolve_binding(
        &self,
        req: &PipelineCreateRequest,
        source: PipelineSource,
    ) -> Result<Option<QueueBinding>> {
        let mut custom_priority = label_value(&req.labels, LABEL_BIND_QUEUE_CUSTOM_PRIORITY)
            .map(|raw| {
                raw.parse::<i64>().map_err(|_| {
                    ValidationError::new(format!("invalid custom priority: {raw}"))
                        .with_field(LABEL_BIND_QUEUE_CUSTOM_PRIORITY)
                })
            })
            .transpose()?;

        let mut concurrency = None;
        let queue = if let Some(raw) = label_value(&req.labels, LABEL_BIND_QUEUE_ID) {
            let queue_id = raw.parse::<u64>().map_err(|_| {
                ValidationError::new(format!("invalid queue id: {raw}")).with_field(LABEL_BIND_QUEUE_ID)
            })?;
            Some(self.registry.get(queue_id)?)
        } else if let Some(name) = req.bind_queue.as_deref() {
            Some(self.registry.get_by_name(source, name)?)
        } else if let Some(rules) = &req.task_priority {
            let candidates: Vec<PipelineQueue> = self.registry.list(&QueueListFilter {
                pipeline_source: Some(source),
                cluster_name: Some(req.cluster_name.clone()),
            });
            let names: Vec<&str> = candidates.iter().map(|q| q.name.as_str()).collect();
            let resolved = resolve_priority(rules, &names);
            match resolved.queue {
                Some(name) => {
                    custom_priority.get_or_insert(resolved.priority);
                    concurrency = u64::try_from(resolved.concurrency).ok().filter(|&c| c > 0);
                    candidates.into_iter().find(|q| q.name == name)
                }
                None => None,
            }
        } else {
            None
        };

        let Some(queue) = queue else {
            return Ok(None);
        };

        if queue.pipeline_source != source {
            return Err(ValidationError::new(format!(
                "invalid queue: pipeline source not match, queue: {}, pipeline: {source}",
                queue.pipeline_source
            ))
            .into());
        }
        if queue.cluster_name != req.cluster_name {
            return Err(ValidationError::new(format!(
                "invalid queue: cluster name not match, queue: {}, pipeline: {}",
                queue.cluster_name, req.cluster_name
            ))
            .into());
        }

        let mut binding = QueueBinding::new(queue.id, queue.name);
        if let Some(priority) = custom_priority {
            binding = binding.with_custom_priority(priority);
        }
        if let Some(concurrency) = concurrency {
            binding = binding.with_concurrency(concurrency);
        }
        if let Some(raw) = label_value(&req.labels, LABEL_BIND_QUEUE_ENQUEUE_CONDITION) {
            let condition = EnqueueCondition::from_str(raw).map_err(|err| {
                ValidationError::new(err.to_string()).with_field(LABEL_BIND_QUEUE_ENQUEUE_CONDITION)
            })?;
            binding = binding.with_enqueue_condition(condition);
        }
        Ok(Some(binding))
    }

    /// Starts a pipeline: `Analyzed` becomes `Born` and the pipeline goes
    /// through its queue. Pipelines without a queue start running directly.
    ///
    /// Running it again while it waits or runs is harmless, and an ended
    /// pipeline gets a final result. A final queue refusal ends the pipeline
    /// with `Error`.
    pub fn run(&self, pipeline_id: u64) -> Result<PipelineQueueValidateResult> {
        let mut events = Vec::new();
        let step = self.store.with_record(pipeline_id, |record| {
            match record.status {
                PipelineStatus::Analyzed => {
                    set_status(record, PipelineStatus::Born, &mut events);
                    for task in &mut record.tasks {
                        if task.status == PipelineStatus::Analyzed {
                            task.status = PipelineStatus::Born;
                        }
                    }
                }
                PipelineStatus::Born
                | PipelineStatus::Mark
                | PipelineStatus::Created
                | PipelineStatus::Queue
                | PipelineStatus::Running => {}
                status if status.is_end_status() => return Ok(RunStep::Ended(status)),
                status => {
                    return Err(ValidationError::new(format!(
                        "pipeline {pipeline_id} cannot run from status {status}"
                    ))
                    .with_field("status")
                    .into())
                }
            }

            if let Some(binding) = &record.queue {
                return Ok(RunStep::Enqueue(binding.queue_id));
            }
            if record.status != PipelineStatus::Running {
                set_status(record, PipelineStatus::Running, &mut events);
                record.started_at = Some(now_utc());
            }
            Ok(RunStep::Started)
        })?;
        self.emit_all(&events);

        let queue_id = match step {
            RunStep::Enqueue(queue_id) => queue_id,
            RunStep::Started => {
                info!(pipeline_id, "Pipeline started without queue");
                return Ok(PipelineQueueValidateResult::admitted());
            }
            RunStep::Ended(status) => {
                return Ok(PipelineQueueValidateResult::end(format!(
                    "pipeline already ended, status: {status}"
                )))
            }
        };

        let result = self.scheduler.enqueue(pipeline_id, queue_id)?;
        if result.is_end {
            warn!(pipeline_id, reason = %result.reason, "Queue refused pipeline");
            self.finish(pipeline_id, PipelineStatus::Error)?;
        }
        Ok(result)
    }

    /// Runs a pipeline and keeps retrying admission until it is admitted or
    /// refused for good.
    pub async fn run_until_admitted(&self, pipeline_id: u64) -> Result<PipelineQueueValidateResult> {
        let mut result = self.run(pipeline_id)?;

        while result.should_retry() {
            let interval = result
                .retry_option
                .map_or_else(|| self.config.enqueue_retry_interval(), |option| option.interval());
            debug!(
                pipeline_id,
                interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
                reason = %result.reason,
                "Waiting for queue admission"
            );
            tokio::time::sleep(interval).await;
            result = self.run(pipeline_id)?;
        }
        Ok(result)
    }

    /// Moves a pipeline to an end status, frees its queue slot and admits the
    /// next pending pipeline of the queue.
    ///
    /// Returns false if the pipeline had already ended.
    pub fn finish(&self, pipeline_id: u64, status: PipelineStatus) -> Result<bool> {
        let mut events = Vec::new();
        let (changed, held_tasks, cluster_name) = self.store.with_record(pipeline_id, |record| {
            let _span = pipeline_span(record).entered();
            let from = record.status;
            let changed = record.finish(status, now_utc())?;
            if changed {
                info!(status = %status, "Pipeline finished");
                events.push(SchedulerEvent::PipelineStatusChanged {
                    pipeline_id,
                    from,
                    to: status,
                });
            }

            let mut held = Vec::new();
            for task in &mut record.tasks {
                if task.status == PipelineStatus::Running {
                    if task.concurrency.is_some() {
                        held.push(task.action_type.clone());
                    }
                    task.status = status;
                }
            }
            Ok((changed, held, record.cluster_name.clone()))
        })?;
        self.emit_all(&events);

        for action_type in &held_tasks {
            self.limiter.release(action_type, &cluster_name);
        }
        self.signals.remove(&pipeline_id);
        self.release_and_advance(pipeline_id)?;
        Ok(changed)
    }

    fn release_and_advance(&self, pipeline_id: u64) -> Result<()> {
        let Some(binding) = self.store.get(pipeline_id)?.queue else {
            return Ok(());
        };
        if !self.scheduler.release(pipeline_id)? {
            return Ok(());
        }

        match self.scheduler.dequeue(binding.queue_id) {
            Ok(Some(next)) => {
                debug!(pipeline_id = next, queue_id = binding.queue_id, "Admitted next pipeline")
            }
            Ok(None) => {}
            Err(SchedulerError::QueueNotFound(_)) => {}
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// The cancel signal a running pipeline's executor should watch.
    #[must_use]
    pub fn cancel_signal(&self, pipeline_id: u64) -> Arc<CancelSignal> {
        Arc::clone(
            self.signals
                .entry(pipeline_id)
                .or_insert_with(CancelSignal::shared)
                .value(),
        )
    }

    /// Cancels a pipeline.
    ///
    /// Created or queued pipelines stop immediately. Running pipelines get
    /// their cancel signal fired; if the executor has not finished the
    /// pipeline when the grace period ends, it is force-stopped. Outside a
    /// tokio runtime there is no grace period and the pipeline stops at once.
    pub fn cancel(self: &Arc<Self>, pipeline_id: u64) -> Result<CancelOutcome> {
        let mut events = Vec::new();
        let running = self.store.with_record(pipeline_id, |record| {
            if !record.status.can_cancel() {
                return Err(SchedulerError::InvalidTransition {
                    from: record.status,
                    transition: StatusTransition::Cancel,
                });
            }
            if record.status == PipelineStatus::Running {
                return Ok(true);
            }

            let from = record.status;
            let outcome = record.apply(StatusTransition::Cancel)?;
            record.ended_at = Some(now_utc());
            events.push(SchedulerEvent::PipelineStatusChanged {
                pipeline_id,
                from,
                to: outcome.status,
            });
            Ok(false)
        })?;

        if !running {
            self.emit_all(&events);
            info!(pipeline_id, "Pipeline cancelled before running");
            self.release_and_advance(pipeline_id)?;
            return Ok(CancelOutcome::Stopped);
        }

        self.cancel_signal(pipeline_id).cancel("cancelled by user");
        info!(pipeline_id, "Cancel signal sent to running pipeline");

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(pipeline_id, "No runtime to wait out the grace period, stopping now");
            self.finish(pipeline_id, PipelineStatus::StopByUser)?;
            return Ok(CancelOutcome::Stopped);
        };

        let grace = self.config.cancel_grace_period();
        let service = Arc::clone(self);
        runtime.spawn(async move {
            tokio::time::sleep(grace).await;
            match service.finish(pipeline_id, PipelineStatus::StopByUser) {
                Ok(true) => warn!(
                    pipeline_id,
                    grace_secs = grace.as_secs(),
                    "Pipeline did not stop within grace period, force stopped"
                ),
                Ok(false) | Err(SchedulerError::PipelineNotFound(_)) => {}
                Err(err) => warn!(pipeline_id, error = %err, "Failed to force stop pipeline"),
            }
        });
        Ok(CancelOutcome::Signalled)
    }

    /// Ends every running pipeline past its timeout with `Timeout`.
    ///
    /// Returns the timed out pipelines.
    pub fn check_timeouts(&self, now: Timestamp) -> Result<Vec<u64>> {
        let mut timed_out = Vec::new();
        for record in self.store.snapshot() {
            if !record.is_timed_out(now) {
                continue;
            }
            if let Some(signal) = self.signals.get(&record.id) {
                signal.cancel("timeout");
            }
            if self.finish(record.id, PipelineStatus::Timeout)? {
                warn!(pipeline_id = record.id, timeout_secs = ?record.timeout_second, "Pipeline timed out");
                timed_out.push(record.id);
            }
        }
        Ok(timed_out)
    }

    /// Runs an ended pipeline again as a new pipeline.
    pub fn rerun(&self, pipeline_id: u64) -> Result<PipelineDTO> {
        self.rerun_with(pipeline_id, false)
    }

    /// Runs an ended pipeline again, keeping the tasks that succeeded.
    pub fn rerun_failed(&self, pipeline_id: u64) -> Result<PipelineDTO> {
        self.rerun_with(pipeline_id, true)
    }

    fn rerun_with(&self, pipeline_id: u64, failed_only: bool) -> Result<PipelineDTO> {
        let origin = self.store.get(pipeline_id)?;
        if !origin.status.is_end_status() {
            return Err(ValidationError::new(format!(
                "pipeline {pipeline_id} has not ended, status: {}",
                origin.status
            ))
            .with_field("status")
            .into());
        }

        let failed: HashSet<u64> = origin.failed_tasks().map(|task| task.id).collect();
        let id = self.store.next_id();
        let mut record = PipelineRecord::new(
            id,
            origin.source,
            origin.yml_name.clone(),
            origin.cluster_name.clone(),
            now_utc(),
        );
        record.yml = origin.yml.clone();
        record.labels = origin.labels.clone();
        record.run_params = origin.run_params.clone();
        record.queue = origin.queue.clone();
        record.resources = origin.resources;
        record.timeout_second = origin.timeout_second;
        record.gc = origin.gc.clone();
        record.task_loop = origin.task_loop.clone();
        record.rerun_of = Some(pipeline_id);
        record.tasks = origin
            .tasks
            .iter()
            .cloned()
            .map(|mut task| {
                let reset = if failed_only {
                    failed.contains(&task.id)
                } else {
                    task.status != PipelineStatus::Disabled
                };
                if reset {
                    task.status = PipelineStatus::Analyzed;
                }
                task.attempts = 0;
                task
            })
            .collect();

        let queue_id = record.queue.as_ref().map(|binding| binding.queue_id);
        self.store.insert(record);
        info!(pipeline_id = id, rerun_of = pipeline_id, failed_only, "Pipeline rerun created");
        self.events.try_emit(&SchedulerEvent::PipelineCreated {
            pipeline_id: id,
            queue_id,
        });

        self.run(id)?;
        self.get(id)
    }

    /// Disables, enables, pauses or unpauses one task.
    pub fn operate_task(&self, pipeline_id: u64, op: TaskOperation) -> Result<PipelineDTO> {
        if op.disable.is_none() && op.pause.is_none() {
            return Err(ValidationError::new("no task operation given").into());
        }

        self.store.with_record(pipeline_id, |record| {
            let task = record.task_mut(op.task_id)?;
            if let Some(disable) = op.disable {
                task.apply(if disable {
                    StatusTransition::Disable
                } else {
                    StatusTransition::Enable
                })?;
            }
            if let Some(pause) = op.pause {
                task.apply(if pause {
                    StatusTransition::PauseTask
                } else {
                    StatusTransition::UnpauseTask
                })?;
            }
            debug!(pipeline_id, task_id = op.task_id, status = %task.status, "Task operated");
            Ok(())
        })?;
        self.get(pipeline_id)
    }

    /// Starts a task of a running pipeline.
    ///
    /// Returns false when the action's concurrency limit is reached; the
    /// task stays `Born` and may be started later.
    pub fn start_task(&self, pipeline_id: u64, task_id: u64) -> Result<bool> {
        let limiter = &self.limiter;
        self.store.with_record(pipeline_id, |record| {
            if record.status != PipelineStatus::Running {
                return Err(ValidationError::new(format!(
                    "pipeline {pipeline_id} is not running, status: {}",
                    record.status
                ))
                .into());
            }

            let cluster_name = record.cluster_name.clone();
            let task = record.task_mut(task_id)?;
            if task.status != PipelineStatus::Born {
                return Err(ValidationError::new(format!(
                    "task {task_id} cannot start from status {}",
                    task.status
                ))
                .into());
            }

            if let Some(spec) = &task.concurrency {
                if !limiter.try_acquire(&task.action_type, &cluster_name, spec) {
                    debug!(pipeline_id, task_id, action_type = %task.action_type, "Task waits for concurrency");
                    return Ok(false);
                }
            }
            task.status = PipelineStatus::Running;
            Ok(true)
        })
    }

    /// Records the end of a task attempt and decides whether to loop.
    ///
    /// Platform errors are retried on the abnormal interval. Other results
    /// loop while the break condition fails and the strategy allows it.
    pub fn report_task_result(
        &self,
        pipeline_id: u64,
        task_id: u64,
        report: TaskReport,
    ) -> Result<TaskResultAction> {
        if !report.status.is_end_status() {
            return Err(ValidationError::new(format!(
                "task result must be an end status, got {}",
                report.status
            ))
            .with_field("status")
            .into());
        }

        let abnormal_default = self.config.abnormal_retry_interval();
        let limiter = &self.limiter;
        self.store.with_record(pipeline_id, |record| {
            let task_loop = record.loop_of(task_id)?;
            let cluster_name = record.cluster_name.clone();
            let task = record.task_mut(task_id)?;

            if task.status == PipelineStatus::Running && task.concurrency.is_some() {
                limiter.release(&task.action_type, &cluster_name);
            }

            let strategy: Option<LoopStrategy> =
                task_loop.as_ref().map(|task_loop| task_loop.effective_strategy());
            let attempts = task.attempts;

            let retry_delay = if report.status.is_abnormal_failed_status() {
                let limit = strategy.unwrap_or_default().normalized();
                next_retry(&limit, attempts).should_retry.then(|| {
                    abnormal_retry_interval(strategy.as_ref(), abnormal_default, attempts)
                })
            } else if let Some(strategy) = strategy {
                let broke = report
                    .loop_break
                    .unwrap_or_else(|| report.status.is_success_status());
                let decision = next_retry(&strategy, attempts);
                (!broke && decision.should_retry).then_some(decision.delay)
            } else {
                None
            };

            match retry_delay {
                Some(delay) => {
                    task.attempts += 1;
                    task.status = PipelineStatus::Born;
                    debug!(
                        pipeline_id,
                        task_id,
                        attempts = task.attempts,
                        delay_secs = delay.as_secs(),
                        "Task scheduled to run again"
                    );
                    Ok(TaskResultAction::Retry {
                        delay,
                        attempts: task.attempts,
                    })
                }
                None => {
                    task.status = report.status;
                    Ok(TaskResultAction::Done {
                        status: report.status,
                    })
                }
            }
        })
    }

    /// Puts a pipeline under manual review.
    ///
    /// The pipeline status is unchanged; the review outcome is reported as
    /// the DTO's `approval_status`.
    pub fn review(&self, pipeline_id: u64) -> Result<PipelineDTO> {
        let approval = self.store.with_record(pipeline_id, |record| {
            record.manual_review = true;
            Ok(apply_transition(record.status, StatusTransition::ManualReview)?.status)
        })?;
        debug!(pipeline_id, approval_status = %approval, "Pipeline under manual review");
        self.get(pipeline_id)
    }

    /// Looks up a pipeline.
    pub fn get(&self, pipeline_id: u64) -> Result<PipelineDTO> {
        Ok(PipelineDTO::from(&self.store.get(pipeline_id)?))
    }

    /// Looks up a pipeline, falling back to the archive.
    ///
    /// The flag tells whether the pipeline came from the archive.
    pub async fn get_include_archived(&self, pipeline_id: u64) -> Result<(PipelineDTO, bool)> {
        match self.store.get(pipeline_id) {
            Ok(record) => return Ok((PipelineDTO::from(&record), false)),
            Err(SchedulerError::PipelineNotFound(_)) => {}
            Err(err) => return Err(err),
        }

        let record = self
            .archive
            .get(pipeline_id)
            .await?
            .ok_or(SchedulerError::PipelineNotFound(pipeline_id))?;
        Ok((PipelineDTO::from(&record), true))
    }

    /// Deletes an analyzed or ended pipeline.
    pub fn delete(&self, pipeline_id: u64) -> Result<()> {
        let status = self.store.get(pipeline_id)?.status;
        apply_transition(status, StatusTransition::Delete)?;

        self.scheduler.release(pipeline_id)?;
        let removed = self
            .store
            .remove_if(pipeline_id, |record| record.status.can_delete());
        if removed.is_none() {
            return Err(SchedulerError::Internal(format!(
                "pipeline {pipeline_id} changed while being deleted"
            )));
        }
        self.signals.remove(&pipeline_id);
        info!(pipeline_id, "Pipeline deleted");
        Ok(())
    }

    fn emit_all(&self, events: &[SchedulerEvent]) {
        for event in events {
            self.events.try_emit(event);
        }
    }
}

fn validate_create(req: &PipelineCreateRequest) -> Result<PipelineSource> {
    if req.pipeline_yml.trim().is_empty() {
        return Err(ValidationError::new("missing pipelineYml")
            .with_field("pipelineYml")
            .into());
    }
    if req.pipeline_yml_name.trim().is_empty() {
        return Err(ValidationError::new("missing pipelineYmlName")
            .with_field("pipelineYmlName")
            .into());
    }
    if req.cluster_name.trim().is_empty() {
        return Err(ValidationError::new("missing clusterName")
            .with_field("clusterName")
            .into());
    }
    PipelineSource::from_str(&req.pipeline_source).map_err(|err| {
        SchedulerError::from(ValidationError::new(err.to_string()).with_field("pipelineSource"))
    })
}

fn label_value<'a>(labels: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    labels
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn set_status(record: &mut PipelineRecord, to: PipelineStatus, events: &mut Vec<SchedulerEvent>) {
    events.push(SchedulerEvent::PipelineStatusChanged {
        pipeline_id: record.id,
        from: record.status,
        to,
    });
    record.status = to;
}
