//! End-to-end tests of the pipeline service.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::events::CollectingEventSink;
use crate::gc::ResourceGcOutcome;
use crate::pipeline::PipelineTask;
use crate::priority::{ActionConcurrency, PipelineTaskPriority};
use crate::queue::{PipelineQueueCreateRequest, PipelineQueueUpdateRequest, QueueMode, Resources};
use crate::retry::{LoopStrategy, PipelineTaskLoop};
use crate::testing::RecordingReclaimer;
use crate::utils::add_duration;

struct Fixture {
    service: Arc<PipelineService>,
    events: Arc<CollectingEventSink>,
    queue_id: u64,
}

fn fixture(concurrency: i64) -> Fixture {
    let events = Arc::new(CollectingEventSink::new());
    let service = PipelineService::new(SchedulerConfig::default()).with_event_sink(events.clone());
    let queue = service
        .registry()
        .create(
            PipelineQueueCreateRequest::new("builds", PipelineSource::Dice, "dev")
                .with_concurrency(concurrency)
                .with_max_resources(8.0, 8192.0),
        )
        .unwrap();

    Fixture {
        service: Arc::new(service),
        events,
        queue_id: queue.id,
    }
}

fn request() -> PipelineCreateRequest {
    PipelineCreateRequest::new("pipeline.yml", PipelineSource::Dice, "dev").with_bind_queue("builds")
}

impl Fixture {
    fn status(&self, id: u64) -> PipelineStatus {
        self.service.get(id).unwrap().status
    }

    fn started(&self) -> u64 {
        let dto = self.service.create(request().auto_run()).unwrap();
        assert_eq!(dto.status, PipelineStatus::Running);
        dto.id
    }
}

#[test]
fn test_create_validates_input() {
    let f = fixture(1);

    let mut missing_yml = request();
    missing_yml.pipeline_yml = String::new();
    let err = f.service.create(missing_yml).unwrap_err();
    assert!(matches!(err, SchedulerError::Validation(ref v) if v.field.as_deref() == Some("pipelineYml")));

    let mut bad_source = request();
    bad_source.pipeline_source = "jenkins".into();
    let err = f.service.create(bad_source).unwrap_err();
    assert!(err.is_client_error());

    let err = f
        .service
        .create(request().with_bind_queue("missing"))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::QueueNotFound(_)));
}

#[test]
fn test_bound_queue_must_match_source_and_cluster() {
    let f = fixture(1);
    let label = f.queue_id.to_string();

    let other_source = PipelineCreateRequest::new("p.yml", PipelineSource::Qa, "dev")
        .with_label(LABEL_BIND_QUEUE_ID, label.clone());
    let err = f.service.create(other_source).unwrap_err();
    assert!(err.to_string().contains("pipeline source not match"));

    let other_cluster = PipelineCreateRequest::new("p.yml", PipelineSource::Dice, "prod")
        .with_label(LABEL_BIND_QUEUE_ID, label);
    let err = f.service.create(other_cluster).unwrap_err();
    assert!(err.to_string().contains("cluster name not match"));
}

#[test]
fn test_labels_set_custom_priority_and_condition() {
    let f = fixture(1);
    let dto = f
        .service
        .create(
            request()
                .with_label(LABEL_BIND_QUEUE_CUSTOM_PRIORITY, "42")
                .with_label(LABEL_BIND_QUEUE_ENQUEUE_CONDITION, "SkipAlreadyRunningLimit"),
        )
        .unwrap();

    let binding = dto.queue.unwrap();
    assert_eq!(binding.queue_id, f.queue_id);
    assert_eq!(binding.custom_priority, Some(42));
    assert_eq!(
        binding.enqueue_condition,
        Some(EnqueueCondition::SkipAlreadyRunningLimit)
    );
    assert_eq!(dto.status, PipelineStatus::Analyzed);

    let err = f
        .service
        .create(request().with_label(LABEL_BIND_QUEUE_CUSTOM_PRIORITY, "high"))
        .unwrap_err();
    assert!(err.is_client_error());
}

#[test]
fn test_task_priority_picks_first_available_queue() {
    let f = fixture(1);
    let gpu = f
        .service
        .registry()
        .create(PipelineQueueCreateRequest::new("gpu", PipelineSource::Dice, "dev"))
        .unwrap();

    let rules: PipelineTaskPriority = serde_json::from_str(
        r#"{"enable": true, "v1": [
            {"queue": "absent", "concurrency": 3, "priority": 90},
            {"queue": "gpu", "concurrency": 2, "priority": 50},
            {"queue": "builds", "concurrency": 1, "priority": 10}
        ]}"#,
    )
    .unwrap();

    let mut req = PipelineCreateRequest::new("p.yml", PipelineSource::Dice, "dev");
    req.task_priority = Some(rules);
    let binding = f.service.create(req).unwrap().queue.unwrap();

    assert_eq!(binding.queue_id, gpu.id);
    assert_eq!(binding.custom_priority, Some(50));
    assert_eq!(binding.concurrency, Some(2));
}

#[test]
fn test_task_priority_concurrency_caps_running_pipelines() {
    let f = fixture(1);
    let gpu = f
        .service
        .registry()
        .create(
            PipelineQueueCreateRequest::new("gpu", PipelineSource::Dice, "dev")
                .with_concurrency(3)
                .with_max_resources(8.0, 8192.0),
        )
        .unwrap();
    let rules: PipelineTaskPriority = serde_json::from_str(
        r#"{"enable": true, "v1": [{"queue": "gpu", "concurrency": 2, "priority": 50}]}"#,
    )
    .unwrap();
    let by_rule = || {
        PipelineCreateRequest::new("p.yml", PipelineSource::Dice, "dev")
            .with_task_priority(rules.clone())
            .auto_run()
    };

    let first = f.service.create(by_rule()).unwrap();
    let second = f.service.create(by_rule()).unwrap();
    let third = f.service.create(by_rule()).unwrap();
    assert_eq!(first.status, PipelineStatus::Running);
    assert_eq!(second.status, PipelineStatus::Running);
    assert_eq!(third.status, PipelineStatus::Queue);

    // arrival order still holds behind the capped pipeline
    let plain = f
        .service
        .create(
            PipelineCreateRequest::new("p.yml", PipelineSource::Dice, "dev")
                .with_bind_queue("gpu")
                .auto_run(),
        )
        .unwrap();
    assert_eq!(plain.status, PipelineStatus::Queue);

    f.service.finish(first.id, PipelineStatus::Success).unwrap();
    assert_eq!(f.status(third.id), PipelineStatus::Running);
    assert_eq!(
        f.service.scheduler().queue_usage(gpu.id).unwrap().running_ids,
        vec![second.id, third.id]
    );
}

#[test]
fn test_finish_admits_next_pipeline() {
    let f = fixture(1);
    let first = f.started();

    let second = f.service.create(request()).unwrap().id;
    let waiting = f.service.run(second).unwrap();
    assert!(waiting.should_retry());
    assert_eq!(f.status(second), PipelineStatus::Queue);

    assert!(f.service.finish(first, PipelineStatus::Success).unwrap());
    assert_eq!(f.status(second), PipelineStatus::Running);
    assert!(!f.service.finish(first, PipelineStatus::Failed).unwrap());

    let usage = f.service.scheduler().queue_usage(f.queue_id).unwrap();
    assert_eq!(usage.running_ids, vec![second]);
    assert!(usage.pending_ids.is_empty());

    let dto = f.service.get(first).unwrap();
    assert!(dto.time_end.is_some());
    assert_eq!(dto.status, PipelineStatus::Success);
}

#[test]
fn test_lifecycle_events() {
    let f = fixture(1);
    let id = f.started();
    f.service.finish(id, PipelineStatus::Success).unwrap();

    assert_eq!(
        f.events.event_types(),
        vec![
            "pipeline.created",
            "pipeline.status_changed",
            "pipeline.status_changed",
            "queue.enqueued",
            "queue.admitted",
            "pipeline.status_changed",
            "pipeline.status_changed",
            "queue.released",
        ]
    );
}

#[test]
fn test_pipeline_without_queue_runs_directly() {
    let f = fixture(1);
    let dto = f
        .service
        .create(PipelineCreateRequest::new("p.yml", PipelineSource::Ops, "dev").auto_run())
        .unwrap();

    assert_eq!(dto.status, PipelineStatus::Running);
    assert!(dto.queue.is_none());
    assert!(dto.time_begin.is_some());
}

#[test]
fn test_oversized_request_ends_with_error() {
    let f = fixture(1);
    let id = f
        .service
        .create(request().with_resources(Resources::new(16.0, 1024.0)))
        .unwrap()
        .id;

    let result = f.service.run(id).unwrap();
    assert!(result.is_end);
    assert_eq!(f.status(id), PipelineStatus::Error);

    let again = f.service.run(id).unwrap();
    assert!(again.is_end);
}

#[test]
fn test_run_rejects_paused_pipeline() {
    let f = fixture(1);
    let id = f.service.create(request()).unwrap().id;
    f.service
        .store()
        .with_record(id, |r| r.apply(StatusTransition::Pause).map(|_| ()))
        .unwrap();

    assert!(f.service.run(id).unwrap_err().is_client_error());
}

#[tokio::test]
async fn test_cancel_queued_pipeline_stops_it() {
    let f = fixture(1);
    let running = f.started();
    let queued = f.service.create(request()).unwrap().id;
    f.service.run(queued).unwrap();

    assert_eq!(f.service.cancel(queued).unwrap(), CancelOutcome::Stopped);
    assert_eq!(f.status(queued), PipelineStatus::StopByUser);
    assert!(f
        .service
        .scheduler()
        .pending_order(f.queue_id)
        .unwrap()
        .is_empty());

    // nothing queued any more, the running one is untouched
    assert_eq!(f.status(running), PipelineStatus::Running);

    let err = f.service.cancel(queued).unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTransition { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_running_force_stops_after_grace() {
    let f = fixture(1);
    let id = f.started();
    let next = f.service.create(request()).unwrap().id;
    f.service.run(next).unwrap();

    let signal = f.service.cancel_signal(id);
    assert_eq!(f.service.cancel(id).unwrap(), CancelOutcome::Signalled);
    assert!(signal.is_cancelled());
    assert_eq!(f.status(id), PipelineStatus::Running);

    tokio::time::sleep(f.service.config().cancel_grace_period() + Duration::from_secs(1)).await;

    assert_eq!(f.status(id), PipelineStatus::StopByUser);
    assert_eq!(f.status(next), PipelineStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_running_respects_executor_outcome() {
    let f = fixture(1);
    let id = f.started();

    let signal = f.service.cancel_signal(id);
    f.service.cancel(id).unwrap();
    signal.cancelled().await;
    f.service.finish(id, PipelineStatus::StopByUser).unwrap();
    let ended_at = f.service.get(id).unwrap().time_end;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(f.service.get(id).unwrap().time_end, ended_at);
}

#[tokio::test(start_paused = true)]
async fn test_run_until_admitted_waits_for_slot() {
    let f = fixture(1);
    let first = f.started();
    let second = f.service.create(request()).unwrap().id;

    let service = Arc::clone(&f.service);
    let finisher = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        service.finish(first, PipelineStatus::Success).unwrap();
    });

    let result = f.service.run_until_admitted(second).await.unwrap();
    finisher.await.unwrap();

    assert!(result.success);
    assert_eq!(f.status(second), PipelineStatus::Running);
}

#[test]
fn test_check_timeouts() {
    let f = fixture(2);
    let limited = f
        .service
        .create(request().with_timeout(Duration::from_secs(600)).auto_run())
        .unwrap()
        .id;
    let unlimited = f.started();

    let now = now_utc();
    assert!(f.service.check_timeouts(now).unwrap().is_empty());

    let later = add_duration(now, Duration::from_secs(601));
    assert_eq!(f.service.check_timeouts(later).unwrap(), vec![limited]);
    assert_eq!(f.status(limited), PipelineStatus::Timeout);
    assert_eq!(f.status(unlimited), PipelineStatus::Running);
    assert_eq!(
        f.service.scheduler().queue_usage(f.queue_id).unwrap().running_count,
        1
    );
}

#[test]
fn test_rerun_keeps_binding() {
    let f = fixture(1);
    let id = f
        .service
        .create(request().with_label(LABEL_BIND_QUEUE_CUSTOM_PRIORITY, "77").auto_run())
        .unwrap()
        .id;

    let err = f.service.rerun(id).unwrap_err();
    assert!(err.is_client_error());

    f.service.finish(id, PipelineStatus::Failed).unwrap();
    let rerun = f.service.rerun(id).unwrap();

    assert_ne!(rerun.id, id);
    assert_eq!(rerun.rerun_of, Some(id));
    assert_eq!(rerun.status, PipelineStatus::Running);
    let binding = rerun.queue.unwrap();
    assert_eq!(binding.queue_id, f.queue_id);
    assert_eq!(binding.custom_priority, Some(77));
}

#[test]
fn test_rerun_failed_keeps_successful_tasks() {
    let f = fixture(1);
    let id = f
        .service
        .create(
            request()
                .with_task(PipelineTask::new(1, "checkout", "git-checkout"))
                .with_task(PipelineTask::new(2, "build", "buildpack"))
                .auto_run(),
        )
        .unwrap()
        .id;

    for (task_id, status) in [(1, PipelineStatus::Success), (2, PipelineStatus::Failed)] {
        assert!(f.service.start_task(id, task_id).unwrap());
        f.service
            .report_task_result(id, task_id, TaskReport::new(status))
            .unwrap();
    }
    f.service.finish(id, PipelineStatus::Failed).unwrap();

    let rerun = f.service.rerun_failed(id).unwrap();
    let statuses: Vec<_> = rerun.tasks.iter().map(|t| t.status).collect();
    assert_eq!(statuses, vec![PipelineStatus::Success, PipelineStatus::Born]);

    f.service.finish(rerun.id, PipelineStatus::Failed).unwrap();
    let full = f.service.rerun(rerun.id).unwrap();
    assert!(full.tasks.iter().all(|t| t.status == PipelineStatus::Born));
}

#[test]
fn test_operate_task_guards() {
    let f = fixture(1);
    let id = f
        .service
        .create(request().with_task(PipelineTask::new(1, "build", "buildpack")))
        .unwrap()
        .id;

    let disable = TaskOperation {
        task_id: 1,
        disable: Some(true),
        pause: None,
    };
    let dto = f.service.operate_task(id, disable).unwrap();
    assert_eq!(dto.tasks[0].status, PipelineStatus::Disabled);

    let enable = TaskOperation {
        disable: Some(false),
        ..disable
    };
    let dto = f.service.operate_task(id, enable).unwrap();
    assert_eq!(dto.tasks[0].status, PipelineStatus::Analyzed);

    // pausing is only allowed once the task is born
    let pause = TaskOperation {
        task_id: 1,
        disable: None,
        pause: Some(true),
    };
    assert!(matches!(
        f.service.operate_task(id, pause).unwrap_err(),
        SchedulerError::InvalidTransition { .. }
    ));

    f.service.run(id).unwrap();
    let dto = f.service.operate_task(id, pause).unwrap();
    assert_eq!(dto.tasks[0].status, PipelineStatus::Paused);
    let unpause = TaskOperation {
        pause: Some(false),
        ..pause
    };
    let dto = f.service.operate_task(id, unpause).unwrap();
    assert_eq!(dto.tasks[0].status, PipelineStatus::Born);

    let missing = TaskOperation {
        task_id: 99,
        ..pause
    };
    assert!(matches!(
        f.service.operate_task(id, missing).unwrap_err(),
        SchedulerError::TaskNotFound { task_id: 99, .. }
    ));
    assert!(f
        .service
        .operate_task(id, TaskOperation::default())
        .unwrap_err()
        .is_client_error());
}

#[test]
fn test_action_concurrency_limits_task_start() {
    let f = fixture(2);
    let limit: ActionConcurrency =
        serde_json::from_str(r#"{"enable": true, "v1": {"default": {"max": 1}}}"#).unwrap();
    let task = PipelineTask::new(1, "deploy", "dice-deploy").with_concurrency(limit);

    let a = f
        .service
        .create(request().with_task(task.clone()).auto_run())
        .unwrap()
        .id;
    let b = f.service.create(request().with_task(task).auto_run()).unwrap().id;

    assert!(f.service.start_task(a, 1).unwrap());
    assert!(!f.service.start_task(b, 1).unwrap());
    assert_eq!(f.service.limiter().running("dice-deploy", "dev"), 1);

    f.service
        .report_task_result(a, 1, TaskReport::new(PipelineStatus::Success))
        .unwrap();
    assert!(f.service.start_task(b, 1).unwrap());

    // finishing the pipeline frees the slot of its running task
    f.service.finish(b, PipelineStatus::StopByUser).unwrap();
    assert_eq!(f.service.limiter().running("dice-deploy", "dev"), 0);
}

#[test]
fn test_task_loop_declines_then_breaks() {
    let f = fixture(1);
    let task = PipelineTask::new(1, "health-check", "custom-script")
        .with_loop(PipelineTaskLoop::new("").with_strategy(LoopStrategy::new().with_max_times(3)));
    let id = f.service.create(request().with_task(task).auto_run()).unwrap().id;

    let mut delays = Vec::new();
    loop {
        assert!(f.service.start_task(id, 1).unwrap());
        match f
            .service
            .report_task_result(id, 1, TaskReport::new(PipelineStatus::Failed))
            .unwrap()
        {
            TaskResultAction::Retry { delay, .. } => delays.push(delay.as_secs()),
            TaskResultAction::Done { status } => {
                assert_eq!(status, PipelineStatus::Failed);
                break;
            }
        }
    }
    assert_eq!(delays, vec![2, 4, 8]);

    let dto = f.service.get(id).unwrap();
    assert_eq!(dto.tasks[0].attempts, 3);
}

#[test]
fn test_task_loop_break_expression_from_executor() {
    let f = fixture(1);
    let task = PipelineTask::new(1, "poll", "custom-script")
        .with_loop(PipelineTaskLoop::new("outputs.ready == 'true'"));
    let id = f.service.create(request().with_task(task).auto_run()).unwrap().id;

    f.service.start_task(id, 1).unwrap();
    let action = f
        .service
        .report_task_result(
            id,
            1,
            TaskReport::new(PipelineStatus::Success).with_loop_break(false),
        )
        .unwrap();
    assert!(matches!(action, TaskResultAction::Retry { attempts: 1, .. }));

    f.service.start_task(id, 1).unwrap();
    let action = f
        .service
        .report_task_result(
            id,
            1,
            TaskReport::new(PipelineStatus::Success).with_loop_break(true),
        )
        .unwrap();
    assert_eq!(
        action,
        TaskResultAction::Done {
            status: PipelineStatus::Success
        }
    );
}

#[test]
fn test_abnormal_failure_retries_on_platform_interval() {
    let f = fixture(1);
    let id = f
        .service
        .create(
            request()
                .with_task(PipelineTask::new(1, "build", "buildpack"))
                .auto_run(),
        )
        .unwrap()
        .id;

    f.service.start_task(id, 1).unwrap();
    let action = f
        .service
        .report_task_result(id, 1, TaskReport::new(PipelineStatus::LostConn))
        .unwrap();
    assert_eq!(
        action,
        TaskResultAction::Retry {
            delay: Duration::from_secs(30),
            attempts: 1
        }
    );

    // a normal failure without a loop is final
    f.service.start_task(id, 1).unwrap();
    let action = f
        .service
        .report_task_result(id, 1, TaskReport::new(PipelineStatus::Failed))
        .unwrap();
    assert_eq!(
        action,
        TaskResultAction::Done {
            status: PipelineStatus::Failed
        }
    );

    assert!(f
        .service
        .report_task_result(id, 1, TaskReport::new(PipelineStatus::Running))
        .unwrap_err()
        .is_client_error());
}

#[test]
fn test_review_overlay_keeps_real_status() {
    let f = fixture(1);
    let id = f.started();

    let dto = f.service.review(id).unwrap();
    assert_eq!(dto.status, PipelineStatus::Running);
    assert_eq!(dto.approval_status, Some(PipelineStatus::WaitApproval));
    assert_eq!(
        f.service.review(id).unwrap().approval_status,
        Some(PipelineStatus::WaitApproval)
    );

    f.service.finish(id, PipelineStatus::Success).unwrap();
    let dto = f.service.get(id).unwrap();
    assert_eq!(dto.status, PipelineStatus::Success);
    assert_eq!(dto.approval_status, Some(PipelineStatus::Accept));
    assert!(f
        .service
        .scheduler()
        .queue_usage(f.queue_id)
        .unwrap()
        .running_ids
        .is_empty());
}

#[tokio::test]
async fn test_reviewed_pipeline_is_still_collected() {
    let f = fixture(1);
    let id = f.started();
    f.service.finish(id, PipelineStatus::Success).unwrap();
    f.service.review(id).unwrap();

    let reclaimer = Arc::new(RecordingReclaimer::new());
    let sweeper = f.service.gc_sweeper(reclaimer.clone());
    let ended_at = f.service.store().get(id).unwrap().ended_at.unwrap();
    let ttl = Duration::from_secs(f.service.config().gc.resource_success_ttl_secs);

    assert_eq!(
        sweeper
            .gc_pipeline_resources(id, add_duration(ended_at, ttl))
            .await
            .unwrap(),
        ResourceGcOutcome::Reclaimed
    );
    assert_eq!(reclaimer.call_count(), 1);

    let rerun = f.service.rerun(id).unwrap();
    assert_eq!(rerun.approval_status, None);
    f.service.delete(id).unwrap();
}

#[test]
fn test_cancel_running_without_runtime_stops_at_once() {
    let f = fixture(1);
    let id = f.started();
    let next = f.service.create(request()).unwrap().id;
    f.service.run(next).unwrap();
    let signal = f.service.cancel_signal(id);

    assert_eq!(f.service.cancel(id).unwrap(), CancelOutcome::Stopped);
    assert!(signal.is_cancelled());
    assert_eq!(f.status(id), PipelineStatus::StopByUser);
    assert_eq!(f.status(next), PipelineStatus::Running);
}

#[test]
fn test_renamed_queue_keeps_waiting_pipelines() {
    let f = fixture(1);
    let first = f.started();
    let waiting = f.service.create(request()).unwrap().id;
    assert!(f.service.run(waiting).unwrap().should_retry());

    f.service
        .registry()
        .update(
            f.queue_id,
            PipelineQueueUpdateRequest {
                name: Some("builds-old".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let taken = f
        .service
        .registry()
        .create(
            PipelineQueueCreateRequest::new("builds", PipelineSource::Dice, "dev")
                .with_max_resources(8.0, 8192.0),
        )
        .unwrap();

    assert!(f.service.run(waiting).unwrap().should_retry());
    assert_eq!(f.status(waiting), PipelineStatus::Queue);

    f.service.finish(first, PipelineStatus::Success).unwrap();
    assert_eq!(f.status(waiting), PipelineStatus::Running);
    f.service.finish(waiting, PipelineStatus::Success).unwrap();

    let scheduler = f.service.scheduler();
    assert!(scheduler.queue_usage(f.queue_id).unwrap().running_ids.is_empty());
    assert!(scheduler.queue_usage(taken.id).unwrap().running_ids.is_empty());
    f.service.registry().delete(taken.id).unwrap();
}

#[test]
fn test_delete_guards() {
    let f = fixture(1);
    let analyzed = f.service.create(request()).unwrap().id;
    let running = f.started();

    f.service.delete(analyzed).unwrap();
    assert!(matches!(
        f.service.get(analyzed).unwrap_err(),
        SchedulerError::PipelineNotFound(_)
    ));

    assert!(matches!(
        f.service.delete(running).unwrap_err(),
        SchedulerError::InvalidTransition { .. }
    ));
    f.service.finish(running, PipelineStatus::Success).unwrap();
    f.service.delete(running).unwrap();
    assert!(f.service.store().is_empty());
}

#[tokio::test]
async fn test_finished_pipeline_is_collected() {
    let f = fixture(1);
    let id = f.started();
    f.service.finish(id, PipelineStatus::Success).unwrap();

    let reclaimer = Arc::new(RecordingReclaimer::new());
    let sweeper = f.service.gc_sweeper(reclaimer.clone());

    let created_at = f.service.store().get(id).unwrap().time_created;
    let ended_at = f.service.store().get(id).unwrap().ended_at.unwrap();
    let gc = &f.service.config().gc;

    let at_resource_ttl = add_duration(ended_at, Duration::from_secs(gc.resource_success_ttl_secs));
    assert_eq!(
        sweeper.gc_pipeline_resources(id, at_resource_ttl).await.unwrap(),
        ResourceGcOutcome::Reclaimed
    );
    assert_eq!(reclaimer.calls(), vec![(id, "dev".to_string())]);
    assert!(f.service.get(id).unwrap().resources_released);

    let at_finished_ttl = add_duration(ended_at, Duration::from_secs(gc.finished_ttl_secs));
    let report = sweeper.sweep_once(at_finished_ttl).await;
    assert_eq!(report.archived, 1);
    assert!(f.service.store().is_empty());
    assert!(matches!(
        f.service.get(id).unwrap_err(),
        SchedulerError::PipelineNotFound(_)
    ));

    let (archived, from_archive) = f.service.get_include_archived(id).await.unwrap();
    assert!(from_archive);
    assert_eq!(archived.status, PipelineStatus::Success);
    assert!(archived.resources_released);

    assert_eq!(f.events.events_of_type("gc.").len(), 2);

    let past_retention = add_duration(
        created_at,
        Duration::from_secs(gc.finished_archive_retain_secs + 1),
    );
    assert_eq!(sweeper.sweep_once(past_retention).await.archive_purged, 1);
    assert!(matches!(
        f.service.get_include_archived(id).await.unwrap_err(),
        SchedulerError::PipelineNotFound(_)
    ));
}

#[tokio::test]
async fn test_get_include_archived_prefers_live_record() {
    let f = fixture(1);
    let id = f.started();

    let (dto, from_archive) = f.service.get_include_archived(id).await.unwrap();
    assert!(!from_archive);
    assert_eq!(dto.status, PipelineStatus::Running);
    assert!(f.service.get_include_archived(id + 100).await.is_err());
}

#[test]
fn test_loose_queue_lets_skip_condition_through() {
    let f = fixture(1);
    f.service
        .registry()
        .create(
            PipelineQueueCreateRequest::new("loose", PipelineSource::Dice, "dev")
                .with_mode(QueueMode::Loose)
                .with_max_resources(8.0, 8192.0),
        )
        .unwrap();
    let loose = || {
        PipelineCreateRequest::new("p.yml", PipelineSource::Dice, "dev").with_bind_queue("loose")
    };

    let first = f.service.create(loose().auto_run()).unwrap();
    assert_eq!(first.status, PipelineStatus::Running);

    let plain = f.service.create(loose().auto_run()).unwrap();
    assert_eq!(plain.status, PipelineStatus::Queue);

    let skipping = f
        .service
        .create(
            loose()
                .with_label(LABEL_BIND_QUEUE_ENQUEUE_CONDITION, "SkipAlreadyRunningLimit")
                .auto_run(),
        )
        .unwrap();
    assert_eq!(skipping.status, PipelineStatus::Running);
}
