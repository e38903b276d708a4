//! End-to-end coordination tests.
//!
//! Workers are driven by a scripted executor so latencies and failures are
//! controlled by the test.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crewrun_coordinator::{
    AppState, Config, Dispatcher, ExecutorError, InMemoryStore, PlanOptions, WorkerExecutor,
};
use crewrun_core::{
    EventKind, FailureReason, ObserverId, Role, Task, TaskOutput, TaskType, Topic, Worker,
    WorkerStatus,
};

/// Sleeps for a fixed time, then fails tasks whose description starts with "fail".
struct ScriptedExecutor {
    work: Duration,
}

#[async_trait]
impl WorkerExecutor for ScriptedExecutor {
    async fn invoke(&self, worker: &Worker, task: &Task) -> Result<TaskOutput, ExecutorError> {
        tokio::time::sleep(self.work).await;
        if task.description.starts_with("fail") {
            return Err(ExecutorError::Failed(format!("{} gave up", worker.name)));
        }
        Ok(TaskOutput::new(
            format!("{} done", task.description),
            json!({ "by": worker.id }),
        ))
    }
}

fn create_test_dispatcher(config: Config, work: Duration) -> Dispatcher {
    let state = AppState::with_services(
        config,
        Arc::new(ScriptedExecutor { work }),
        Arc::new(InMemoryStore::new()),
    );
    Dispatcher::new(state)
}

// ============================================================================
// Single task scenarios
// ============================================================================

#[tokio::test]
async fn test_backend_task_runs_on_backend_worker() {
    let dispatcher = create_test_dispatcher(Config::default(), Duration::from_millis(5));
    let state = dispatcher.state().clone();
    let worker_id = state
        .registry
        .register(Role::Backend, Role::Backend.default_capabilities())
        .await;

    let result = dispatcher
        .coordinate(Task::new(TaskType::Backend, "orders endpoint"))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.worker_id, Some(worker_id.clone()));
    assert_eq!(
        state.registry.get(&worker_id).await.unwrap().status,
        WorkerStatus::Idle
    );

    let records = state.tracker.records(10).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].worker_id, worker_id);
    assert!(records[0].finished_at >= records[0].started_at);
}

#[tokio::test]
async fn test_unmatched_task_type_falls_back_to_any_idle_worker() {
    let dispatcher = create_test_dispatcher(Config::default(), Duration::ZERO);
    let state = dispatcher.state().clone();
    let worker_id = state
        .registry
        .register(Role::Frontend, Role::Frontend.default_capabilities())
        .await;

    let result = dispatcher
        .coordinate(Task::new(TaskType::General, "triage inbox"))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.worker_id, Some(worker_id));
}

#[tokio::test]
async fn test_no_idle_worker_is_a_failure_and_leaves_the_log_unchanged() {
    let dispatcher = create_test_dispatcher(Config::default(), Duration::ZERO);
    let state = dispatcher.state().clone();
    let observer = ObserverId::generate();
    let mut events = state.broadcaster.connect(observer.clone()).await;
    state
        .broadcaster
        .subscribe(&observer, [Topic::All])
        .await
        .unwrap();

    let result = dispatcher
        .coordinate(Task::new(TaskType::Backend, "nobody home"))
        .await
        .unwrap();

    assert_eq!(
        result.failure(),
        Some(&FailureReason::NoAvailableWorker {
            task_type: TaskType::Backend
        })
    );
    assert!(state.tracker.is_empty().await);

    let event = events.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::TaskFailed);
    assert!(event.is_error());
    assert_eq!(event.payload["error"], "no_available_worker");
}

#[tokio::test]
async fn test_timeout_moves_worker_to_error() {
    let config = Config {
        invocation_timeout: Duration::from_millis(30),
        ..Config::default()
    };
    let dispatcher = create_test_dispatcher(config, Duration::from_secs(10));
    let state = dispatcher.state().clone();
    let worker_id = state.registry.register(Role::Devops, vec![]).await;

    let result = dispatcher
        .coordinate(Task::new(TaskType::Deployment, "roll out"))
        .await
        .unwrap();

    assert_eq!(
        result.failure(),
        Some(&FailureReason::Timeout { timeout_ms: 30 })
    );
    assert_eq!(
        state.registry.get(&worker_id).await.unwrap().status,
        WorkerStatus::Error
    );
    assert_eq!(state.tracker.records(10).await.len(), 1);
}

// ============================================================================
// Phased plans
// ============================================================================

#[tokio::test]
async fn test_phase_two_starts_after_phase_one_finishes() {
    let dispatcher = create_test_dispatcher(Config::default(), Duration::from_millis(20));
    let state = dispatcher.state().clone();
    for role in [Role::Backend, Role::Frontend, Role::Testing] {
        state.registry.register(role, role.default_capabilities()).await;
    }

    let plan = vec![
        Task::new(TaskType::Backend, "api").with_id("api"),
        Task::new(TaskType::Frontend, "ui").with_id("ui"),
        Task::new(TaskType::Testing, "e2e")
            .with_id("e2e")
            .with_phase(2)
            .with_dependency("api")
            .with_dependency("ui"),
    ];
    let result = dispatcher
        .coordinate_phased_plan(plan, PlanOptions::default())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.phases.len(), 2);

    let records = state.tracker.records(10).await;
    assert_eq!(records.len(), 3);
    let phase_one_end = records
        .iter()
        .filter(|r| r.task_id.as_ref().map(|id| id.as_str()) != Some("e2e"))
        .map(|r| r.finished_at)
        .max()
        .unwrap();
    let phase_two = records
        .iter()
        .find(|r| r.task_id.as_ref().map(|id| id.as_str()) == Some("e2e"))
        .unwrap();
    assert!(phase_two.started_at >= phase_one_end);
}

#[tokio::test]
async fn test_failures_do_not_halt_later_phases_by_default() {
    let dispatcher = create_test_dispatcher(Config::default(), Duration::ZERO);
    let state = dispatcher.state().clone();
    state.registry.register(Role::Backend, vec![]).await;

    let plan = vec![
        Task::new(TaskType::Backend, "fail the migration").with_id("migrate"),
        Task::new(TaskType::Backend, "docs").with_id("docs").with_phase(2),
    ];
    let result = dispatcher
        .coordinate_phased_plan(plan, PlanOptions::default())
        .await
        .unwrap();

    assert!(!result.success);
    assert!(!result.results[0].is_success());
    // The only worker is in error after the failure, so phase two finds nobody.
    assert_eq!(
        result.results[1].failure().map(FailureReason::code),
        Some("no_available_worker")
    );
}

// ============================================================================
// Cache
// ============================================================================

#[tokio::test]
async fn test_cache_ttl_and_prefix_invalidation() {
    let dispatcher = create_test_dispatcher(Config::default(), Duration::ZERO);
    let cache = dispatcher.state().cache.clone();

    cache
        .set("workers:snapshot", json!(["a"]), Duration::from_millis(50))
        .await;
    assert_eq!(cache.get("workers:snapshot").await, Some(json!(["a"])));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(cache.get("workers:snapshot").await, None);

    cache
        .set("workers:snapshot", json!(["b"]), Duration::from_secs(60))
        .await;
    dispatcher.spawn_worker(Role::Leader, None, None).await;
    assert_eq!(cache.get("workers:snapshot").await, None);
}
