//! Task dispatcher - assigns tasks to the best idle worker and runs them.
//!
//! A coordination goes through: rank idle workers, claim the best one with an
//! atomic `mark_busy`, invoke it outside every lock under a timeout, then fold
//! the outcome into the registry, the log, the memory service, the cache and
//! the observers. Operational failures are returned as data inside the
//! [`CoordinationResult`]; only misuse comes back as `Err`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crewrun_core::{
    Capability, CoordinationRecord, CoordinationResult, Event, FailureReason, Outcome, Role,
    Task, TaskId, TaskOutput, Topic, Worker, WorkerId, WorkerStatus,
};

use crate::cache::{PREFIX_METRICS, PREFIX_STATUS, PREFIX_WORKERS};
use crate::error::CoordinatorError;
use crate::memory::{experience_key, WorkerContext};
use crate::scoring::{self, ScoredWorker};
use crate::state::AppState;

/// Options of a phased plan run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOptions {
    /// Fail every later phase without dispatch once a phase has a failure.
    #[serde(default)]
    pub stop_on_failure: bool,
}

/// Outcome of one phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub phase: u32,
    pub succeeded: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of a phased plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanResult {
    /// One result per task, in phase order.
    pub results: Vec<CoordinationResult>,

    /// True only if every task succeeded.
    pub success: bool,

    pub phases: Vec<PhaseSummary>,
}

impl PlanResult {
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }
}

/// Task dispatcher.
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<AppState>,
}

impl Dispatcher {
    /// Create a new Dispatcher.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Assign one task to the best idle worker and run it.
    ///
    /// Returns `Err(InvalidState)` only if the task id was already submitted.
    pub async fn coordinate(&self, task: Task) -> Result<CoordinationResult, CoordinatorError> {
        self.state.reserve_tasks(std::slice::from_ref(&task)).await?;
        Ok(self.run(task).await)
    }

    /// Run a plan phase by phase.
    ///
    /// Tasks sharing a phase run concurrently; a phase starts only once every
    /// task of the previous phase is terminal.
    pub async fn coordinate_phased_plan(
        &self,
        tasks: Vec<Task>,
        options: PlanOptions,
    ) -> Result<PlanResult, CoordinatorError> {
        self.validate_plan(&tasks).await?;
        self.state.reserve_tasks(&tasks).await?;

        let total = tasks.len();
        let mut phases: BTreeMap<u32, Vec<Task>> = BTreeMap::new();
        for task in tasks {
            phases.entry(task.phase).or_default().push(task);
        }
        info!(tasks = total, phases = phases.len(), "Plan started");

        let mut results = Vec::with_capacity(total);
        let mut summaries = Vec::with_capacity(phases.len());
        let mut outcomes: HashMap<TaskId, bool> = HashMap::new();
        let mut halted_by: Option<u32> = None;

        for (phase, tasks) in phases {
            let started_at = Utc::now();
            self.publish(Event::phase_started(phase, tasks.len())).await;
            info!(phase, tasks = tasks.len(), "Phase started");

            let mut runs = Vec::with_capacity(tasks.len());
            for task in tasks {
                let blocker = self.blocker(&task, &outcomes, halted_by).await;
                runs.push(async move {
                    match blocker {
                        Some(failure) => self.fail_undispatched(&task, failure).await,
                        None => self.run(task).await,
                    }
                });
            }
            let phase_results = join_all(runs).await;

            let succeeded = phase_results.iter().filter(|r| r.is_success()).count();
            let failed = phase_results.len() - succeeded;
            for result in &phase_results {
                outcomes.insert(result.task_id.clone(), result.is_success());
            }
            if failed > 0 && options.stop_on_failure && halted_by.is_none() {
                warn!(phase, failed, "Phase failed, halting the rest of the plan");
                halted_by = Some(phase);
            }

            self.publish(Event::phase_completed(phase, succeeded, failed))
                .await;
            info!(phase, succeeded, failed, "Phase completed");
            summaries.push(PhaseSummary {
                phase,
                succeeded,
                failed,
                started_at,
                finished_at: Utc::now(),
            });
            results.extend(phase_results);
        }

        let plan = PlanResult {
            success: results.iter().all(CoordinationResult::is_success),
            results,
            phases: summaries,
        };
        self.publish(Event::plan_completed(plan.success, total, plan.failed()))
            .await;
        info!(success = plan.success, tasks = total, failed = plan.failed(), "Plan completed");
        Ok(plan)
    }

    /// Notify one worker from another. No retry on failure.
    pub async fn send_message(
        &self,
        from: &WorkerId,
        to: &WorkerId,
        content: impl Into<String>,
    ) -> Result<CoordinationRecord, CoordinatorError> {
        let started_at = Utc::now();
        let content = content.into();
        let sender = self.state.registry.get(from).await?;
        let target = self.state.registry.get(to).await?;

        let outcome = if target.status == WorkerStatus::Offline {
            Outcome::Failed {
                failure: FailureReason::InvocationFailed {
                    message: format!("worker {} is offline", target.id),
                },
            }
        } else {
            self.state.registry.link_collaborators(from, to).await?;
            Outcome::Succeeded {
                output: TaskOutput::new(
                    content,
                    json!({ "from_name": sender.name, "to_name": target.name }),
                ),
            }
        };

        let record = CoordinationRecord::for_message(from.clone(), to.clone(), outcome, started_at);
        if record.is_success() {
            debug!(from = %from, to = %to, "Message delivered");
        } else {
            warn!(from = %from, to = %to, "Message not delivered, target offline");
        }
        self.state.tracker.record(record.clone()).await;
        self.invalidate(&[PREFIX_WORKERS, PREFIX_METRICS]).await;
        self.publish(Event::worker_message(&record)).await;
        Ok(record)
    }

    /// Register a worker. Capabilities default to the role's.
    pub async fn spawn_worker(
        &self,
        role: Role,
        capabilities: Option<Vec<Capability>>,
        name: Option<String>,
    ) -> Worker {
        let capabilities = capabilities.unwrap_or_else(|| role.default_capabilities());
        let worker = self
            .state
            .registry
            .register_named(role, capabilities, name)
            .await;
        self.state.tracker.worker_spawned().await;
        self.invalidate(&[PREFIX_WORKERS, PREFIX_STATUS, PREFIX_METRICS])
            .await;
        self.publish(Event::worker_spawned(&worker)).await;
        worker
    }

    /// Remove a worker; the event names its collaborators.
    pub async fn remove_worker(&self, id: &WorkerId) -> Result<Worker, CoordinatorError> {
        let worker = self.state.registry.remove(id).await?;
        self.invalidate(&[PREFIX_WORKERS, PREFIX_STATUS]).await;
        self.publish(Event::worker_removed(&worker)).await;
        Ok(worker)
    }

    /// `error | offline -> idle`.
    pub async fn recover_worker(&self, id: &WorkerId) -> Result<Worker, CoordinatorError> {
        let worker = self.state.registry.recover(id).await?;
        info!(worker_id = %id, "Worker recovered");
        self.invalidate(&[PREFIX_WORKERS, PREFIX_STATUS]).await;
        self.publish(Event::worker_status_changed(&worker)).await;
        Ok(worker)
    }

    /// Take a worker out of the idle pool.
    pub async fn set_worker_offline(&self, id: &WorkerId) -> Result<Worker, CoordinatorError> {
        let worker = self.state.registry.set_offline(id).await?;
        info!(worker_id = %id, "Worker marked offline");
        self.invalidate(&[PREFIX_WORKERS, PREFIX_STATUS]).await;
        self.publish(Event::worker_status_changed(&worker)).await;
        Ok(worker)
    }

    /// Publish an operator message. Returns the number of observers reached.
    pub async fn broadcast(&self, topic: Topic, message: impl Into<String>) -> usize {
        self.publish(Event::broadcast(topic, message)).await
    }

    async fn validate_plan(&self, tasks: &[Task]) -> Result<(), CoordinatorError> {
        if let Some(duplicate) = duplicate_ids(tasks).first() {
            return Err(CoordinatorError::InvalidPlan(format!(
                "task {} appears more than once",
                duplicate
            )));
        }
        let phase_of: HashMap<&TaskId, u32> = tasks.iter().map(|t| (&t.id, t.phase)).collect();

        for task in tasks {
            for dependency in &task.dependencies {
                match phase_of.get(dependency) {
                    Some(phase) if *phase < task.phase => {}
                    Some(phase) => {
                        return Err(CoordinatorError::InvalidPlan(format!(
                            "task {} (phase {}) depends on {} in phase {}",
                            task.id, task.phase, dependency, phase
                        )));
                    }
                    None if self.state.archived_result(dependency).await.is_some() => {}
                    None => {
                        return Err(CoordinatorError::InvalidPlan(format!(
                            "task {} depends on unknown task {}",
                            task.id, dependency
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Reason a plan task must not be dispatched, if any.
    async fn blocker(
        &self,
        task: &Task,
        outcomes: &HashMap<TaskId, bool>,
        halted_by: Option<u32>,
    ) -> Option<FailureReason> {
        if let Some(failed_phase) = halted_by {
            return Some(FailureReason::PlanHalted { failed_phase });
        }
        for dependency in &task.dependencies {
            let succeeded = match outcomes.get(dependency) {
                Some(ok) => *ok,
                None => self
                    .state
                    .archived_result(dependency)
                    .await
                    .is_some_and(|r| r.is_success()),
            };
            if !succeeded {
                return Some(FailureReason::DependencyFailed {
                    dependency: dependency.clone(),
                });
            }
        }
        None
    }

    /// Dispatch an already reserved task. Never fails; the outcome is data.
    async fn run(&self, task: Task) -> CoordinationResult {
        let no_worker = FailureReason::NoAvailableWorker {
            task_type: task.task_type,
        };
        let candidates = self.state.registry.list_idle().await;
        if candidates.is_empty() {
            return self.fail_undispatched(&task, no_worker).await;
        }

        let contexts = self.load_contexts(&candidates).await;
        let ranked = scoring::rank(&self.state.config.scoring, candidates, &task, &contexts);
        match self.claim(&task, ranked).await {
            Some(worker) => self.execute(task, worker).await,
            None => self.fail_undispatched(&task, no_worker).await,
        }
    }

    /// Load memory contexts for the candidates. Failures degrade to no context.
    async fn load_contexts(&self, candidates: &[Worker]) -> HashMap<WorkerId, WorkerContext> {
        let loads = candidates.iter().map(|worker| async move {
            (worker.id.clone(), self.state.memory.load(&worker.id).await)
        });

        let mut contexts = HashMap::new();
        for (worker_id, loaded) in join_all(loads).await {
            match loaded {
                Ok(context) => {
                    contexts.insert(worker_id, context);
                }
                Err(e) => {
                    warn!(worker_id = %worker_id, error = %e, "Memory unavailable, scoring without context");
                }
            }
        }
        contexts
    }

    /// Claim the best candidate still idle. Losing a race moves on to the next.
    async fn claim(&self, task: &Task, ranked: Vec<ScoredWorker>) -> Option<Worker> {
        for candidate in ranked {
            match self
                .state
                .registry
                .mark_busy(&candidate.worker.id, task.id.clone())
                .await
            {
                Ok(worker) => {
                    debug!(
                        task_id = %task.id,
                        worker_id = %worker.id,
                        score = candidate.score.value,
                        role_matched = candidate.role_matched(),
                        "Worker claimed"
                    );
                    return Some(worker);
                }
                Err(e) => {
                    debug!(task_id = %task.id, worker_id = %candidate.worker.id, error = %e, "Claim lost, trying next candidate");
                }
            }
        }
        None
    }

    /// Invoke a claimed worker and fold the outcome back in.
    async fn execute(&self, task: Task, worker: Worker) -> CoordinationResult {
        self.state.mark_task_assigned(&task.id, &worker.id).await;
        self.invalidate(&[PREFIX_WORKERS, PREFIX_STATUS]).await;
        self.publish(Event::task_assigned(&task, &worker)).await;
        self.publish(Event::worker_status_changed(&worker)).await;
        info!(task_id = %task.id, task_type = %task.task_type, worker_id = %worker.id, "Task assigned");

        let started_at = Utc::now();
        let timer = Instant::now();
        let timeout = self.state.config.invocation_timeout;
        let handle = tokio::spawn({
            let executor = self.state.executor.clone();
            let worker = worker.clone();
            let task = task.clone();
            async move { executor.invoke(&worker, &task).await }
        });
        let abort = handle.abort_handle();

        let outcome = match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(output))) => Outcome::Succeeded { output },
            Ok(Ok(Err(e))) => Outcome::Failed {
                failure: FailureReason::InvocationFailed {
                    message: e.to_string(),
                },
            },
            Ok(Err(join_error)) => Outcome::Failed {
                failure: FailureReason::InvocationFailed {
                    message: format!("worker crashed: {}", join_error),
                },
            },
            Err(_) => {
                abort.abort();
                Outcome::Failed {
                    failure: FailureReason::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    },
                }
            }
        };
        let latency_ms = timer.elapsed().as_millis() as u64;
        let success = outcome.is_success();
        let role_matched = task.task_type.role_rank(worker.role).is_some();

        if let Err(e) = self
            .state
            .registry
            .update_performance(&worker.id, success, latency_ms, role_matched)
            .await
        {
            warn!(worker_id = %worker.id, error = %e, "Could not update worker performance");
        }
        let transition = if success {
            self.state.registry.mark_idle(&worker.id, &task.id).await
        } else {
            self.state.registry.mark_error(&worker.id, &task.id).await
        };
        let updated = match transition {
            Ok(updated) => Some(updated),
            Err(e) => {
                warn!(worker_id = %worker.id, error = %e, "Worker changed state during invocation");
                None
            }
        };

        let result = CoordinationResult {
            task_id: task.id.clone(),
            task_type: task.task_type,
            worker_id: Some(worker.id.clone()),
            outcome,
            latency_ms,
            phase: task.phase,
            finished_at: Utc::now(),
        };
        self.state
            .tracker
            .record(CoordinationRecord::for_task(&result, worker.id.clone(), started_at))
            .await;
        if success {
            self.remember_experience(&worker.id, &task).await;
        }
        self.state.archive_result(&result).await;
        self.invalidate(&[PREFIX_WORKERS, PREFIX_STATUS, PREFIX_METRICS])
            .await;

        match result.failure() {
            None => info!(task_id = %task.id, worker_id = %worker.id, latency_ms, "Task succeeded"),
            Some(failure) => warn!(
                task_id = %task.id,
                worker_id = %worker.id,
                latency_ms,
                reason = failure.code(),
                "Task failed: {}",
                failure.describe()
            ),
        }
        self.publish(Event::task_finished(&result)).await;
        if let Some(updated) = updated {
            self.publish(Event::worker_status_changed(&updated)).await;
        }
        result
    }

    /// Bump the worker's experience counter for the task type.
    async fn remember_experience(&self, worker_id: &WorkerId, task: &Task) {
        let memory = &self.state.memory;
        let count = match memory.load(worker_id).await {
            Ok(mut context) => context.record_experience(task.task_type),
            Err(e) => {
                warn!(worker_id = %worker_id, error = %e, "Memory unavailable, experience not stored");
                return;
            }
        };
        if let Err(e) = memory
            .store(worker_id, &experience_key(task.task_type), json!(count))
            .await
        {
            warn!(worker_id = %worker_id, error = %e, "Memory unavailable, experience not stored");
        }
    }

    /// Fail a task that was never dispatched. No record is appended.
    async fn fail_undispatched(&self, task: &Task, failure: FailureReason) -> CoordinationResult {
        warn!(task_id = %task.id, task_type = %task.task_type, reason = failure.code(), "Task not dispatched: {}", failure.describe());
        let result = CoordinationResult::undispatched(task, failure);
        self.state.archive_result(&result).await;
        self.invalidate(&[PREFIX_STATUS]).await;
        self.publish(Event::task_finished(&result)).await;
        result
    }

    async fn invalidate(&self, prefixes: &[&str]) {
        for prefix in prefixes {
            self.state.cache.invalidate(prefix).await;
        }
    }

    async fn publish(&self, event: Event) -> usize {
        self.state.broadcaster.publish(event).await
    }
}

/// Tasks of `tasks` that share an id with another.
pub fn duplicate_ids(tasks: &[Task]) -> Vec<TaskId> {
    let mut seen = HashSet::new();
    tasks
        .iter()
        .filter(|t| !seen.insert(&t.id))
        .map(|t| t.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::cache::KEY_WORKERS_SNAPSHOT;
    use crate::config::Config;
    use crate::executor::{ExecutorError, LocalExecutor, WorkerExecutor};
    use crate::memory::{InMemoryStore, MemoryError, MemoryService};
    use crate::views;
    use crewrun_core::{EventKind, ObserverId, TaskType, WorkerStatus};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(AppState::new(Config::default()))
    }

    struct FailingExecutor;

    #[async_trait]
    impl WorkerExecutor for FailingExecutor {
        async fn invoke(&self, _: &Worker, _: &Task) -> Result<TaskOutput, ExecutorError> {
            Err(ExecutorError::Failed("compiler exploded".to_string()))
        }
    }

    struct PanickingExecutor;

    #[async_trait]
    impl WorkerExecutor for PanickingExecutor {
        async fn invoke(&self, _: &Worker, _: &Task) -> Result<TaskOutput, ExecutorError> {
            panic!("worker bug")
        }
    }

    struct UnavailableMemory;

    #[async_trait]
    impl MemoryService for UnavailableMemory {
        async fn load(&self, _: &WorkerId) -> Result<WorkerContext, MemoryError> {
            Err(MemoryError::Unavailable("connection refused".to_string()))
        }

        async fn store(
            &self,
            _: &WorkerId,
            _: &str,
            _: serde_json::Value,
        ) -> Result<(), MemoryError> {
            Err(MemoryError::Unavailable("connection refused".to_string()))
        }
    }

    /// Sleeps, and records the peak number of invocations running at once.
    #[derive(Default)]
    struct CountingExecutor {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl WorkerExecutor for CountingExecutor {
        async fn invoke(&self, _: &Worker, task: &Task) -> Result<TaskOutput, ExecutorError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(TaskOutput::new(task.description.clone(), serde_json::Value::Null))
        }
    }

    fn with_executor(executor: Arc<dyn WorkerExecutor>) -> Dispatcher {
        Dispatcher::new(AppState::with_services(
            Config::default(),
            executor,
            Arc::new(InMemoryStore::new()),
        ))
    }

    #[tokio::test]
    async fn test_prefers_matching_role() {
        let d = dispatcher();
        d.spawn_worker(Role::Frontend, None, None).await;
        let backend = d.spawn_worker(Role::Backend, None, None).await;

        let result = d
            .coordinate(Task::new(TaskType::Database, "orders schema"))
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.worker_id, Some(backend.id.clone()));

        let worker = d.state().registry.get(&backend.id).await.unwrap();
        assert_eq!(worker.status, WorkerStatus::Idle);
        assert_eq!(worker.performance.tasks_completed, 1);
    }

    #[tokio::test]
    async fn test_duplicate_task_id_is_misuse() {
        let d = dispatcher();
        d.spawn_worker(Role::Backend, None, None).await;
        let task = Task::new(TaskType::Backend, "endpoint").with_id("dup");
        d.coordinate(task.clone()).await.unwrap();
        assert!(matches!(
            d.coordinate(task).await,
            Err(CoordinatorError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_invocation_moves_worker_to_error() {
        let d = with_executor(Arc::new(FailingExecutor));
        let worker = d.spawn_worker(Role::Testing, None, None).await;

        let result = d
            .coordinate(Task::new(TaskType::Testing, "suite"))
            .await
            .unwrap();
        assert_eq!(result.failure().unwrap().code(), "invocation_failed");
        assert_eq!(
            d.state().registry.get(&worker.id).await.unwrap().status,
            WorkerStatus::Error
        );
        assert_eq!(d.state().tracker.len().await, 1);

        // An errored worker is out of the pool until recovered.
        let result = d
            .coordinate(Task::new(TaskType::Testing, "again"))
            .await
            .unwrap();
        assert_eq!(result.failure().unwrap().code(), "no_available_worker");

        d.recover_worker(&worker.id).await.unwrap();
        assert_eq!(d.state().registry.list_idle().await.len(), 1);
    }

    #[tokio::test]
    async fn test_worker_taken_offline_mid_task_is_not_reassigned() {
        let executor = Arc::new(CountingExecutor::default());
        let d = with_executor(executor.clone());
        let worker = d.spawn_worker(Role::Backend, None, None).await;

        let (first, second) = tokio::join!(
            d.coordinate(Task::new(TaskType::Backend, "first")),
            async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                d.set_worker_offline(&worker.id).await.unwrap();
                assert!(matches!(
                    d.recover_worker(&worker.id).await,
                    Err(CoordinatorError::InvalidState(_))
                ));
                d.coordinate(Task::new(TaskType::Backend, "second"))
                    .await
                    .unwrap()
            }
        );

        assert!(first.unwrap().is_success());
        assert_eq!(second.failure().unwrap().code(), "no_available_worker");
        assert_eq!(executor.peak.load(Ordering::SeqCst), 1);

        // The first invocation has reported back, so the worker can return.
        let current = d.state().registry.get(&worker.id).await.unwrap();
        assert_eq!(current.status, WorkerStatus::Offline);
        assert!(current.in_flight.is_none());
        d.recover_worker(&worker.id).await.unwrap();
        let third = d
            .coordinate(Task::new(TaskType::Backend, "third"))
            .await
            .unwrap();
        assert!(third.is_success());
    }

    #[tokio::test]
    async fn test_remove_worker_notifies_collaborators_and_evicts_views() {
        let d = dispatcher();
        let state = d.state().clone();
        let lead = d.spawn_worker(Role::Leader, None, None).await;
        let dev = d.spawn_worker(Role::Backend, None, None).await;
        d.send_message(&lead.id, &dev.id, "pair on the api")
            .await
            .unwrap();

        let observer = ObserverId::generate();
        let mut events = state.broadcaster.connect(observer.clone()).await;
        state
            .broadcaster
            .subscribe(&observer, [Topic::SpecialistUpdate])
            .await
            .unwrap();
        views::registry_snapshot(&state).await;
        assert!(state.cache.get(KEY_WORKERS_SNAPSHOT).await.is_some());

        let removed = d.remove_worker(&dev.id).await.unwrap();
        assert_eq!(removed.id, dev.id);

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::WorkerRemoved);
        assert_eq!(event.payload["collaborators"], serde_json::json!([lead.id]));
        assert_eq!(state.cache.get(KEY_WORKERS_SNAPSHOT).await, None);
        assert!(state
            .registry
            .get(&lead.id)
            .await
            .unwrap()
            .collaborators
            .is_empty());

        assert!(matches!(
            d.remove_worker(&WorkerId::new("ghost")).await,
            Err(CoordinatorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_panicking_worker_is_a_structured_failure() {
        let d = with_executor(Arc::new(PanickingExecutor));
        d.spawn_worker(Role::Backend, None, None).await;
        let result = d
            .coordinate(Task::new(TaskType::Backend, "crash"))
            .await
            .unwrap();
        assert_eq!(result.failure().unwrap().code(), "invocation_failed");
    }

    #[tokio::test]
    async fn test_memory_outage_degrades_to_session_mode() {
        let d = Dispatcher::new(AppState::with_services(
            Config::default(),
            Arc::new(LocalExecutor::new()),
            Arc::new(UnavailableMemory),
        ));
        d.spawn_worker(Role::Documentation, None, None).await;
        let result = d
            .coordinate(Task::new(TaskType::Documentation, "readme"))
            .await
            .unwrap();
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_success_is_remembered_as_experience() {
        let d = dispatcher();
        let worker = d.spawn_worker(Role::Security, None, None).await;
        d.coordinate(Task::new(TaskType::Security, "audit"))
            .await
            .unwrap();
        d.coordinate(Task::new(TaskType::Security, "audit again"))
            .await
            .unwrap();

        let context = d.state().memory.load(&worker.id).await.unwrap();
        assert_eq!(context.experience.get(&TaskType::Security), Some(&2));
    }

    #[tokio::test]
    async fn test_invalid_plans_are_rejected() {
        let d = dispatcher();
        let same_phase = vec![
            Task::new(TaskType::Backend, "a").with_id("a"),
            Task::new(TaskType::Backend, "b").with_id("b").with_dependency("a"),
        ];
        assert!(matches!(
            d.coordinate_phased_plan(same_phase, PlanOptions::default()).await,
            Err(CoordinatorError::InvalidPlan(_))
        ));

        let unknown = vec![Task::new(TaskType::Backend, "c").with_dependency("missing")];
        assert!(matches!(
            d.coordinate_phased_plan(unknown, PlanOptions::default()).await,
            Err(CoordinatorError::InvalidPlan(_))
        ));

        let dup = vec![
            Task::new(TaskType::Backend, "x").with_id("x"),
            Task::new(TaskType::Backend, "y").with_id("x"),
        ];
        assert_eq!(duplicate_ids(&dup), vec![TaskId::new("x")]);
        assert!(d
            .coordinate_phased_plan(dup, PlanOptions::default())
            .await
            .is_err());
        assert_eq!(d.state().active_task_count().await, 0);
    }

    #[tokio::test]
    async fn test_dependency_failure_skips_dispatch() {
        let d = with_executor(Arc::new(FailingExecutor));
        d.spawn_worker(Role::Backend, None, None).await;
        d.spawn_worker(Role::Backend, None, None).await;

        let plan = vec![
            Task::new(TaskType::Backend, "api").with_id("api"),
            Task::new(TaskType::Testing, "tests")
                .with_id("tests")
                .with_phase(2)
                .with_dependency("api"),
        ];
        let result = d
            .coordinate_phased_plan(plan, PlanOptions::default())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(
            result.results[1].failure(),
            Some(&FailureReason::DependencyFailed {
                dependency: TaskId::new("api")
            })
        );
        assert!(result.results[1].worker_id.is_none());
        assert_eq!(d.state().tracker.len().await, 1);
    }

    #[tokio::test]
    async fn test_stop_on_failure_halts_later_phases() {
        let d = dispatcher();
        d.spawn_worker(Role::Backend, None, None).await;
        d.spawn_worker(Role::Backend, None, None).await;

        let plan = vec![
            Task::new(TaskType::Backend, "ok").with_id("ok"),
            Task::new(TaskType::Backend, "").with_id("bad"),
            Task::new(TaskType::Backend, "later").with_id("later").with_phase(2),
        ];
        let result = d
            .coordinate_phased_plan(plan, PlanOptions { stop_on_failure: true })
            .await
            .unwrap();
        assert_eq!(result.phases.len(), 2);
        assert_eq!(result.phases[0].failed, 1);
        assert_eq!(
            result.results[2].failure(),
            Some(&FailureReason::PlanHalted { failed_phase: 1 })
        );
    }

    #[tokio::test]
    async fn test_send_message() {
        let d = dispatcher();
        let lead = d.spawn_worker(Role::Leader, None, None).await;
        let dev = d.spawn_worker(Role::Backend, None, None).await;

        let record = d.send_message(&lead.id, &dev.id, "ship it").await.unwrap();
        assert!(record.is_success());
        assert_eq!(record.message_output().unwrap().summary, "ship it");
        assert!(d
            .state()
            .registry
            .get(&dev.id)
            .await
            .unwrap()
            .collaborators
            .contains(&lead.id));

        d.set_worker_offline(&dev.id).await.unwrap();
        let record = d.send_message(&lead.id, &dev.id, "hello?").await.unwrap();
        assert!(!record.is_success());
        assert_eq!(d.state().tracker.totals().await.messages_sent, 2);
        assert_eq!(d.state().tracker.totals().await.tasks_completed, 0);

        assert!(matches!(
            d.send_message(&lead.id, &WorkerId::new("ghost"), "hi").await,
            Err(CoordinatorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_enforced() {
        let config = Config {
            invocation_timeout: Duration::from_millis(20),
            ..Config::default()
        };
        let d = Dispatcher::new(AppState::with_services(
            config,
            Arc::new(LocalExecutor::new().with_work_delay(Duration::from_secs(5))),
            Arc::new(InMemoryStore::new()),
        ));
        let worker = d.spawn_worker(Role::Devops, None, None).await;
        let result = d
            .coordinate(Task::new(TaskType::Deployment, "prod"))
            .await
            .unwrap();
        assert_eq!(
            result.failure(),
            Some(&FailureReason::Timeout { timeout_ms: 20 })
        );
        assert!(result.latency_ms < 5_000);
        assert_eq!(
            d.state().registry.get(&worker.id).await.unwrap().status,
            WorkerStatus::Error
        );
    }
}
