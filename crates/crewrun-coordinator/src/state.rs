//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crewrun_core::{CoordinationResult, Task, TaskId, TaskStatus, WorkerId};

use crate::broadcast::Broadcaster;
use crate::cache::AggregateCache;
use crate::config::Config;
use crate::error::CoordinatorError;
use crate::executor::{HttpExecutor, LocalExecutor, WorkerExecutor};
use crate::memory::{InMemoryStore, MemoryService};
use crate::registry::WorkerRegistry;
use crate::tracker::MetricsTracker;

/// A task that has been accepted but has not finished yet.
#[derive(Debug, Clone)]
pub struct ActiveTask {
    pub task: Task,
    pub status: TaskStatus,
    pub worker_id: Option<WorkerId>,
}

/// Shared application state.
pub struct AppState {
    pub config: Config,

    /// Live worker table.
    pub registry: WorkerRegistry,

    /// Coordination log and aggregates.
    pub tracker: MetricsTracker,

    /// Event fan-out to observers.
    pub broadcaster: Broadcaster,

    /// Aggregate view cache.
    pub cache: Arc<AggregateCache>,

    pub memory: Arc<dyn MemoryService>,

    pub executor: Arc<dyn WorkerExecutor>,

    /// Tasks that are pending or assigned.
    pub tasks: RwLock<HashMap<TaskId, ActiveTask>>,

    /// Terminal tasks with their results. Never trimmed: archived ids keep
    /// rejecting resubmission and satisfy later plan dependencies.
    pub archive: RwLock<HashMap<TaskId, CoordinationResult>>,

    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create a new AppState with the executor picked from the config.
    pub fn new(config: Config) -> Arc<Self> {
        let executor: Arc<dyn WorkerExecutor> = match &config.worker_endpoint {
            Some(endpoint) => Arc::new(HttpExecutor::new(endpoint)),
            None => Arc::new(LocalExecutor::new()),
        };
        Self::with_services(config, executor, Arc::new(InMemoryStore::new()))
    }

    /// Create a new AppState with explicit external services.
    pub fn with_services(
        config: Config,
        executor: Arc<dyn WorkerExecutor>,
        memory: Arc<dyn MemoryService>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry: WorkerRegistry::new(),
            tracker: MetricsTracker::new(config.efficiency.clone()),
            broadcaster: Broadcaster::new(config.observer_buffer, config.activity_history),
            cache: Arc::new(AggregateCache::new()),
            memory,
            executor,
            tasks: RwLock::new(HashMap::new()),
            archive: RwLock::new(HashMap::new()),
            started_at: Utc::now(),
            config,
        })
    }

    /// Accept tasks as pending. Fails without side effects if any id is
    /// already active or archived.
    pub async fn reserve_tasks(&self, tasks: &[Task]) -> Result<(), CoordinatorError> {
        let mut active = self.tasks.write().await;
        let archive = self.archive.read().await;
        for task in tasks {
            if active.contains_key(&task.id) || archive.contains_key(&task.id) {
                return Err(CoordinatorError::InvalidState(format!(
                    "task {} already submitted",
                    task.id
                )));
            }
        }
        for task in tasks {
            active.insert(
                task.id.clone(),
                ActiveTask {
                    task: task.clone(),
                    status: TaskStatus::Pending,
                    worker_id: None,
                },
            );
        }
        Ok(())
    }

    /// `pending -> assigned`.
    pub async fn mark_task_assigned(&self, task_id: &TaskId, worker_id: &WorkerId) {
        if let Some(entry) = self.tasks.write().await.get_mut(task_id) {
            entry.status = TaskStatus::Assigned;
            entry.worker_id = Some(worker_id.clone());
        }
    }

    /// Move a finished task from the active table to the archive.
    pub async fn archive_result(&self, result: &CoordinationResult) {
        let mut active = self.tasks.write().await;
        let mut archive = self.archive.write().await;
        active.remove(&result.task_id);
        archive.insert(result.task_id.clone(), result.clone());
    }

    pub async fn archived_result(&self, task_id: &TaskId) -> Option<CoordinationResult> {
        self.archive.read().await.get(task_id).cloned()
    }

    /// Number of pending or assigned tasks.
    pub async fn active_task_count(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn archived_task_count(&self) -> usize {
        self.archive.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewrun_core::{FailureReason, TaskType};

    #[tokio::test]
    async fn test_duplicate_task_ids_are_rejected() {
        let state = AppState::new(Config::default());
        let task = Task::new(TaskType::Backend, "api").with_id("t1");
        state.reserve_tasks(&[task.clone()]).await.unwrap();
        assert!(matches!(
            state.reserve_tasks(&[task.clone()]).await,
            Err(CoordinatorError::InvalidState(_))
        ));

        let result = CoordinationResult::undispatched(
            &task,
            FailureReason::NoAvailableWorker {
                task_type: TaskType::Backend,
            },
        );
        state.archive_result(&result).await;
        assert_eq!(state.active_task_count().await, 0);
        assert!(state.reserve_tasks(&[task]).await.is_err());
    }

    #[tokio::test]
    async fn test_reserve_is_all_or_nothing() {
        let state = AppState::new(Config::default());
        let a = Task::new(TaskType::Backend, "a").with_id("a");
        let b = Task::new(TaskType::Backend, "b").with_id("b");
        state.reserve_tasks(&[b.clone()]).await.unwrap();

        assert!(state.reserve_tasks(&[a, b]).await.is_err());
        assert_eq!(state.active_task_count().await, 1);
    }
}
