//! Worker registry - the live table of workers and their state.
//!
//! Every operation takes the registry lock exactly once, so readers never
//! observe a worker whose status and task set disagree.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crewrun_core::{Capability, CoreError, Role, TaskId, Worker, WorkerId, WorkerStatus};

#[derive(Default)]
struct RegistryInner {
    workers: HashMap<WorkerId, Worker>,
    next_seq: u64,
}

/// In-memory worker registry.
#[derive(Default)]
pub struct WorkerRegistry {
    inner: RwLock<RegistryInner>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new idle worker and return its id.
    pub async fn register(&self, role: Role, capabilities: Vec<Capability>) -> WorkerId {
        self.register_named(role, capabilities, None).await.id
    }

    /// Register a new idle worker, optionally naming it, and return a snapshot.
    pub async fn register_named(
        &self,
        role: Role,
        capabilities: Vec<Capability>,
        name: Option<String>,
    ) -> Worker {
        let mut inner = self.inner.write().await;
        inner.next_seq += 1;
        let mut worker = Worker::new(role, capabilities, inner.next_seq);
        if let Some(name) = name {
            worker = worker.with_name(name);
        }
        info!(worker_id = %worker.id, role = %role, "Worker registered");
        inner.workers.insert(worker.id.clone(), worker.clone());
        worker
    }

    /// Get a snapshot of one worker.
    pub async fn get(&self, id: &WorkerId) -> Result<Worker, CoreError> {
        self.inner
            .read()
            .await
            .workers
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::WorkerNotFound(id.to_string()))
    }

    /// All workers in registration order.
    pub async fn list(&self) -> Vec<Worker> {
        let inner = self.inner.read().await;
        let mut workers: Vec<Worker> = inner.workers.values().cloned().collect();
        workers.sort_by_key(|w| w.seq);
        workers
    }

    /// Idle workers of any role, in registration order.
    pub async fn list_idle(&self) -> Vec<Worker> {
        let inner = self.inner.read().await;
        let mut workers: Vec<Worker> = inner
            .workers
            .values()
            .filter(|w| w.status.can_accept_tasks())
            .cloned()
            .collect();
        workers.sort_by_key(|w| w.seq);
        workers
    }

    /// Idle workers of one role, in registration order.
    pub async fn list_idle_by_role(&self, role: Role) -> Vec<Worker> {
        let mut workers = self.list_idle().await;
        workers.retain(|w| w.role == role);
        workers
    }

    /// `idle -> busy`. Fails with `InvalidStateTransition` if the worker is
    /// not idle, which is how concurrent double assignment is rejected.
    pub async fn mark_busy(&self, id: &WorkerId, task_id: TaskId) -> Result<Worker, CoreError> {
        self.update(id, |w| w.assign(task_id)).await
    }

    /// `busy -> idle` once `task_id` has finished.
    pub async fn mark_idle(&self, id: &WorkerId, task_id: &TaskId) -> Result<Worker, CoreError> {
        self.update(id, |w| w.mark_idle(task_id)).await
    }

    /// `busy -> error` once `task_id` has failed.
    pub async fn mark_error(&self, id: &WorkerId, task_id: &TaskId) -> Result<Worker, CoreError> {
        self.update(id, |w| w.mark_error(task_id)).await
    }

    /// `error | offline -> idle`. Fails while an invocation is still running.
    pub async fn recover(&self, id: &WorkerId) -> Result<Worker, CoreError> {
        self.update(id, Worker::recover).await
    }

    /// Any state -> offline.
    pub async fn set_offline(&self, id: &WorkerId) -> Result<Worker, CoreError> {
        self.update(id, |w| {
            w.set_offline();
            Ok(())
        })
        .await
    }

    /// Fold a finished task into the worker's performance record.
    pub async fn update_performance(
        &self,
        id: &WorkerId,
        success: bool,
        latency_ms: u64,
        role_matched: bool,
    ) -> Result<Worker, CoreError> {
        self.update(id, |w| {
            w.performance.record(success, latency_ms, role_matched);
            Ok(())
        })
        .await
    }

    /// Record that two workers collaborated. Both must exist.
    pub async fn link_collaborators(&self, a: &WorkerId, b: &WorkerId) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        for id in [a, b] {
            if !inner.workers.contains_key(id) {
                return Err(CoreError::WorkerNotFound(id.to_string()));
            }
        }
        if a == b {
            return Ok(());
        }
        if let Some(worker) = inner.workers.get_mut(a) {
            worker.collaborators.insert(b.clone());
        }
        if let Some(worker) = inner.workers.get_mut(b) {
            worker.collaborators.insert(a.clone());
        }
        Ok(())
    }

    /// Remove a worker and return its final snapshot.
    ///
    /// The id is also dropped from every other worker's collaborator set.
    pub async fn remove(&self, id: &WorkerId) -> Result<Worker, CoreError> {
        let mut inner = self.inner.write().await;
        let removed = inner
            .workers
            .remove(id)
            .ok_or_else(|| CoreError::WorkerNotFound(id.to_string()))?;
        for worker in inner.workers.values_mut() {
            worker.collaborators.remove(id);
        }
        info!(worker_id = %id, status = %removed.status, "Worker removed");
        Ok(removed)
    }

    /// Worker counts per status.
    pub async fn status_counts(&self) -> HashMap<WorkerStatus, usize> {
        let inner = self.inner.read().await;
        let mut counts = HashMap::new();
        for worker in inner.workers.values() {
            *counts.entry(worker.status).or_insert(0) += 1;
        }
        counts
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.workers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn update<F>(&self, id: &WorkerId, f: F) -> Result<Worker, CoreError>
    where
        F: FnOnce(&mut Worker) -> Result<(), CoreError>,
    {
        let mut inner = self.inner.write().await;
        let worker = inner
            .workers
            .get_mut(id)
            .ok_or_else(|| CoreError::WorkerNotFound(id.to_string()))?;
        let before = worker.status;
        f(worker)?;
        if before != worker.status {
            debug!(worker_id = %id, from = %before, to = %worker.status, "Worker status changed");
        }
        Ok(worker.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = WorkerRegistry::new();
        let id = registry
            .register(Role::Backend, Role::Backend.default_capabilities())
            .await;

        let worker = registry.get(&id).await.unwrap();
        assert_eq!(worker.role, Role::Backend);
        assert_eq!(worker.status, WorkerStatus::Idle);
        assert_eq!(registry.list_idle_by_role(Role::Backend).await.len(), 1);
        assert!(registry.list_idle_by_role(Role::Frontend).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_worker_is_not_found() {
        let registry = WorkerRegistry::new();
        let missing = WorkerId::new("ghost");
        assert!(matches!(
            registry.remove(&missing).await,
            Err(CoreError::WorkerNotFound(_))
        ));
        assert!(registry.get(&missing).await.is_err());
        assert!(registry.mark_idle(&missing, &TaskId::new("t")).await.is_err());
    }

    #[tokio::test]
    async fn test_mark_busy_twice_is_invalid_state() {
        let registry = WorkerRegistry::new();
        let id = registry.register(Role::Testing, vec![]).await;

        registry.mark_busy(&id, TaskId::new("t1")).await.unwrap();
        let err = registry.mark_busy(&id, TaskId::new("t2")).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidStateTransition { .. }));
        assert!(registry.list_idle().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_assignment_has_exactly_one_winner() {
        for _ in 0..20 {
            let registry = Arc::new(WorkerRegistry::new());
            let id = registry.register(Role::Backend, vec![]).await;

            let handles: Vec<_> = (0..2)
                .map(|i| {
                    let registry = registry.clone();
                    let id = id.clone();
                    tokio::spawn(async move {
                        registry.mark_busy(&id, TaskId::new(format!("t{}", i))).await
                    })
                })
                .collect();

            let mut ok = 0;
            let mut rejected = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => ok += 1,
                    Err(CoreError::InvalidStateTransition { .. }) => rejected += 1,
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
            assert_eq!((ok, rejected), (1, 1));
            assert_eq!(registry.get(&id).await.unwrap().load(), 1);
        }
    }

    async fn running(registry: &WorkerRegistry, id: &WorkerId) -> Option<TaskId> {
        registry.get(id).await.ok().and_then(|w| w.in_flight)
    }

    #[tokio::test]
    async fn test_status_and_task_set_agree_after_random_operations() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let registry = WorkerRegistry::new();
        let mut ids = Vec::new();

        for step in 0..2_000u32 {
            match rng.gen_range(0..8) {
                0 => ids.push(registry.register(Role::ALL[rng.gen_range(0..8)], vec![]).await),
                _ if ids.is_empty() => continue,
                1 | 2 => {
                    let id = &ids[rng.gen_range(0..ids.len())];
                    let _ = registry.mark_busy(id, TaskId::new(format!("t{}", step))).await;
                }
                3 | 4 => {
                    let id = &ids[rng.gen_range(0..ids.len())];
                    if let Some(task) = running(&registry, id).await {
                        let _ = registry.mark_idle(id, &task).await;
                    }
                }
                5 => {
                    let id = &ids[rng.gen_range(0..ids.len())];
                    if let Some(task) = running(&registry, id).await {
                        let _ = registry.mark_error(id, &task).await;
                    }
                }
                6 => {
                    let id = &ids[rng.gen_range(0..ids.len())];
                    let _ = registry.recover(id).await;
                }
                _ => {
                    let id = ids.swap_remove(rng.gen_range(0..ids.len()));
                    registry.remove(&id).await.unwrap();
                }
            }

            for worker in registry.list().await {
                assert!(worker.is_consistent(), "inconsistent worker: {:?}", worker);
            }
        }
    }

    #[tokio::test]
    async fn test_offline_busy_worker_is_not_reassigned_until_its_task_reports() {
        let registry = WorkerRegistry::new();
        let id = registry.register(Role::Backend, vec![]).await;
        let first = TaskId::new("first");
        registry.mark_busy(&id, first.clone()).await.unwrap();

        registry.set_offline(&id).await.unwrap();
        assert!(matches!(
            registry.recover(&id).await,
            Err(CoreError::InvalidStateTransition { .. })
        ));
        assert!(registry.list_idle().await.is_empty());

        assert!(registry.mark_idle(&id, &first).await.is_err());
        registry.recover(&id).await.unwrap();
        registry.mark_busy(&id, TaskId::new("second")).await.unwrap();
        assert_eq!(registry.get(&id).await.unwrap().load(), 1);
    }

    #[tokio::test]
    async fn test_remove_unlinks_collaborators() {
        let registry = WorkerRegistry::new();
        let a = registry.register(Role::Backend, vec![]).await;
        let b = registry.register(Role::Frontend, vec![]).await;
        registry.link_collaborators(&a, &b).await.unwrap();

        let removed = registry.remove(&a).await.unwrap();
        assert!(removed.collaborators.contains(&b));
        assert!(registry.get(&b).await.unwrap().collaborators.is_empty());
    }
}
