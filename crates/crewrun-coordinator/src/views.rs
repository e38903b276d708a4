//! Aggregate views served through the TTL cache.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crewrun_core::{Role, Worker, WorkerStatus};

use crate::cache::{workers_by_role_key, KEY_METRICS_SUMMARY, KEY_STATUS, KEY_WORKERS_SNAPSHOT};
use crate::state::AppState;
use crate::tracker::MetricsSummary;

/// Worker enriched with roster metadata.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerView {
    #[serde(flatten)]
    pub worker: Worker,
    pub specialist_name: &'static str,
    pub emoji: &'static str,
    pub load: usize,
}

impl From<Worker> for WorkerView {
    fn from(worker: Worker) -> Self {
        Self {
            specialist_name: worker.role.display_name(),
            emoji: worker.role.emoji(),
            load: worker.load(),
            worker,
        }
    }
}

/// Overall state of the team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamState {
    /// Nothing in flight.
    Idle,
    /// At least one task is in flight.
    Coordinating,
    /// At least one worker is in `error`.
    Degraded,
}

/// Worker counts per status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub idle: usize,
    pub busy: usize,
    pub error: usize,
    pub offline: usize,
}

/// Coordination status as served by `/v1/status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinationStatus {
    pub state: TeamState,
    pub workers: StatusCounts,
    pub active_tasks: usize,
    pub archived_tasks: usize,
    pub observers: usize,
    pub metrics: MetricsSummary,
    pub uptime_seconds: i64,
}

/// All workers, in registration order.
pub async fn registry_snapshot(state: &Arc<AppState>) -> Value {
    cached(state, KEY_WORKERS_SNAPSHOT, || async {
        let workers: Vec<WorkerView> = state
            .registry
            .list()
            .await
            .into_iter()
            .map(WorkerView::from)
            .collect();
        workers
    })
    .await
}

/// Idle workers of one role.
pub async fn idle_workers_by_role(state: &Arc<AppState>, role: Role) -> Value {
    cached(state, &workers_by_role_key(role.as_str()), || async {
        let workers: Vec<WorkerView> = state
            .registry
            .list_idle_by_role(role)
            .await
            .into_iter()
            .map(WorkerView::from)
            .collect();
        workers
    })
    .await
}

pub async fn coordination_status(state: &Arc<AppState>) -> Value {
    cached(state, KEY_STATUS, || compute_status(state)).await
}

pub async fn metrics_summary(state: &Arc<AppState>) -> Value {
    cached(state, KEY_METRICS_SUMMARY, || state.tracker.summary()).await
}

async fn compute_status(state: &Arc<AppState>) -> CoordinationStatus {
    let counts = state.registry.status_counts().await;
    let count = |status: WorkerStatus| counts.get(&status).copied().unwrap_or(0);
    let workers = StatusCounts {
        total: counts.values().sum(),
        idle: count(WorkerStatus::Idle),
        busy: count(WorkerStatus::Busy),
        error: count(WorkerStatus::Error),
        offline: count(WorkerStatus::Offline),
    };
    let active_tasks = state.active_task_count().await;

    let team_state = if workers.error > 0 {
        TeamState::Degraded
    } else if workers.busy > 0 || active_tasks > 0 {
        TeamState::Coordinating
    } else {
        TeamState::Idle
    };

    CoordinationStatus {
        state: team_state,
        workers,
        active_tasks,
        archived_tasks: state.archived_task_count().await,
        observers: state.broadcaster.observer_count().await,
        metrics: state.tracker.summary().await,
        uptime_seconds: (chrono::Utc::now() - state.started_at).num_seconds(),
    }
}

/// Serve `key` from the cache, computing and storing it on a miss.
///
/// The computed view is not stored if `key` was invalidated while it was
/// being computed; the caller still gets it.
async fn cached<T, F, Fut>(state: &Arc<AppState>, key: &str, compute: F) -> Value
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    if let Some(value) = state.cache.get(key).await {
        return value;
    }
    let generation = state.cache.generation(key).await;
    let value = match serde_json::to_value(compute().await) {
        Ok(value) => value,
        Err(e) => {
            warn!(key, error = %e, "Failed to serialize aggregate view");
            return Value::Null;
        }
    };
    state
        .cache
        .set_if_generation(key, value.clone(), state.config.cache.view_ttl, generation)
        .await;
    value
}
