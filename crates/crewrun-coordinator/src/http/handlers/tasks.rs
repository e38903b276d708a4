//! Task, plan and coordination feed handlers.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::Value;
use tracing::info;

use crewrun_core::{CoordinationRecord, CoordinationResult, Event, Task};

use crate::dispatcher::{Dispatcher, PlanResult};
use crate::error::CoordinatorError;
use crate::http::responses::{BroadcastRequest, BroadcastResponse, LimitQuery, SubmitPlanRequest};
use crate::state::AppState;
use crate::views;

const DEFAULT_RECORD_LIMIT: usize = 100;
const DEFAULT_ACTIVITY_LIMIT: usize = 50;

/// Coordinate one task and wait for its result.
///
/// Operational failures are part of the result body; only misuse is an error.
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(task): Json<Task>,
) -> Result<Json<CoordinationResult>, CoordinatorError> {
    info!(task_id = %task.id, task_type = %task.task_type, "Task submitted");
    let result = Dispatcher::new(state).coordinate(task).await?;
    Ok(Json(result))
}

/// Run a phased plan and wait for every phase.
pub async fn submit_plan(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitPlanRequest>,
) -> Result<Json<PlanResult>, CoordinatorError> {
    info!(tasks = req.tasks.len(), stop_on_failure = req.options.stop_on_failure, "Plan submitted");
    let result = Dispatcher::new(state)
        .coordinate_phased_plan(req.tasks, req.options)
        .await?;
    Ok(Json(result))
}

/// Most recent coordination records, oldest first.
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<CoordinationRecord>> {
    Json(
        state
            .tracker
            .records(query.limit_or(DEFAULT_RECORD_LIMIT))
            .await,
    )
}

pub async fn coordination_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(views::coordination_status(&state).await)
}

/// Recent events, newest first.
pub async fn list_activities(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<Event>> {
    Json(
        state
            .broadcaster
            .recent(query.limit_or(DEFAULT_ACTIVITY_LIMIT))
            .await,
    )
}

pub async fn broadcast(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BroadcastRequest>,
) -> Json<BroadcastResponse> {
    let delivered = Dispatcher::new(state).broadcast(req.topic, req.message).await;
    Json(BroadcastResponse { delivered })
}
