//! Worker administration handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;

use crewrun_core::WorkerId;

use crate::dispatcher::Dispatcher;
use crate::error::CoordinatorError;
use crate::http::responses::{SendMessageRequest, SpawnWorkerRequest, WorkersQuery};
use crate::state::AppState;
use crate::views::{self, WorkerView};

/// List workers, or the idle workers of one role with `?role=`.
pub async fn list_workers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WorkersQuery>,
) -> Json<Value> {
    match query.role {
        Some(role) => Json(views::idle_workers_by_role(&state, role).await),
        None => Json(views::registry_snapshot(&state).await),
    }
}

pub async fn get_worker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkerView>, CoordinatorError> {
    let worker = state.registry.get(&WorkerId::new(id)).await?;
    Ok(Json(WorkerView::from(worker)))
}

pub async fn spawn_worker(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpawnWorkerRequest>,
) -> impl IntoResponse {
    let worker = Dispatcher::new(state)
        .spawn_worker(req.role, req.capabilities, req.name)
        .await;
    (StatusCode::CREATED, Json(WorkerView::from(worker)))
}

pub async fn remove_worker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkerView>, CoordinatorError> {
    let worker = Dispatcher::new(state)
        .remove_worker(&WorkerId::new(id))
        .await?;
    Ok(Json(WorkerView::from(worker)))
}

pub async fn recover_worker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkerView>, CoordinatorError> {
    let worker = Dispatcher::new(state)
        .recover_worker(&WorkerId::new(id))
        .await?;
    Ok(Json(WorkerView::from(worker)))
}

pub async fn set_worker_offline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkerView>, CoordinatorError> {
    let worker = Dispatcher::new(state)
        .set_worker_offline(&WorkerId::new(id))
        .await?;
    Ok(Json(WorkerView::from(worker)))
}

/// Send a message from the worker in the path to `to`.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, CoordinatorError> {
    let record = Dispatcher::new(state)
        .send_message(&WorkerId::new(id), &req.to, req.content)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}
