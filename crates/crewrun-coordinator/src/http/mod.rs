//! HTTP server for the coordinator.
//!
//! Provides endpoints for:
//! - Worker administration (`/v1/workers`)
//! - Task and plan submission (`/v1/tasks`, `/v1/plans`)
//! - Coordination log, status and activity feed (`/v1/records`, `/v1/status`, `/v1/activities`)
//! - Operator broadcasts (`/v1/broadcast`)
//! - Real-time event stream (`/ws`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer for dashboard access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Worker routes
        .route(
            "/v1/workers",
            get(handlers::list_workers).post(handlers::spawn_worker),
        )
        .route(
            "/v1/workers/:id",
            get(handlers::get_worker).delete(handlers::remove_worker),
        )
        .route("/v1/workers/:id/recover", post(handlers::recover_worker))
        .route("/v1/workers/:id/offline", post(handlers::set_worker_offline))
        .route("/v1/workers/:id/messages", post(handlers::send_message))
        // Coordination routes
        .route("/v1/tasks", post(handlers::submit_task))
        .route("/v1/plans", post(handlers::submit_plan))
        .route("/v1/records", get(handlers::list_records))
        .route("/v1/status", get(handlers::coordination_status))
        .route("/v1/activities", get(handlers::list_activities))
        .route("/v1/broadcast", post(handlers::broadcast))
        // Real-time stream
        .route("/ws", get(handlers::stream))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
