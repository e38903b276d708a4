//! HTTP request and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crewrun_core::{Capability, Role, Task, Topic, WorkerId};

use crate::dispatcher::PlanOptions;
use crate::error::CoordinatorError;

// ============================================================================
// Worker types
// ============================================================================

/// Query string of the worker list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct WorkersQuery {
    /// Only idle workers of this role.
    pub role: Option<Role>,
}

/// Request body for the spawn endpoint.
#[derive(Debug, Deserialize)]
pub struct SpawnWorkerRequest {
    pub role: Role,

    /// Defaults to the role's capabilities.
    #[serde(default)]
    pub capabilities: Option<Vec<Capability>>,

    #[serde(default)]
    pub name: Option<String>,
}

/// Request body for the message endpoint.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub to: WorkerId,
    pub content: String,
}

// ============================================================================
// Coordination types
// ============================================================================

/// Request body for the plan endpoint.
#[derive(Debug, Deserialize)]
pub struct SubmitPlanRequest {
    pub tasks: Vec<Task>,

    #[serde(flatten)]
    pub options: PlanOptions,
}

/// Request body for the broadcast endpoint.
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    #[serde(default = "default_broadcast_topic")]
    pub topic: Topic,
    pub message: String,
}

fn default_broadcast_topic() -> Topic {
    Topic::ProjectUpdate
}

/// Response body for the broadcast endpoint.
#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    pub delivered: usize,
}

/// `?limit=` query.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default)
    }
}

// ============================================================================
// Error types
// ============================================================================

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl CoordinatorError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoordinatorError::NotFound(_) => StatusCode::NOT_FOUND,
            CoordinatorError::InvalidState(_) => StatusCode::CONFLICT,
            CoordinatorError::InvalidPlan(_) | CoordinatorError::InvalidConfig(_) => {
                StatusCode::BAD_REQUEST
            }
            CoordinatorError::NoAvailableWorker(_) | CoordinatorError::DependencyUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CoordinatorError::InvocationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CoordinatorError::InvocationFailed(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CoordinatorError::NotFound(_) => "not_found",
            CoordinatorError::InvalidState(_) => "invalid_state",
            CoordinatorError::NoAvailableWorker(_) => "no_available_worker",
            CoordinatorError::InvocationTimeout { .. } => "timeout",
            CoordinatorError::InvocationFailed(_) => "invocation_failed",
            CoordinatorError::DependencyUnavailable(_) => "dependency_unavailable",
            CoordinatorError::InvalidPlan(_) => "invalid_plan",
            CoordinatorError::InvalidConfig(_) => "invalid_config",
        }
    }
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.code().to_string(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            CoordinatorError::NotFound("w".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CoordinatorError::InvalidState("t".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CoordinatorError::InvalidPlan("p".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_plan_request_flattens_options() {
        let req: SubmitPlanRequest = serde_json::from_str(
            r#"{"tasks":[{"task_type":"backend","description":"api"}],"stop_on_failure":true}"#,
        )
        .unwrap();
        assert_eq!(req.tasks.len(), 1);
        assert!(req.options.stop_on_failure);
    }
}
