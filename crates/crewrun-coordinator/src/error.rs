//! Coordinator error taxonomy.

use thiserror::Error;

use crewrun_core::{CoreError, FailureReason, TaskType, WorkerId};

/// Coordinator errors.
///
/// `NotFound`, `InvalidState`, `InvalidPlan` and `InvalidConfig` signal misuse
/// and are returned to the caller directly. The operational variants are
/// normally carried inside a `CoordinationResult` as a [`FailureReason`] and
/// only surface through [`CoordinatorError::from_failure`].
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("No idle worker available for {0} task")]
    NoAvailableWorker(TaskType),

    #[error("Worker {worker_id} timed out after {timeout_ms}ms")]
    InvocationTimeout { worker_id: WorkerId, timeout_ms: u64 },

    #[error("Worker invocation failed: {0}")]
    InvocationFailed(String),

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<CoreError> for CoordinatorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::WorkerNotFound(_) | CoreError::TaskNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            CoreError::InvalidStateTransition { .. } => Self::InvalidState(err.to_string()),
            CoreError::InvalidInput(msg) => Self::InvalidPlan(msg),
        }
    }
}

impl CoordinatorError {
    /// Map a structured failure back onto the taxonomy.
    pub fn from_failure(failure: &FailureReason, worker_id: Option<&WorkerId>) -> Self {
        match failure {
            FailureReason::NoAvailableWorker { task_type } => Self::NoAvailableWorker(*task_type),
            FailureReason::Timeout { timeout_ms } => Self::InvocationTimeout {
                worker_id: worker_id.cloned().unwrap_or_else(|| WorkerId::new("unknown")),
                timeout_ms: *timeout_ms,
            },
            FailureReason::InvocationFailed { message } => Self::InvocationFailed(message.clone()),
            FailureReason::DependencyFailed { .. } | FailureReason::PlanHalted { .. } => {
                Self::InvalidState(failure.describe())
            }
        }
    }

    /// Errors that are expected during normal operation and reported as failures.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            Self::NoAvailableWorker(_)
                | Self::InvocationTimeout { .. }
                | Self::InvocationFailed(_)
                | Self::DependencyUnavailable(_)
        )
    }
}
