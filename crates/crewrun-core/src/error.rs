//! Core domain errors.

use thiserror::Error;

/// Core domain errors for CrewRun.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Worker not found.
    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Invalid state transition.
    #[error("Invalid state transition for {subject}: {from} -> {to}")]
    InvalidStateTransition {
        subject: String,
        from: String,
        to: String,
    },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Returns true for errors caused by an unknown identifier.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::WorkerNotFound(_) | Self::TaskNotFound(_))
    }
}
