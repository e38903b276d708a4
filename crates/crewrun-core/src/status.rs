//! Status enums for Tasks and Workers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a Task inside the coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task submitted but not yet assigned to a worker.
    #[default]
    Pending,
    /// Task claimed by a worker and executing.
    Assigned,
    /// Task completed successfully.
    Succeeded,
    /// Task failed (no worker, timeout, worker error, failed dependency).
    Failed,
}

impl TaskStatus {
    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Status of a Worker in the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Worker is idle and ready to accept a task.
    #[default]
    Idle,
    /// Worker is executing a task.
    Busy,
    /// Last invocation failed or timed out.
    Error,
    /// Worker is unreachable and must not be assigned.
    Offline,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Error => "error",
            Self::Offline => "offline",
        }
    }

    /// Returns true if the worker can be assigned a new task.
    pub fn can_accept_tasks(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}
