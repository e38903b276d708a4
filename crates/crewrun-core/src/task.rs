//! Task and coordination result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TaskId, TaskType, WorkerId};

/// Phase assigned to tasks that do not declare one.
pub const DEFAULT_PHASE: u32 = 1;

/// Declared complexity of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
    Critical,
}

/// Declared priority of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

fn default_phase() -> u32 {
    DEFAULT_PHASE
}

/// A unit of requested work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    #[serde(default = "TaskId::generate")]
    pub id: TaskId,

    /// Declared type, used for role matching.
    pub task_type: TaskType,

    /// Free-text description of the work.
    #[serde(default)]
    pub description: String,

    /// Tasks that must have succeeded before this one runs.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    #[serde(default)]
    pub complexity: Option<Complexity>,

    #[serde(default)]
    pub priority: Option<Priority>,

    /// Tasks sharing a phase may run concurrently.
    #[serde(default = "default_phase")]
    pub phase: u32,

    /// When the task was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new Task in the default phase.
    pub fn new(task_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            task_type,
            description: description.into(),
            dependencies: Vec::new(),
            complexity: None,
            priority: None,
            phase: DEFAULT_PHASE,
            created_at: Utc::now(),
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    /// Builder method to set the phase.
    pub fn with_phase(mut self, phase: u32) -> Self {
        self.phase = phase;
        self
    }

    /// Builder method to add a dependency.
    pub fn with_dependency(mut self, task_id: impl Into<TaskId>) -> Self {
        self.dependencies.push(task_id.into());
        self
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = Some(complexity);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Structured output of a successful worker invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    /// One-line summary for activity feeds.
    pub summary: String,

    /// Worker-specific deliverable.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TaskOutput {
    pub fn new(summary: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            summary: summary.into(),
            payload,
        }
    }
}

/// Why a coordination did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// The idle pool was empty.
    NoAvailableWorker { task_type: TaskType },
    /// The worker did not answer within the invocation timeout.
    Timeout { timeout_ms: u64 },
    /// The worker returned an error (or crashed).
    InvocationFailed { message: String },
    /// A declared dependency did not succeed.
    DependencyFailed { dependency: TaskId },
    /// An earlier phase failed and the plan stops on failure.
    PlanHalted { failed_phase: u32 },
}

impl FailureReason {
    /// Short machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoAvailableWorker { .. } => "no_available_worker",
            Self::Timeout { .. } => "timeout",
            Self::InvocationFailed { .. } => "invocation_failed",
            Self::DependencyFailed { .. } => "dependency_failed",
            Self::PlanHalted { .. } => "plan_halted",
        }
    }

    /// Human-readable description.
    pub fn describe(&self) -> String {
        match self {
            Self::NoAvailableWorker { task_type } => {
                format!("no idle worker available for {} task", task_type)
            }
            Self::Timeout { timeout_ms } => format!("worker timed out after {}ms", timeout_ms),
            Self::InvocationFailed { message } => format!("worker failed: {}", message),
            Self::DependencyFailed { dependency } => {
                format!("dependency {} did not succeed", dependency)
            }
            Self::PlanHalted { failed_phase } => {
                format!("plan halted after failure in phase {}", failed_phase)
            }
        }
    }
}

/// Terminal outcome of one coordination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded { output: TaskOutput },
    Failed { failure: FailureReason },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Discriminated result returned by every coordination call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationResult {
    pub task_id: TaskId,

    pub task_type: TaskType,

    /// Worker that executed the task, if one was assigned.
    pub worker_id: Option<WorkerId>,

    pub outcome: Outcome,

    /// Measured invocation latency (zero when never dispatched).
    pub latency_ms: u64,

    pub phase: u32,

    pub finished_at: DateTime<Utc>,
}

impl CoordinationResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Failure reason, if the coordination failed.
    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.outcome {
            Outcome::Failed { failure } => Some(failure),
            Outcome::Succeeded { .. } => None,
        }
    }

    /// Output, if the coordination succeeded.
    pub fn output(&self) -> Option<&TaskOutput> {
        match &self.outcome {
            Outcome::Succeeded { output } => Some(output),
            Outcome::Failed { .. } => None,
        }
    }

    /// Build a failure result for a task that was never dispatched.
    pub fn undispatched(task: &Task, failure: FailureReason) -> Self {
        Self {
            task_id: task.id.clone(),
            task_type: task.task_type,
            worker_id: None,
            outcome: Outcome::Failed { failure },
            latency_ms: 0,
            phase: task.phase,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_deserializes_with_defaults() {
        let task: Task = serde_json::from_str(r#"{"task_type": "backend"}"#).unwrap();
        assert_eq!(task.task_type, TaskType::Backend);
        assert_eq!(task.phase, DEFAULT_PHASE);
        assert!(task.dependencies.is_empty());
        assert!(!task.id.as_str().is_empty());
    }

    #[test]
    fn test_failure_reason_wire_format() {
        let reason = FailureReason::Timeout { timeout_ms: 250 };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["reason"], "timeout");
        assert_eq!(json["timeout_ms"], 250);
        assert_eq!(reason.code(), "timeout");
    }

    #[test]
    fn test_undispatched_result_has_no_worker() {
        let task = Task::new(TaskType::General, "triage").with_phase(3);
        let result = CoordinationResult::undispatched(
            &task,
            FailureReason::NoAvailableWorker {
                task_type: TaskType::General,
            },
        );
        assert!(!result.is_success());
        assert!(result.worker_id.is_none());
        assert_eq!(result.phase, 3);
        assert_eq!(result.failure().unwrap().code(), "no_available_worker");
    }
}
