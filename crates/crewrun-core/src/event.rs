//! Events fanned out to observers.
//!
//! Every event travels as a JSON envelope `{id, type, topic, level, payload,
//! timestamp}`. Observers filter on `topic`; `level` tags failures so a
//! dashboard can never miss that a task went wrong.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    CoordinationRecord, CoordinationResult, CoreError, EventId, Outcome, Task, Worker,
    WorkerStatus,
};

/// Topic an event is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Task lifecycle and worker-to-worker messages.
    Activity,
    /// Worker spawned, removed or changed status.
    SpecialistUpdate,
    /// Phases, plans and aggregate metrics.
    ProjectUpdate,
    /// Wildcard, only meaningful in a subscription.
    All,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Activity => "activity",
            Topic::SpecialistUpdate => "specialist_update",
            Topic::ProjectUpdate => "project_update",
            Topic::All => "all",
        }
    }

    /// Whether a subscription set accepts events on `self`.
    pub fn accepted_by(&self, subscription: &HashSet<Topic>) -> bool {
        subscription.contains(&Topic::All) || subscription.contains(self)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "activity" => Ok(Topic::Activity),
            "specialist_update" => Ok(Topic::SpecialistUpdate),
            "project_update" => Ok(Topic::ProjectUpdate),
            "all" => Ok(Topic::All),
            other => Err(CoreError::InvalidInput(format!("unknown topic '{}'", other))),
        }
    }
}

/// Type of event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskAssigned,
    TaskCompleted,
    TaskFailed,
    WorkerSpawned,
    WorkerRemoved,
    WorkerStatusChanged,
    WorkerMessage,
    PhaseStarted,
    PhaseCompleted,
    PlanCompleted,
    Broadcast,
}

/// Severity tag of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Success,
    Error,
}

/// Envelope delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub topic: Topic,
    pub level: EventLevel,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

fn worker_payload(worker: &Worker) -> Value {
    json!({
        "worker_id": worker.id,
        "specialist": worker.role,
        "specialist_name": worker.role.display_name(),
        "emoji": worker.role.emoji(),
        "name": worker.name,
        "status": worker.status,
    })
}

impl Event {
    /// Create a new event stamped with the current time.
    pub fn new(kind: EventKind, topic: Topic, level: EventLevel, payload: Value) -> Self {
        Self {
            id: EventId::generate(),
            kind,
            topic,
            level,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == EventLevel::Error
    }

    /// A task was claimed by a worker.
    pub fn task_assigned(task: &Task, worker: &Worker) -> Self {
        let mut payload = worker_payload(worker);
        payload["task_id"] = json!(task.id);
        payload["task_type"] = json!(task.task_type);
        payload["phase"] = json!(task.phase);
        payload["message"] = json!(format!(
            "{} picked up {} task: {}",
            worker.name, task.task_type, task.description
        ));
        Self::new(EventKind::TaskAssigned, Topic::Activity, EventLevel::Info, payload)
    }

    /// A task reached a terminal state. Failures are error-tagged.
    pub fn task_finished(result: &CoordinationResult) -> Self {
        let mut payload = json!({
            "task_id": result.task_id,
            "task_type": result.task_type,
            "worker_id": result.worker_id,
            "latency_ms": result.latency_ms,
            "phase": result.phase,
        });
        match &result.outcome {
            Outcome::Succeeded { output } => {
                payload["message"] = json!(output.summary);
                Self::new(
                    EventKind::TaskCompleted,
                    Topic::Activity,
                    EventLevel::Success,
                    payload,
                )
            }
            Outcome::Failed { failure } => {
                payload["message"] = json!(failure.describe());
                payload["error"] = json!(failure.code());
                Self::new(EventKind::TaskFailed, Topic::Activity, EventLevel::Error, payload)
            }
        }
    }

    pub fn worker_spawned(worker: &Worker) -> Self {
        let mut payload = worker_payload(worker);
        payload["capabilities"] = json!(worker.capabilities);
        payload["message"] = json!(format!("{} joined the team", worker.name));
        Self::new(
            EventKind::WorkerSpawned,
            Topic::SpecialistUpdate,
            EventLevel::Info,
            payload,
        )
    }

    /// A worker was removed; `collaborators` are the workers that worked with it.
    pub fn worker_removed(worker: &Worker) -> Self {
        let mut payload = worker_payload(worker);
        payload["collaborators"] = json!(worker.collaborators);
        payload["message"] = json!(format!("{} left the team", worker.name));
        Self::new(
            EventKind::WorkerRemoved,
            Topic::SpecialistUpdate,
            EventLevel::Info,
            payload,
        )
    }

    pub fn worker_status_changed(worker: &Worker) -> Self {
        let mut payload = worker_payload(worker);
        payload["performance"] = json!(worker.performance);
        let level = if worker.status == WorkerStatus::Error {
            EventLevel::Error
        } else {
            EventLevel::Info
        };
        Self::new(
            EventKind::WorkerStatusChanged,
            Topic::SpecialistUpdate,
            level,
            payload,
        )
    }

    pub fn worker_message(record: &CoordinationRecord) -> Self {
        let content = record
            .message_output()
            .map(|o| o.summary.clone())
            .unwrap_or_default();
        let level = if record.is_success() {
            EventLevel::Info
        } else {
            EventLevel::Error
        };
        Self::new(
            EventKind::WorkerMessage,
            Topic::Activity,
            level,
            json!({
                "from": record.worker_id,
                "to": record.target_worker_id,
                "message": content,
                "delivered": record.is_success(),
            }),
        )
    }

    pub fn phase_started(phase: u32, task_count: usize) -> Self {
        Self::new(
            EventKind::PhaseStarted,
            Topic::ProjectUpdate,
            EventLevel::Info,
            json!({ "phase": phase, "tasks": task_count }),
        )
    }

    pub fn phase_completed(phase: u32, succeeded: usize, failed: usize) -> Self {
        let level = if failed == 0 {
            EventLevel::Success
        } else {
            EventLevel::Error
        };
        Self::new(
            EventKind::PhaseCompleted,
            Topic::ProjectUpdate,
            level,
            json!({ "phase": phase, "succeeded": succeeded, "failed": failed }),
        )
    }

    pub fn plan_completed(success: bool, total: usize, failed: usize) -> Self {
        let level = if success {
            EventLevel::Success
        } else {
            EventLevel::Error
        };
        Self::new(
            EventKind::PlanCompleted,
            Topic::ProjectUpdate,
            level,
            json!({ "success": success, "tasks": total, "failed": failed }),
        )
    }

    /// Arbitrary operator message.
    pub fn broadcast(topic: Topic, message: impl Into<String>) -> Self {
        Self::new(
            EventKind::Broadcast,
            topic,
            EventLevel::Info,
            json!({ "message": message.into() }),
        )
    }
}
