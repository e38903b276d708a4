//! Append-only coordination log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoordinationResult, Outcome, RecordId, TaskId, TaskOutput, TaskType, WorkerId};

/// What a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Outcome of a dispatched task.
    Task,
    /// Fire-and-forget notification between two workers.
    Message,
}

/// Immutable entry of the coordination log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationRecord {
    pub id: RecordId,
    pub kind: RecordKind,

    /// Task this record belongs to (task records only).
    pub task_id: Option<TaskId>,
    pub task_type: Option<TaskType>,

    /// Executing worker, or the sender of a message.
    pub worker_id: WorkerId,

    /// Receiver of a message.
    pub target_worker_id: Option<WorkerId>,

    pub outcome: Outcome,
    pub latency_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CoordinationRecord {
    /// Record the outcome of a dispatched task.
    pub fn for_task(
        result: &CoordinationResult,
        worker_id: WorkerId,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::generate(),
            kind: RecordKind::Task,
            task_id: Some(result.task_id.clone()),
            task_type: Some(result.task_type),
            worker_id,
            target_worker_id: None,
            outcome: result.outcome.clone(),
            latency_ms: result.latency_ms,
            started_at,
            finished_at: result.finished_at,
        }
    }

    /// Record a message between two workers.
    pub fn for_message(
        from: WorkerId,
        to: WorkerId,
        outcome: Outcome,
        started_at: DateTime<Utc>,
    ) -> Self {
        let finished_at = Utc::now();
        let latency_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            id: RecordId::generate(),
            kind: RecordKind::Message,
            task_id: None,
            task_type: None,
            worker_id: from,
            target_worker_id: Some(to),
            outcome,
            latency_ms,
            started_at,
            finished_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn is_task(&self) -> bool {
        self.kind == RecordKind::Task
    }

    /// Delivered message content, for message records.
    pub fn message_output(&self) -> Option<&TaskOutput> {
        match (&self.kind, &self.outcome) {
            (RecordKind::Message, Outcome::Succeeded { output }) => Some(output),
            _ => None,
        }
    }
}
