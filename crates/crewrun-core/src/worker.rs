//! Worker state and performance tracking.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Capability, CoreError, Role, TaskId, WorkerId, WorkerStatus};

/// Lower bound of the specialty score.
pub const SPECIALTY_MIN: f64 = 0.0;
/// Upper bound of the specialty score.
pub const SPECIALTY_MAX: f64 = 100.0;
/// Specialty score of a freshly spawned worker.
pub const SPECIALTY_INITIAL: f64 = 50.0;

const SPECIALTY_GAIN_MATCHED: f64 = 5.0;
const SPECIALTY_GAIN_UNMATCHED: f64 = 1.0;
const SPECIALTY_LOSS: f64 = 5.0;

/// Rolling performance record of one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// Tasks that reached a terminal state on this worker.
    pub tasks_completed: u64,

    /// Tasks that succeeded.
    pub successes: u64,

    /// Lifetime success rate in percent (0..=100).
    pub success_rate: f64,

    /// Simple running average of invocation latency.
    pub avg_latency_ms: f64,

    /// Bounded affinity score (0..=100) that grows with in-role successes.
    pub specialty_score: f64,
}

impl Default for PerformanceRecord {
    fn default() -> Self {
        Self {
            tasks_completed: 0,
            successes: 0,
            success_rate: 0.0,
            avg_latency_ms: 0.0,
            specialty_score: SPECIALTY_INITIAL,
        }
    }
}

impl PerformanceRecord {
    /// Fold one finished task into the record.
    ///
    /// `role_matched` is true when the worker's role was in the task type's
    /// preferred list.
    pub fn record(&mut self, success: bool, latency_ms: u64, role_matched: bool) {
        self.tasks_completed += 1;
        if success {
            self.successes += 1;
        }
        self.success_rate = self.successes as f64 * 100.0 / self.tasks_completed as f64;

        let n = self.tasks_completed as f64;
        self.avg_latency_ms += (latency_ms as f64 - self.avg_latency_ms) / n;

        let delta = match (success, role_matched) {
            (true, true) => SPECIALTY_GAIN_MATCHED,
            (true, false) => SPECIALTY_GAIN_UNMATCHED,
            (false, _) => -SPECIALTY_LOSS,
        };
        self.specialty_score = (self.specialty_score + delta).clamp(SPECIALTY_MIN, SPECIALTY_MAX);
    }
}

/// A worker agent known to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    /// Unique worker identifier.
    pub id: WorkerId,

    /// Display name.
    pub name: String,

    /// Declared role.
    pub role: Role,

    /// Advertised capability tags.
    pub capabilities: Vec<Capability>,

    /// Current status.
    pub status: WorkerStatus,

    /// Tasks currently assigned. Non-empty exactly when `status` is `Busy`.
    pub current_tasks: BTreeSet<TaskId>,

    /// Invocation still running on this worker. Survives `set_offline`, and
    /// blocks `recover` until the invocation reports back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_flight: Option<TaskId>,

    /// Rolling performance record.
    pub performance: PerformanceRecord,

    /// Workers this one has exchanged messages with.
    pub collaborators: BTreeSet<WorkerId>,

    /// Registration order, used as the final scoring tie-break.
    pub seq: u64,

    pub created_at: DateTime<Utc>,

    pub last_active_at: Option<DateTime<Utc>>,
}

impl Worker {
    /// Create a new idle worker.
    pub fn new(role: Role, capabilities: Vec<Capability>, seq: u64) -> Self {
        let id = WorkerId::new(format!("{}-{}", role.as_str(), seq));
        Self {
            name: format!("{} #{}", role.display_name(), seq),
            id,
            role,
            capabilities,
            status: WorkerStatus::Idle,
            current_tasks: BTreeSet::new(),
            in_flight: None,
            performance: PerformanceRecord::default(),
            collaborators: BTreeSet::new(),
            seq,
            created_at: Utc::now(),
            last_active_at: None,
        }
    }

    /// Builder method to set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Check if this worker advertises a capability.
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Number of tasks currently assigned.
    pub fn load(&self) -> usize {
        self.current_tasks.len()
    }

    /// Status and task set agree.
    pub fn is_consistent(&self) -> bool {
        (self.status == WorkerStatus::Busy) == !self.current_tasks.is_empty()
    }

    /// `idle -> busy`. Any other starting state is a double assignment.
    pub fn assign(&mut self, task_id: TaskId) -> Result<(), CoreError> {
        if self.status != WorkerStatus::Idle || self.in_flight.is_some() {
            return Err(self.transition_error(WorkerStatus::Busy));
        }
        self.in_flight = Some(task_id.clone());
        self.current_tasks.insert(task_id);
        self.status = WorkerStatus::Busy;
        self.last_active_at = Some(Utc::now());
        Ok(())
    }

    /// `busy -> idle` once `task_id` has finished.
    pub fn mark_idle(&mut self, task_id: &TaskId) -> Result<(), CoreError> {
        self.finish(task_id, WorkerStatus::Idle)
    }

    /// `busy -> error` once `task_id` has failed.
    pub fn mark_error(&mut self, task_id: &TaskId) -> Result<(), CoreError> {
        self.finish(task_id, WorkerStatus::Error)
    }

    /// `error | offline -> idle`. Rejected while an invocation is outstanding.
    pub fn recover(&mut self) -> Result<(), CoreError> {
        match self.status {
            WorkerStatus::Error | WorkerStatus::Offline if self.in_flight.is_none() => {
                self.current_tasks.clear();
                self.status = WorkerStatus::Idle;
                Ok(())
            }
            _ => Err(self.transition_error(WorkerStatus::Idle)),
        }
    }

    /// Any state -> offline. Assignments are dropped; a running invocation
    /// stays in flight until it reports back.
    pub fn set_offline(&mut self) {
        self.current_tasks.clear();
        self.status = WorkerStatus::Offline;
    }

    /// Release `task_id`. The in-flight slot is freed even when the status
    /// transition is rejected, e.g. for a worker taken offline meanwhile.
    fn finish(&mut self, task_id: &TaskId, to: WorkerStatus) -> Result<(), CoreError> {
        if self.in_flight.as_ref() == Some(task_id) {
            self.in_flight = None;
        }
        if self.status != WorkerStatus::Busy || !self.current_tasks.remove(task_id) {
            return Err(self.transition_error(to));
        }
        if self.current_tasks.is_empty() {
            self.status = to;
        }
        Ok(())
    }

    fn transition_error(&self, to: WorkerStatus) -> CoreError {
        CoreError::InvalidStateTransition {
            subject: format!("worker {}", self.id),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}
