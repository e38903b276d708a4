//! Memory service boundary.
//!
//! The long-term knowledge store is external and optional. When it cannot be
//! reached the coordinator keeps working in session-only mode: contexts are
//! treated as empty and the scoring context bonus is zero.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use crewrun_core::{TaskType, WorkerId};

use crate::error::CoordinatorError;

/// Key prefix under which task-type experience counters are stored.
pub const EXPERIENCE_PREFIX: &str = "experience:";

/// Memory service errors.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory service unavailable: {0}")]
    Unavailable(String),
}

impl From<MemoryError> for CoordinatorError {
    fn from(err: MemoryError) -> Self {
        CoordinatorError::DependencyUnavailable(err.to_string())
    }
}

/// Context loaded for a worker before scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerContext {
    /// Completed tasks per task type.
    pub experience: BTreeMap<TaskType, u32>,

    /// Free-form notes stored under other keys.
    pub notes: BTreeMap<String, Value>,
}

impl WorkerContext {
    pub fn has_experience_with(&self, task_type: TaskType) -> bool {
        self.experience.get(&task_type).copied().unwrap_or(0) > 0
    }

    pub fn record_experience(&mut self, task_type: TaskType) -> u32 {
        let count = self.experience.entry(task_type).or_insert(0);
        *count += 1;
        *count
    }

    /// Apply a stored key/value pair.
    fn apply(&mut self, key: &str, value: Value) {
        let experience = key
            .strip_prefix(EXPERIENCE_PREFIX)
            .and_then(|t| t.parse::<TaskType>().ok());
        match (experience, value.as_u64()) {
            (Some(task_type), Some(count)) => {
                self.experience
                    .insert(task_type, u32::try_from(count).unwrap_or(u32::MAX));
            }
            _ => {
                self.notes.insert(key.to_string(), value);
            }
        }
    }
}

/// External memory/knowledge service.
#[async_trait]
pub trait MemoryService: Send + Sync {
    /// Load everything known about a worker.
    async fn load(&self, worker_id: &WorkerId) -> Result<WorkerContext, MemoryError>;

    /// Store one key/value pair for a worker.
    async fn store(&self, worker_id: &WorkerId, key: &str, value: Value)
        -> Result<(), MemoryError>;
}

/// Session-only memory kept in process.
#[derive(Default)]
pub struct InMemoryStore {
    contexts: RwLock<HashMap<WorkerId, WorkerContext>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryService for InMemoryStore {
    async fn load(&self, worker_id: &WorkerId) -> Result<WorkerContext, MemoryError> {
        Ok(self
            .contexts
            .read()
            .await
            .get(worker_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn store(
        &self,
        worker_id: &WorkerId,
        key: &str,
        value: Value,
    ) -> Result<(), MemoryError> {
        self.contexts
            .write()
            .await
            .entry(worker_id.clone())
            .or_default()
            .apply(key, value);
        Ok(())
    }
}

/// Key for the experience counter of a task type.
pub fn experience_key(task_type: TaskType) -> String {
    format!("{}{}", EXPERIENCE_PREFIX, task_type.as_str())
}
