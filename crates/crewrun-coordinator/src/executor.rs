//! Worker execution boundary.
//!
//! The dispatcher treats [`WorkerExecutor::invoke`] as a black box that may be
//! slow and may fail. Two implementations ship with the coordinator:
//! [`LocalExecutor`] runs specialists in-process and [`HttpExecutor`] hands the
//! assignment to a remote worker endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crewrun_core::{Task, TaskOutput, TaskType, Worker};

/// Errors that can occur during a worker invocation.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The worker refused the task.
    #[error("task rejected: {0}")]
    Rejected(String),

    /// The worker ran and reported failure.
    #[error("{0}")]
    Failed(String),

    /// The worker could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ExecutorError {
    fn from(err: reqwest::Error) -> Self {
        ExecutorError::Transport(err.to_string())
    }
}

/// Executes an assigned task on a worker.
#[async_trait]
pub trait WorkerExecutor: Send + Sync {
    async fn invoke(&self, worker: &Worker, task: &Task) -> Result<TaskOutput, ExecutorError>;
}

/// In-process specialists.
///
/// Each task type is bound to one handler; the worker's capability tags only
/// annotate the deliverable, so fallback assignments still produce output.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    work_delay: Option<Duration>,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause for `delay` before producing output, to emulate real work.
    pub fn with_work_delay(mut self, delay: Duration) -> Self {
        self.work_delay = Some(delay);
        self
    }

    fn deliverable(task: &Task) -> (String, Value) {
        let subject = slug(&task.description);
        match task.task_type {
            TaskType::Coordination => (
                format!("Work breakdown ready for '{}'", task.description),
                json!({
                    "kind": "work_breakdown",
                    "objective": task.description,
                    "milestones": ["scope", "delegate", "integrate", "review"],
                }),
            ),
            TaskType::Architecture => (
                format!("Architecture decision drafted: {}", task.description),
                json!({
                    "kind": "architecture_decision",
                    "title": task.description,
                    "status": "proposed",
                }),
            ),
            TaskType::ApiDesign => (
                format!("API contract drafted for /{}", subject),
                json!({
                    "kind": "api_contract",
                    "resource": subject,
                    "endpoints": [
                        format!("GET /{}", subject),
                        format!("POST /{}", subject),
                        format!("GET /{}/{{id}}", subject),
                    ],
                }),
            ),
            TaskType::Backend => (
                format!("Service change implemented: {}", task.description),
                json!({ "kind": "service_change", "module": subject }),
            ),
            TaskType::Database => (
                format!("Migration prepared: {}", task.description),
                json!({ "kind": "schema_migration", "migration": format!("0001_{}", subject) }),
            ),
            TaskType::Frontend | TaskType::UiDesign => (
                format!("Component delivered: {}", task.description),
                json!({ "kind": "component", "component": pascal_case(&task.description) }),
            ),
            TaskType::Testing => (
                format!("Test plan written for {}", task.description),
                json!({
                    "kind": "test_plan",
                    "suites": ["unit", "integration", "end_to_end"],
                    "target": subject,
                }),
            ),
            TaskType::Security => (
                format!("Security review completed: {}", task.description),
                json!({
                    "kind": "security_review",
                    "checks": ["authentication", "authorization", "input_validation", "secrets"],
                }),
            ),
            TaskType::Deployment => (
                format!("Deployment staged: {}", task.description),
                json!({ "kind": "deployment", "environment": "staging", "service": subject }),
            ),
            TaskType::Documentation | TaskType::General => (
                format!("Document written: {}", task.description),
                json!({ "kind": "document", "title": task.description }),
            ),
        }
    }
}

#[async_trait]
impl WorkerExecutor for LocalExecutor {
    async fn invoke(&self, worker: &Worker, task: &Task) -> Result<TaskOutput, ExecutorError> {
        if task.description.trim().is_empty() {
            return Err(ExecutorError::Rejected(
                "task has no description".to_string(),
            ));
        }
        if let Some(delay) = self.work_delay {
            tokio::time::sleep(delay).await;
        }

        let (summary, mut payload) = Self::deliverable(task);
        payload["capability_match"] = json!(worker.has_capability(task.task_type.required_capability()));
        payload["specialist"] = json!(worker.role);
        debug!(worker_id = %worker.id, task_id = %task.id, "Local specialist produced deliverable");
        Ok(TaskOutput::new(summary, payload))
    }
}

/// Request body sent to a remote worker endpoint.
#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    worker: &'a Worker,
    task: &'a Task,
}

/// Response body expected from a remote worker endpoint.
#[derive(Debug, Deserialize)]
struct InvokeResponse {
    success: bool,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Remote workers reached over HTTP (`POST {endpoint}/invoke`).
pub struct HttpExecutor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExecutor {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl WorkerExecutor for HttpExecutor {
    async fn invoke(&self, worker: &Worker, task: &Task) -> Result<TaskOutput, ExecutorError> {
        let url = format!("{}/invoke", self.endpoint);
        debug!(url = %url, worker_id = %worker.id, task_id = %task.id, "Invoking remote worker");

        let response = self
            .client
            .post(&url)
            .json(&InvokeRequest { worker, task })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ExecutorError::Transport(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let body: InvokeResponse = response.json().await?;
        if body.success {
            Ok(TaskOutput::new(
                body.summary
                    .unwrap_or_else(|| format!("{} task completed", task.task_type)),
                body.payload,
            ))
        } else {
            Err(ExecutorError::Failed(
                body.error.unwrap_or_else(|| "worker reported failure".to_string()),
            ))
        }
    }
}

/// Lowercase, dash-separated form of free text.
fn slug(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn pascal_case(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewrun_core::Role;

    #[test]
    fn test_slug_and_pascal_case() {
        assert_eq!(slug("User Profiles (v2)"), "user-profiles-v2");
        assert_eq!(pascal_case("login form"), "LoginForm");
    }

    #[tokio::test]
    async fn test_local_executor_dispatches_on_task_type() {
        let executor = LocalExecutor::new();
        let worker = Worker::new(Role::Backend, Role::Backend.default_capabilities(), 1);

        let task = Task::new(TaskType::ApiDesign, "orders");
        let output = executor.invoke(&worker, &task).await.unwrap();
        assert_eq!(output.payload["kind"], "api_contract");
        assert_eq!(output.payload["capability_match"], true);

        let task = Task::new(TaskType::Frontend, "checkout page");
        let output = executor.invoke(&worker, &task).await.unwrap();
        assert_eq!(output.payload["component"], "CheckoutPage");
        assert_eq!(output.payload["capability_match"], false);
    }

    #[tokio::test]
    async fn test_local_executor_rejects_empty_description() {
        let executor = LocalExecutor::new();
        let worker = Worker::new(Role::Testing, vec![], 1);
        let task = Task::new(TaskType::Testing, "   ");
        assert!(matches!(
            executor.invoke(&worker, &task).await,
            Err(ExecutorError::Rejected(_))
        ));
    }
}
