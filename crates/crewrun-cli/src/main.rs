//! CrewRun CLI - Command line interface for the CrewRun coordinator.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use crewrun_core::{
    Capability, CoordinationRecord, CoordinationResult, Event, Outcome, Role, Task, TaskType,
    Topic,
};

mod client;
mod error;

use client::HttpClient;
use error::ClientError;

/// CrewRun CLI - Coordinator management tool
#[derive(Parser)]
#[command(name = "crewrun")]
#[command(about = "CLI for the CrewRun coordinator", long_about = None)]
struct Cli {
    /// Coordinator address
    #[arg(short, long, default_value = "http://127.0.0.1:8700")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check coordinator health
    Health,

    /// List workers
    #[command(name = "list-workers")]
    ListWorkers {
        /// Only idle workers of this role
        #[arg(short, long)]
        role: Option<Role>,
    },

    /// Spawn a worker
    #[command(name = "spawn-worker")]
    SpawnWorker {
        /// Worker role
        #[arg(short, long)]
        role: Role,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Capability tag (repeatable; defaults to the role's)
        #[arg(short, long = "capability")]
        capabilities: Vec<Capability>,
    },

    /// Remove a worker
    #[command(name = "remove-worker")]
    RemoveWorker {
        /// Worker ID
        id: String,
    },

    /// Return a worker in error or offline to the idle pool
    #[command(name = "recover-worker")]
    RecoverWorker {
        /// Worker ID
        id: String,
    },

    /// Send a message from one worker to another
    #[command(name = "send-message")]
    SendMessage {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        content: String,
    },

    /// Coordinate a single task
    #[command(name = "submit-task")]
    SubmitTask {
        /// Task type
        #[arg(short = 't', long = "type")]
        task_type: TaskType,

        /// Task description
        description: String,

        /// Task ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Run a phased plan from a JSON file holding a list of tasks
    #[command(name = "submit-plan")]
    SubmitPlan {
        /// Path to the plan file
        file: String,

        /// Skip every later phase once a phase fails
        #[arg(long)]
        stop_on_failure: bool,
    },

    /// Show recent coordination records
    Records {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show team status
    Status,

    /// Show the recent activity feed
    Activities {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Broadcast a message to observers
    Broadcast {
        /// Topic to publish on
        #[arg(short, long, default_value = "project_update")]
        topic: Topic,

        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let client = HttpClient::new(&cli.addr);

    match cli.command {
        Commands::Health => health(&client).await?,
        Commands::ListWorkers { role } => list_workers(&client, role).await?,
        Commands::SpawnWorker {
            role,
            name,
            capabilities,
        } => spawn_worker(&client, role, name, capabilities).await?,
        Commands::RemoveWorker { id } => {
            let worker: Value = client.delete_json(&format!("/v1/workers/{}", id)).await?;
            println!("Worker removed:");
            print_worker(&worker);
        }
        Commands::RecoverWorker { id } => {
            let worker: Value = client
                .post_json(&format!("/v1/workers/{}/recover", id), &json!({}))
                .await?;
            println!("Worker recovered:");
            print_worker(&worker);
        }
        Commands::SendMessage { from, to, content } => {
            let record: CoordinationRecord = client
                .post_json(
                    &format!("/v1/workers/{}/messages", from),
                    &json!({ "to": to, "content": content }),
                )
                .await?;
            println!("{}", record_line(&record));
        }
        Commands::SubmitTask {
            task_type,
            description,
            id,
        } => submit_task(&client, task_type, description, id).await?,
        Commands::SubmitPlan {
            file,
            stop_on_failure,
        } => submit_plan(&client, &file, stop_on_failure).await?,
        Commands::Records { limit } => records(&client, limit).await?,
        Commands::Status => status(&client).await?,
        Commands::Activities { limit } => activities(&client, limit).await?,
        Commands::Broadcast { topic, message } => {
            let reply: Value = client
                .post_json("/v1/broadcast", &json!({ "topic": topic, "message": message }))
                .await?;
            println!("Delivered to {} observer(s)", reply["delivered"]);
        }
    }

    Ok(())
}

async fn health(client: &HttpClient) -> Result<(), ClientError> {
    if client.health().await? {
        println!("Coordinator is healthy");
    } else {
        println!("Coordinator is unhealthy");
    }
    Ok(())
}

async fn list_workers(client: &HttpClient, role: Option<Role>) -> Result<(), ClientError> {
    let path = match role {
        Some(role) => format!("/v1/workers?role={}", role),
        None => "/v1/workers".to_string(),
    };
    let workers: Vec<Value> = client.get_json(&path).await?;

    println!("Workers ({}):", workers.len());
    println!(
        "{:<16}  {:<14}  {:<8}  {:<6}  {:<8}  {}",
        "ID", "ROLE", "STATUS", "TASKS", "SUCCESS", "NAME"
    );
    println!("{}", "-".repeat(80));
    for worker in &workers {
        println!(
            "{:<16}  {:<14}  {:<8}  {:<6}  {:<8}  {}",
            text(&worker["id"]),
            text(&worker["role"]),
            text(&worker["status"]),
            worker["performance"]["tasks_completed"],
            format!("{:.0}%", worker["performance"]["success_rate"].as_f64().unwrap_or(0.0)),
            text(&worker["name"]),
        );
    }
    Ok(())
}

async fn spawn_worker(
    client: &HttpClient,
    role: Role,
    name: Option<String>,
    capabilities: Vec<Capability>,
) -> Result<(), ClientError> {
    let capabilities = (!capabilities.is_empty()).then_some(capabilities);
    let worker: Value = client
        .post_json(
            "/v1/workers",
            &json!({ "role": role, "name": name, "capabilities": capabilities }),
        )
        .await?;
    println!("Worker spawned:");
    print_worker(&worker);
    Ok(())
}

async fn submit_task(
    client: &HttpClient,
    task_type: TaskType,
    description: String,
    id: Option<String>,
) -> Result<(), ClientError> {
    let mut task = Task::new(task_type, description);
    if let Some(id) = id {
        task = task.with_id(id);
    }
    let result: CoordinationResult = client.post_json("/v1/tasks", &task).await?;
    print_result(&result);
    Ok(())
}

async fn submit_plan(
    client: &HttpClient,
    file: &str,
    stop_on_failure: bool,
) -> Result<(), ClientError> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| ClientError::Input(format!("cannot read {}: {}", file, e)))?;
    let tasks: Vec<Task> =
        serde_json::from_str(&raw).map_err(|e| ClientError::Input(format!("{}: {}", file, e)))?;

    let plan: Value = client
        .post_json(
            "/v1/plans",
            &json!({ "tasks": tasks, "stop_on_failure": stop_on_failure }),
        )
        .await?;

    let results: Vec<CoordinationResult> = serde_json::from_value(plan["results"].clone())
        .map_err(|e| ClientError::Serialization(e.to_string()))?;
    for phase in plan["phases"].as_array().into_iter().flatten() {
        println!(
            "Phase {}: {} succeeded, {} failed",
            phase["phase"], phase["succeeded"], phase["failed"]
        );
    }
    for result in &results {
        print_result(result);
    }
    let success = plan["success"].as_bool().unwrap_or(false);
    println!("Plan {}", if success { "succeeded" } else { "failed" });
    Ok(())
}

async fn records(client: &HttpClient, limit: usize) -> Result<(), ClientError> {
    let records: Vec<CoordinationRecord> = client
        .get_json(&format!("/v1/records?limit={}", limit))
        .await?;
    println!("Records ({}):", records.len());
    for record in &records {
        println!("{}", record_line(record));
    }
    Ok(())
}

async fn status(client: &HttpClient) -> Result<(), ClientError> {
    let status: Value = client.get_json("/v1/status").await?;
    let workers = &status["workers"];
    let metrics = &status["metrics"];

    println!("  State:        {}", text(&status["state"]));
    println!(
        "  Workers:      {} total ({} idle, {} busy, {} error, {} offline)",
        workers["total"], workers["idle"], workers["busy"], workers["error"], workers["offline"]
    );
    println!("  Active tasks: {}", status["active_tasks"]);
    println!("  Completed:    {}", metrics["tasks_completed"]);
    println!(
        "  Success rate: {:.1}%",
        metrics["success_rate"].as_f64().unwrap_or(0.0)
    );
    println!(
        "  Efficiency:   {:.2}",
        metrics["collaboration_efficiency"].as_f64().unwrap_or(0.0)
    );
    println!("  Observers:    {}", status["observers"]);
    Ok(())
}

async fn activities(client: &HttpClient, limit: usize) -> Result<(), ClientError> {
    let events: Vec<Event> = client
        .get_json(&format!("/v1/activities?limit={}", limit))
        .await?;
    for event in &events {
        println!(
            "{}  {:<18}  {}",
            event.timestamp.format("%H:%M:%S"),
            event.topic.as_str(),
            text(&event.payload["message"])
        );
    }
    Ok(())
}

fn print_worker(worker: &Value) {
    println!("  ID:           {}", text(&worker["id"]));
    println!("  Name:         {} {}", text(&worker["emoji"]), text(&worker["name"]));
    println!("  Role:         {}", text(&worker["role"]));
    println!("  Status:       {}", text(&worker["status"]));
    if let Some(capabilities) = worker["capabilities"].as_array() {
        let tags: Vec<&str> = capabilities.iter().filter_map(Value::as_str).collect();
        println!("  Capabilities: {}", tags.join(", "));
    }
}

fn print_result(result: &CoordinationResult) {
    let worker = result
        .worker_id
        .as_ref()
        .map(|w| w.to_string())
        .unwrap_or_else(|| "-".to_string());
    match &result.outcome {
        Outcome::Succeeded { output } => println!(
            "[ok]   {} ({}) on {} in {}ms: {}",
            result.task_id, result.task_type, worker, result.latency_ms, output.summary
        ),
        Outcome::Failed { failure } => println!(
            "[fail] {} ({}) on {}: {}",
            result.task_id,
            result.task_type,
            worker,
            failure.describe()
        ),
    }
}

fn record_line(record: &CoordinationRecord) -> String {
    let subject = match (&record.task_id, &record.target_worker_id) {
        (Some(task_id), _) => format!("task {}", task_id),
        (None, Some(target)) => format!("message to {}", target),
        (None, None) => "-".to_string(),
    };
    let outcome = match &record.outcome {
        Outcome::Succeeded { .. } => "succeeded".to_string(),
        Outcome::Failed { failure } => format!("failed ({})", failure.code()),
    };
    format!(
        "{}  {:<16}  {:<40}  {:>6}ms  {}",
        record.finished_at.format("%Y-%m-%d %H:%M:%S"),
        record.worker_id,
        subject,
        record.latency_ms,
        outcome
    )
}

/// Render a JSON string without quotes.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
