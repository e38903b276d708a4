//! CrewRun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/transport
//! - Persistence
//! - Runtime specifics
//!
//! All types here represent the core business domain of CrewRun: specialist
//! workers, the tasks they are assigned, and the records and events that
//! coordination produces.

pub mod error;
pub mod event;
pub mod ids;
pub mod protocol;
pub mod record;
pub mod role;
pub mod status;
pub mod task;
pub mod worker;

// Re-export commonly used types
pub use error::CoreError;
pub use event::{Event, EventKind, EventLevel, Topic};
pub use ids::{EventId, ObserverId, RecordId, TaskId, WorkerId};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use record::{CoordinationRecord, RecordKind};
pub use role::{Capability, Role, TaskType};
pub use status::{TaskStatus, WorkerStatus};
pub use task::{
    Complexity, CoordinationResult, FailureReason, Outcome, Priority, Task, TaskOutput,
};
pub use worker::{PerformanceRecord, Worker};
