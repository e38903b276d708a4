//! CrewRun Coordinator Library
//!
//! This crate provides the coordinator for a team of specialist workers:
//! the worker registry, scoring and dispatch, the coordination log, event
//! fan-out, the aggregate view cache and the HTTP/WebSocket surface.

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod http;
pub mod memory;
pub mod metrics;
pub mod registry;
pub mod scoring;
pub mod state;
pub mod tracker;
pub mod views;

pub use broadcast::Broadcaster;
pub use cache::{AggregateCache, CacheConfig, CacheStats};
pub use config::Config;
pub use dispatcher::{Dispatcher, PhaseSummary, PlanOptions, PlanResult};
pub use error::CoordinatorError;
pub use executor::{ExecutorError, HttpExecutor, LocalExecutor, WorkerExecutor};
pub use memory::{InMemoryStore, MemoryError, MemoryService, WorkerContext};
pub use registry::WorkerRegistry;
pub use scoring::{Score, ScoredWorker, ScoringWeights};
pub use state::AppState;
pub use tracker::{AggregateMetrics, EfficiencyConfig, MetricsSummary, MetricsTracker};
