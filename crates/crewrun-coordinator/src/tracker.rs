//! Metrics tracker - the append-only coordination log and its aggregates.

use std::collections::VecDeque;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crewrun_core::{CoordinationRecord, RecordKind};

use crate::error::CoordinatorError;

/// Parameters of the collaboration efficiency metric.
#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencyConfig {
    /// Number of most recent task records considered.
    pub window: usize,

    /// Average latency above which `slow_penalty` applies.
    pub slow_threshold_ms: u64,
    pub slow_penalty: f64,

    /// Average latency above which `severe_penalty` applies instead.
    pub severe_threshold_ms: u64,
    pub severe_penalty: f64,
}

impl Default for EfficiencyConfig {
    fn default() -> Self {
        Self {
            window: 10,
            slow_threshold_ms: 5_000,
            slow_penalty: 0.9,
            severe_threshold_ms: 15_000,
            severe_penalty: 0.7,
        }
    }
}

impl EfficiencyConfig {
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.window == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "efficiency window must be non-zero".to_string(),
            ));
        }
        if self.severe_threshold_ms < self.slow_threshold_ms {
            return Err(CoordinatorError::InvalidConfig(
                "severe latency threshold must not be below the slow threshold".to_string(),
            ));
        }
        for penalty in [self.slow_penalty, self.severe_penalty] {
            if !(0.0..=1.0).contains(&penalty) {
                return Err(CoordinatorError::InvalidConfig(format!(
                    "latency penalty {} must be within 0..=1",
                    penalty
                )));
            }
        }
        Ok(())
    }

    /// Penalty factor for an average latency.
    fn penalty(&self, avg_latency_ms: f64) -> f64 {
        if avg_latency_ms > self.severe_threshold_ms as f64 {
            self.severe_penalty
        } else if avg_latency_ms > self.slow_threshold_ms as f64 {
            self.slow_penalty
        } else {
            1.0
        }
    }
}

/// Lifetime aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateMetrics {
    pub tasks_completed: u64,
    pub successful: u64,
    pub total_elapsed_ms: u64,
    pub workers_spawned: u64,
    pub messages_sent: u64,
    pub messages_failed: u64,
}

impl AggregateMetrics {
    /// Lifetime success rate in percent.
    pub fn success_rate(&self) -> f64 {
        if self.tasks_completed == 0 {
            return 0.0;
        }
        self.successful as f64 / self.tasks_completed as f64 * 100.0
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.tasks_completed == 0 {
            return 0.0;
        }
        self.total_elapsed_ms as f64 / self.tasks_completed as f64
    }
}

/// Aggregates plus the derived efficiency, as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    #[serde(flatten)]
    pub totals: AggregateMetrics,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub collaboration_efficiency: f64,
}

#[derive(Default)]
struct TrackerInner {
    /// Every record since startup. Never trimmed; the totals and
    /// `records(limit)` are answered from it, so memory grows with traffic.
    log: Vec<CoordinationRecord>,
    /// Latest task records, newest last, at most `window` long.
    recent: VecDeque<(bool, u64)>,
    totals: AggregateMetrics,
}

/// Append-only coordination log with rolling aggregates.
///
/// The log lives for the process lifetime and is not persisted.
pub struct MetricsTracker {
    config: EfficiencyConfig,
    inner: RwLock<TrackerInner>,
}

impl MetricsTracker {
    pub fn new(config: EfficiencyConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(TrackerInner::default()),
        }
    }

    /// Append a record and fold it into the aggregates.
    ///
    /// Message records are logged but do not touch task metrics.
    pub async fn record(&self, record: CoordinationRecord) {
        let mut inner = self.inner.write().await;
        match record.kind {
            RecordKind::Task => {
                let success = record.is_success();
                inner.totals.tasks_completed += 1;
                if success {
                    inner.totals.successful += 1;
                }
                inner.totals.total_elapsed_ms += record.latency_ms;
                inner.recent.push_back((success, record.latency_ms));
                while inner.recent.len() > self.config.window {
                    inner.recent.pop_front();
                }
            }
            RecordKind::Message => {
                inner.totals.messages_sent += 1;
                if !record.is_success() {
                    inner.totals.messages_failed += 1;
                }
            }
        }
        debug!(record_id = %record.id, kind = ?record.kind, "Coordination record appended");
        inner.log.push(record);
    }

    pub async fn worker_spawned(&self) {
        self.inner.write().await.totals.workers_spawned += 1;
    }

    /// Success ratio of the recent window, discounted for slowness.
    pub async fn collaboration_efficiency(&self) -> f64 {
        let inner = self.inner.read().await;
        self.efficiency_of(&inner.recent)
    }

    fn efficiency_of(&self, recent: &VecDeque<(bool, u64)>) -> f64 {
        if recent.is_empty() {
            return 1.0;
        }
        let n = recent.len() as f64;
        let successes = recent.iter().filter(|(ok, _)| *ok).count() as f64;
        let avg_latency = recent.iter().map(|(_, ms)| *ms as f64).sum::<f64>() / n;
        successes / n * self.config.penalty(avg_latency)
    }

    pub async fn totals(&self) -> AggregateMetrics {
        self.inner.read().await.totals.clone()
    }

    pub async fn summary(&self) -> MetricsSummary {
        let inner = self.inner.read().await;
        MetricsSummary {
            success_rate: inner.totals.success_rate(),
            avg_latency_ms: inner.totals.avg_latency_ms(),
            collaboration_efficiency: self.efficiency_of(&inner.recent),
            totals: inner.totals.clone(),
        }
    }

    /// The most recent `limit` records, in arrival order.
    pub async fn records(&self, limit: usize) -> Vec<CoordinationRecord> {
        let inner = self.inner.read().await;
        let start = inner.log.len().saturating_sub(limit);
        inner.log[start..].to_vec()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.log.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
