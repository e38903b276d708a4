//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::Arc;

use crewrun_core::WorkerStatus;

use crate::state::AppState;

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &Arc<AppState>) -> String {
    let mut output = String::new();

    collect_worker_metrics(state, &mut output).await;
    collect_coordination_metrics(state, &mut output).await;
    collect_cache_metrics(state, &mut output).await;

    output
}

/// Collect worker metrics by status.
async fn collect_worker_metrics(state: &Arc<AppState>, output: &mut String) {
    let counts = state.registry.status_counts().await;

    writeln!(
        output,
        "# HELP crewrun_workers Number of registered workers by status"
    )
    .ok();
    writeln!(output, "# TYPE crewrun_workers gauge").ok();
    for status in [
        WorkerStatus::Idle,
        WorkerStatus::Busy,
        WorkerStatus::Error,
        WorkerStatus::Offline,
    ] {
        let count = counts.get(&status).copied().unwrap_or(0);
        writeln!(output, "crewrun_workers{{status=\"{status}\"}} {count}").ok();
    }
}

/// Collect coordination counters from the tracker.
async fn collect_coordination_metrics(state: &Arc<AppState>, output: &mut String) {
    let summary = state.tracker.summary().await;
    let totals = &summary.totals;
    let failed = totals.tasks_completed - totals.successful;

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP crewrun_tasks_total Dispatched tasks by outcome"
    )
    .ok();
    writeln!(output, "# TYPE crewrun_tasks_total counter").ok();
    writeln!(
        output,
        "crewrun_tasks_total{{outcome=\"succeeded\"}} {}",
        totals.successful
    )
    .ok();
    writeln!(output, "crewrun_tasks_total{{outcome=\"failed\"}} {failed}").ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP crewrun_task_latency_ms_sum Total invocation latency in milliseconds"
    )
    .ok();
    writeln!(output, "# TYPE crewrun_task_latency_ms_sum counter").ok();
    writeln!(
        output,
        "crewrun_task_latency_ms_sum {}",
        totals.total_elapsed_ms
    )
    .ok();

    writeln!(output).ok();
    writeln!(output, "# HELP crewrun_messages_total Worker messages sent").ok();
    writeln!(output, "# TYPE crewrun_messages_total counter").ok();
    writeln!(output, "crewrun_messages_total {}", totals.messages_sent).ok();

    writeln!(output).ok();
    writeln!(output, "# HELP crewrun_workers_spawned_total Workers spawned").ok();
    writeln!(output, "# TYPE crewrun_workers_spawned_total counter").ok();
    writeln!(
        output,
        "crewrun_workers_spawned_total {}",
        totals.workers_spawned
    )
    .ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP crewrun_collaboration_efficiency Success ratio of recent tasks with latency penalty"
    )
    .ok();
    writeln!(output, "# TYPE crewrun_collaboration_efficiency gauge").ok();
    writeln!(
        output,
        "crewrun_collaboration_efficiency {:.4}",
        summary.collaboration_efficiency
    )
    .ok();

    writeln!(output).ok();
    writeln!(output, "# HELP crewrun_tasks_active Tasks pending or assigned").ok();
    writeln!(output, "# TYPE crewrun_tasks_active gauge").ok();
    writeln!(
        output,
        "crewrun_tasks_active {}",
        state.active_task_count().await
    )
    .ok();
}

/// Collect aggregate cache statistics.
async fn collect_cache_metrics(state: &Arc<AppState>, output: &mut String) {
    let stats = state.cache.stats().await;

    writeln!(output).ok();
    writeln!(output, "# HELP crewrun_cache_requests_total Cache lookups by result").ok();
    writeln!(output, "# TYPE crewrun_cache_requests_total counter").ok();
    writeln!(
        output,
        "crewrun_cache_requests_total{{result=\"hit\"}} {}",
        stats.hits
    )
    .ok();
    writeln!(
        output,
        "crewrun_cache_requests_total{{result=\"miss\"}} {}",
        stats.misses
    )
    .ok();
    writeln!(output, "# HELP crewrun_cache_evictions_total Evicted cache entries").ok();
    writeln!(output, "# TYPE crewrun_cache_evictions_total counter").ok();
    writeln!(output, "crewrun_cache_evictions_total {}", stats.evictions).ok();
    writeln!(output, "# HELP crewrun_cache_entries Live cache entries").ok();
    writeln!(output, "# TYPE crewrun_cache_entries gauge").ok();
    writeln!(output, "crewrun_cache_entries {}", stats.entries).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn test_collect_metrics_empty_state() {
        let state = AppState::new(Config::default());
        let output = collect_metrics(&state).await;

        assert!(output.contains("crewrun_workers{status=\"idle\"} 0"));
        assert!(output.contains("crewrun_workers{status=\"offline\"} 0"));
        assert!(output.contains("crewrun_tasks_total{outcome=\"failed\"} 0"));
        assert!(output.contains("crewrun_collaboration_efficiency 1.0000"));
        assert!(output.contains("crewrun_cache_entries 0"));
    }
}
