//! Coordinator configuration.

use std::time::Duration;

use crate::cache::CacheConfig;
use crate::error::CoordinatorError;
use crate::scoring::ScoringWeights;
use crate::tracker::EfficiencyConfig;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP/WebSocket server bind address.
    pub http_bind_addr: String,

    /// Upper bound on a single worker invocation.
    pub invocation_timeout: Duration,

    /// Per-observer outbound queue length.
    pub observer_buffer: usize,

    /// Number of recent events kept for the activity feed.
    pub activity_history: usize,

    /// Remote worker endpoint. When unset, workers run in-process.
    pub worker_endpoint: Option<String>,

    pub scoring: ScoringWeights,

    pub efficiency: EfficiencyConfig,

    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_bind_addr: "127.0.0.1:8700".to_string(),
            invocation_timeout: Duration::from_secs(30),
            observer_buffer: 256,
            activity_history: 100,
            worker_endpoint: None,
            scoring: ScoringWeights::default(),
            efficiency: EfficiencyConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Reject configurations the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.invocation_timeout.is_zero() {
            return Err(CoordinatorError::InvalidConfig(
                "invocation timeout must be non-zero".to_string(),
            ));
        }
        if self.observer_buffer == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "observer buffer must be non-zero".to_string(),
            ));
        }
        self.scoring.validate()?;
        self.efficiency.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}
