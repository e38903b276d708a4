//! TTL cache for expensive aggregate views.
//!
//! Keys are `<aggregation>[:<param>]` strings so that a state change can
//! evict a whole family with [`AggregateCache::invalidate`]. An entry is
//! never served after its expiry: [`AggregateCache::get`] deletes it lazily
//! and the background sweeper removes whatever was never read again.
//!
//! Every invalidated prefix carries a generation counter. A view computed
//! while one of its prefixes was invalidated is not stored, see
//! [`AggregateCache::set_if_generation`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::CoordinatorError;

/// Registry snapshot view.
pub const KEY_WORKERS_SNAPSHOT: &str = "workers:snapshot";
/// Prefix of every registry-derived view.
pub const PREFIX_WORKERS: &str = "workers:";
/// Coordination status view.
pub const KEY_STATUS: &str = "status:coordination";
/// Prefix of every status view.
pub const PREFIX_STATUS: &str = "status:";
/// Metrics summary view.
pub const KEY_METRICS_SUMMARY: &str = "metrics:summary";
/// Prefix of every metrics view.
pub const PREFIX_METRICS: &str = "metrics:";

/// Key of the per-role idle worker view.
pub fn workers_by_role_key(role: &str) -> String {
    format!("{}role:{}", PREFIX_WORKERS, role)
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Time to live of aggregate views.
    pub view_ttl: Duration,

    /// How often the sweeper drops expired entries.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            view_ttl: Duration::from_secs(2),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.view_ttl.is_zero() {
            return Err(CoordinatorError::InvalidConfig(
                "cache view TTL must be non-zero".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(CoordinatorError::InvalidConfig(
                "cache sweep interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Invalidation count per prefix.
    generations: HashMap<String, u64>,
}

impl CacheInner {
    fn generation(&self, key: &str) -> u64 {
        self.generations
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix.as_str()))
            .map(|(_, generation)| *generation)
            .sum()
    }
}

/// Keyed TTL cache of JSON views.
#[derive(Default)]
pub struct AggregateCache {
    inner: RwLock<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl AggregateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `key`, if present and unexpired.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let inner = self.inner.read().await;
            match inner.entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Some(_) => {}
            }
        }

        // Expired: delete under the write lock, unless it was refreshed meanwhile.
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.get(key) {
            if !entry.is_expired(Instant::now()) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            inner.entries.remove(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store `value` under `key` for `ttl`.
    pub async fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.inner.write().await.entries.insert(key.into(), entry);
    }

    /// Invalidation generation of `key`. Read it before computing a view and
    /// hand it to [`set_if_generation`](Self::set_if_generation).
    pub async fn generation(&self, key: &str) -> u64 {
        self.inner.read().await.generation(key)
    }

    /// Store `value` only if no prefix of `key` was invalidated since
    /// `generation` was read. Returns whether the value was stored.
    pub async fn set_if_generation(
        &self,
        key: &str,
        value: Value,
        ttl: Duration,
        generation: u64,
    ) -> bool {
        let mut inner = self.inner.write().await;
        if inner.generation(key) != generation {
            debug!(key, "Discarding view computed across an invalidation");
            return false;
        }
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        inner.entries.insert(key.to_string(), entry);
        true
    }

    /// Evict every entry whose key starts with `prefix`. Returns the count.
    pub async fn invalidate(&self, prefix: &str) -> usize {
        let mut inner = self.inner.write().await;
        *inner.generations.entry(prefix.to_string()).or_insert(0) += 1;
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !key.starts_with(prefix));
        let evicted = before - inner.entries.len();
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(prefix, evicted, "Cache entries invalidated");
        }
        evicted
    }

    /// Drop every expired entry. Returns the count.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        let evicted = before - inner.entries.len();
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.inner.read().await.entries.len(),
        }
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = self.sweep().await;
                        if evicted > 0 {
                            debug!(evicted, "Swept expired cache entries");
                        }
                    }
                }
            }
        })
    }
}
