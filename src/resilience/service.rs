//! Resilience service - the injected facade over health, mode, cache and queue.
//!
//! Constructed once at startup and shared as `Arc<ResilienceService>`; there
//! is no global instance. Health, mode and cache mutations are serialized by
//! one mutex. The queue has its own lock so queued work can call back into
//! the service while a drain is running. Status readers get the last
//! published snapshot from a watch channel without touching either lock.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use super::backend::{Backend, ResetTarget};
use super::cache::{CacheStats, CachedResult};
use super::health::BackendHealth;
use super::local::{LocalBackendProbe, OllamaProbe};
use super::mode::DegradationMode;
use super::network::{DnsReachability, NetworkProbe, ProbeResult, ReachabilityCheck};
use super::queue::{DeferredWork, DrainOutcome, QueueInfo, SharedQueue};
use super::state::{ResilienceState, StatusSnapshot};
use crate::types::{Config, RequestId, Result};

/// Resilience/failover core.
pub struct ResilienceService {
    config: Config,
    state: Mutex<ResilienceState>,
    queue: SharedQueue,
    network: NetworkProbe,
    local_probe: Arc<dyn LocalBackendProbe>,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl std::fmt::Debug for ResilienceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceService")
            .field("config", &self.config)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl ResilienceService {
    /// Build with explicit probes (tests, embedders with their own checks).
    pub fn new(
        config: Config,
        reachability: Arc<dyn ReachabilityCheck>,
        local_probe: Arc<dyn LocalBackendProbe>,
    ) -> Self {
        let state = ResilienceState::new(&config);
        let (status_tx, _) = watch::channel(state.snapshot(0, Utc::now()));
        Self {
            network: NetworkProbe::new(reachability, config.network.probe_interval),
            queue: SharedQueue::new(&config.queue),
            state: Mutex::new(state),
            local_probe,
            status_tx,
            config,
        }
    }

    /// Build with the DNS network probe and the Ollama local probe.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let reachability = Arc::new(DnsReachability::from_config(&config.network));
        let local_probe = Arc::new(OllamaProbe::from_config(&config.local_backend)?);
        Ok(Self::new(config, reachability, local_probe))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Health reporting
    // =========================================================================

    /// Report a successful upstream call.
    pub async fn record_success(&self, backend: Backend) {
        let queue_size = self.queue.len().await;
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state.record_success(backend, now);
        self.publish(&state, queue_size, now);
    }

    /// Report a failed upstream call.
    pub async fn record_failure(&self, backend: Backend, is_rate_limit: bool, retry_after_seconds: u64) {
        let queue_size = self.queue.len().await;
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state.record_failure(backend, is_rate_limit, retry_after_seconds, now);
        self.publish(&state, queue_size, now);
    }

    /// Reset one backend or all of them to fresh defaults.
    pub async fn reset(&self, target: ResetTarget) -> StatusSnapshot {
        let queue_size = self.queue.len().await;
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state.reset(target, now);
        self.publish(&state, queue_size, now)
    }

    pub async fn reset_backend(&self, backend: Backend) -> StatusSnapshot {
        self.reset(ResetTarget::One(backend)).await
    }

    pub async fn reset_all(&self) -> StatusSnapshot {
        self.reset(ResetTarget::All).await
    }

    /// Probe the local backend and record the result. Never fails.
    pub async fn initialize_local_backend(&self) -> bool {
        let available = match self.local_probe.probe().await {
            Ok(()) => {
                tracing::info!("local_backend_verified: backend={}", Backend::LOCAL);
                true
            }
            Err(e) => {
                tracing::info!(
                    "local_backend_unavailable: backend={}, error={}",
                    Backend::LOCAL,
                    e
                );
                false
            }
        };

        let queue_size = self.queue.len().await;
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state.set_local_available(available, now);
        self.publish(&state, queue_size, now);
        available
    }

    /// Check network reachability, reusing a recent result unless `force`.
    pub async fn check_network(&self, force: bool) -> bool {
        match self.network.check(force).await {
            ProbeResult::Cached(available) => available,
            ProbeResult::Fresh(available) => {
                let queue_size = self.queue.len().await;
                let mut state = self.state.lock().await;
                let now = Utc::now();
                state.set_network_available(available, now);
                self.publish(&state, queue_size, now);
                available
            }
        }
    }

    // =========================================================================
    // Routing
    // =========================================================================

    pub async fn preferred_backend(&self, requested: Backend) -> Backend {
        self.state
            .lock()
            .await
            .preferred_backend(requested, Utc::now())
    }

    pub async fn should_use_fallback(&self, backend: Backend) -> bool {
        self.state
            .lock()
            .await
            .should_use_fallback(backend, Utc::now())
    }

    /// Current mode, refreshed for rate-limit windows that have since expired.
    pub async fn mode(&self) -> DegradationMode {
        let mut state = self.state.lock().await;
        let before = state.mode();
        let now = Utc::now();
        let mode = state.recompute_mode(now);
        if mode != before {
            let queue_size = self.status_tx.borrow().queue_size;
            self.publish(&state, queue_size, now);
        }
        mode
    }

    pub async fn is_degraded(&self) -> bool {
        self.mode().await.is_degraded()
    }

    pub async fn health(&self, backend: Backend) -> BackendHealth {
        self.state.lock().await.tracker.health(backend).clone()
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Last published snapshot. Never waits on writers.
    pub fn status(&self) -> StatusSnapshot {
        self.status_tx.borrow().clone()
    }

    /// Recompute and publish a fresh snapshot.
    pub async fn refresh_status(&self) -> StatusSnapshot {
        let queue_size = self.queue.len().await;
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state.recompute_mode(now);
        self.publish(&state, queue_size, now)
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    /// Publish counts after a queue or cache change. Takes the queue lock
    /// before the state lock, like every other publisher.
    async fn publish_counts(&self) {
        let queue_size = self.queue.len().await;
        let state = self.state.lock().await;
        self.publish(&state, queue_size, Utc::now());
    }

    fn publish(&self, state: &ResilienceState, queue_size: usize, now: DateTime<Utc>) -> StatusSnapshot {
        let snapshot = state.snapshot(queue_size, now);
        self.status_tx.send_replace(snapshot.clone());
        snapshot
    }

    // =========================================================================
    // Tool result cache
    // =========================================================================

    pub async fn cache_tool_result(&self, tool: &str, arg_hash: &str, result: Value) {
        self.state.lock().await.cache.put(tool, arg_hash, result);
        self.publish_counts().await;
    }

    pub async fn get_cached_tool_result(&self, tool: &str, arg_hash: &str) -> Option<CachedResult> {
        self.state.lock().await.cache.get(tool, arg_hash)
    }

    pub async fn clear_cache(&self) -> usize {
        let cleared = self.state.lock().await.cache.clear();
        self.publish_counts().await;
        cleared
    }

    pub async fn purge_expired_cache(&self) -> usize {
        let purged = self
            .state
            .lock()
            .await
            .cache
            .purge_expired_at(Utc::now());
        if purged > 0 {
            self.publish_counts().await;
        }
        purged
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.state.lock().await.cache.stats()
    }

    // =========================================================================
    // Request queue
    // =========================================================================

    /// Queue work for later. `false` when the queue is full.
    pub async fn enqueue(
        &self,
        id: impl Into<RequestId>,
        work: Arc<dyn DeferredWork>,
        args: Value,
        priority: i32,
    ) -> bool {
        let accepted = self.queue.enqueue(id.into(), work, args, priority).await;
        if accepted {
            self.publish_counts().await;
        }
        accepted
    }

    /// Run one drain pass. Stops at the first rate-limit signal.
    pub async fn drain_queue(&self) -> Vec<DrainOutcome> {
        let outcomes = self.queue.drain().await;
        if !outcomes.is_empty() {
            self.refresh_status().await;
        }
        outcomes
    }

    pub async fn queue_info(&self) -> QueueInfo {
        self.queue.info().await
    }

    pub async fn clear_queue(&self) -> usize {
        let cleared = self.queue.clear().await;
        self.publish_counts().await;
        cleared
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }

    /// Earliest moment any backend leaves its rate-limit window.
    pub async fn next_available_time(&self) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .await
            .tracker
            .next_available_time_at(Utc::now())
    }

    /// Whole seconds until [`Self::next_available_time`], clamped to
    /// `[0, default_retry_after]`. `None` when nothing is rate-limited.
    pub async fn wait_time(&self) -> Option<u64> {
        let now = Utc::now();
        let until = self.next_available_time().await?;
        let remaining_ms = (until - now).num_milliseconds().max(0) as u64;
        let ceiling = self.config.health.default_retry_after.as_secs();
        Some(remaining_ms.div_ceil(1000).min(ceiling))
    }

    /// Snapshot of raw health records, one per backend.
    pub async fn health_snapshot(&self) -> Vec<(Backend, BackendHealth)> {
        self.state
            .lock()
            .await
            .tracker
            .snapshot()
            .into_iter()
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
