//! Mutable resilience state guarded by the service mutex.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::backend::{Backend, ResetTarget};
use super::cache::ToolResultCache;
use super::health::{BackendHealthReport, BackendHealthTracker};
use super::mode::{self, DegradationMode};
use crate::types::Config;

/// Point-in-time view of the whole core, published after every mutation.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub mode: DegradationMode,
    pub mode_description: &'static str,
    pub is_degraded: bool,
    pub network_available: bool,
    pub backends: BTreeMap<Backend, BackendHealthReport>,
    pub queue_size: usize,
    pub cache_entries: usize,
    pub updated_at: DateTime<Utc>,
}

/// Health tracker, network flag, current mode and tool cache.
///
/// NOT a separate actor - owned by the service and mutated under its lock.
/// Every mutation ends with a mode recompute.
#[derive(Debug)]
pub struct ResilienceState {
    pub(crate) tracker: BackendHealthTracker,
    pub(crate) cache: ToolResultCache,
    network_available: bool,
    mode: DegradationMode,
}

impl ResilienceState {
    pub fn new(config: &Config) -> Self {
        let mut state = Self {
            tracker: BackendHealthTracker::new(config.health.clone()),
            cache: ToolResultCache::new(&config.cache),
            network_available: true,
            mode: DegradationMode::Normal,
        };
        state.recompute_mode(Utc::now());
        state
    }

    pub fn mode(&self) -> DegradationMode {
        self.mode
    }

    pub fn network_available(&self) -> bool {
        self.network_available
    }

    pub fn record_success(&mut self, backend: Backend, now: DateTime<Utc>) {
        self.tracker.record_success_at(backend, now);
        self.recompute_mode(now);
    }

    pub fn record_failure(
        &mut self,
        backend: Backend,
        is_rate_limit: bool,
        retry_after_seconds: u64,
        now: DateTime<Utc>,
    ) {
        self.tracker
            .record_failure_at(backend, is_rate_limit, retry_after_seconds, now);
        self.recompute_mode(now);
    }

    pub fn reset(&mut self, target: ResetTarget, now: DateTime<Utc>) {
        self.tracker.reset(target);
        self.recompute_mode(now);
    }

    pub fn set_local_available(&mut self, available: bool, now: DateTime<Utc>) {
        self.tracker.mark_available(Backend::LOCAL, available);
        self.recompute_mode(now);
    }

    /// Apply a fresh network probe result. Unreachable forces `Offline`.
    pub fn set_network_available(&mut self, available: bool, now: DateTime<Utc>) {
        if self.network_available != available {
            tracing::info!("network_state_changed: available={}", available);
        }
        self.network_available = available;
        if available {
            self.recompute_mode(now);
        } else {
            self.transition(DegradationMode::Offline);
        }
    }

    /// Recompute from the current records. Also picks up rate-limit windows
    /// that expired since the last mutation.
    pub fn recompute_mode(&mut self, now: DateTime<Utc>) -> DegradationMode {
        let next = mode::compute_mode(&self.tracker.snapshot(), self.network_available, now);
        self.transition(next);
        next
    }

    pub fn preferred_backend(&self, requested: Backend, now: DateTime<Utc>) -> Backend {
        let chosen = mode::preferred_backend(&self.tracker.snapshot(), requested, now);
        if chosen != requested {
            tracing::debug!("backend_fallback: requested={}, chosen={}", requested, chosen);
        }
        chosen
    }

    pub fn should_use_fallback(&self, backend: Backend, now: DateTime<Utc>) -> bool {
        mode::should_use_fallback(&self.tracker.snapshot(), backend, now)
    }

    pub fn snapshot(&self, queue_size: usize, now: DateTime<Utc>) -> StatusSnapshot {
        let backends = self
            .tracker
            .snapshot()
            .iter()
            .map(|(b, h)| (*b, BackendHealthReport::from_health(h, now)))
            .collect();

        StatusSnapshot {
            mode: self.mode,
            mode_description: self.mode.description(),
            is_degraded: self.mode.is_degraded(),
            network_available: self.network_available,
            backends,
            queue_size,
            cache_entries: self.cache.len(),
            updated_at: now,
        }
    }

    fn transition(&mut self, next: DegradationMode) {
        if next == self.mode {
            return;
        }
        if next.is_degraded() {
            tracing::warn!("degradation_mode_changed: from={}, to={}", self.mode, next);
        } else {
            tracing::info!("degradation_mode_changed: from={}, to={}", self.mode, next);
        }
        self.mode = next;
    }
}
