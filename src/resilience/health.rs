//! Backend health tracking.
//!
//! One rolling record per backend: availability, consecutive failures,
//! totals and the rate-limit window. Availability flips to false after
//! `failure_threshold` consecutive failures and back to true on any success.
//! Rate limiting is tracked independently of availability.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::backend::{Backend, ResetTarget};
use crate::types::HealthConfig;

/// Upper bound on a provider-supplied Retry-After (one week).
const MAX_RETRY_AFTER_SECS: u64 = 7 * 24 * 60 * 60;

// =============================================================================
// Health record
// =============================================================================

/// Rolling health record for a single backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub available: bool,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub rate_limited_until: Option<DateTime<Utc>>,
    pub total_requests: u64,
    pub total_failures: u64,
}

impl BackendHealth {
    /// Fresh record. The local backend starts unavailable until a probe verifies it.
    pub fn new(backend: Backend) -> Self {
        Self {
            available: backend.is_cloud(),
            consecutive_failures: 0,
            last_success: None,
            last_failure: None,
            rate_limited_until: None,
            total_requests: 0,
            total_failures: 0,
        }
    }

    /// Whether the rate-limit window is still open at `now`.
    pub fn is_rate_limited_at(&self, now: DateTime<Utc>) -> bool {
        self.rate_limited_until.is_some_and(|until| until > now)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.is_rate_limited_at(Utc::now())
    }

    /// Percentage of failed requests, 0 when nothing was recorded.
    pub fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.total_failures as f64 / self.total_requests as f64 * 100.0
    }

    /// Usable right now: available and not throttled.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.available && !self.is_rate_limited_at(now)
    }
}

/// Health record plus derived fields, as exposed on the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealthReport {
    #[serde(flatten)]
    pub health: BackendHealth,
    pub is_rate_limited: bool,
    pub failure_rate: f64,
}

impl BackendHealthReport {
    pub fn from_health(health: &BackendHealth, now: DateTime<Utc>) -> Self {
        Self {
            health: health.clone(),
            is_rate_limited: health.is_rate_limited_at(now),
            failure_rate: health.failure_rate(),
        }
    }
}

// =============================================================================
// Health tracker
// =============================================================================

/// Point-in-time copy of every backend's record.
pub type HealthSnapshot = BTreeMap<Backend, BackendHealth>;

/// Per-backend health tracker.
///
/// NOT a separate actor - owned by the resilience core and called via &mut self.
#[derive(Debug)]
pub struct BackendHealthTracker {
    config: HealthConfig,
    records: BTreeMap<Backend, BackendHealth>,
}

impl BackendHealthTracker {
    pub fn new(config: HealthConfig) -> Self {
        let records = Backend::ALL
            .into_iter()
            .map(|b| (b, BackendHealth::new(b)))
            .collect();
        Self { config, records }
    }

    /// Record a successful upstream call.
    pub fn record_success(&mut self, backend: Backend) {
        self.record_success_at(backend, Utc::now());
    }

    pub fn record_success_at(&mut self, backend: Backend, now: DateTime<Utc>) {
        let record = self.record_mut(backend);
        let recovered = !record.available;
        record.total_requests += 1;
        record.consecutive_failures = 0;
        record.available = true;
        record.last_success = Some(now);

        if recovered {
            tracing::info!("backend_recovered: backend={}", backend);
        }
    }

    /// Record a failed upstream call.
    ///
    /// A rate-limit failure opens the throttling window for `retry_after_seconds`
    /// (capped at one week), whatever the failure count.
    pub fn record_failure(&mut self, backend: Backend, is_rate_limit: bool, retry_after_seconds: u64) {
        self.record_failure_at(backend, is_rate_limit, retry_after_seconds, Utc::now());
    }

    pub fn record_failure_at(
        &mut self,
        backend: Backend,
        is_rate_limit: bool,
        retry_after_seconds: u64,
        now: DateTime<Utc>,
    ) {
        let threshold = self.config.failure_threshold;
        let retry_after = retry_after_seconds.min(MAX_RETRY_AFTER_SECS);

        let record = self.record_mut(backend);
        record.total_requests += 1;
        record.total_failures += 1;
        record.consecutive_failures += 1;
        record.last_failure = Some(now);

        if record.consecutive_failures >= threshold && record.available {
            record.available = false;
            tracing::warn!(
                "backend_marked_unavailable: backend={}, consecutive_failures={}",
                backend,
                record.consecutive_failures
            );
        }

        if is_rate_limit {
            let until = now + Duration::seconds(retry_after as i64);
            record.rate_limited_until = Some(until);
            tracing::warn!(
                "backend_rate_limited: backend={}, retry_after_seconds={}, until={}",
                backend,
                retry_after,
                until
            );
        }
    }

    /// Apply a probe result without counting a request.
    pub fn mark_available(&mut self, backend: Backend, available: bool) {
        let record = self.record_mut(backend);
        record.available = available;
        if available {
            record.consecutive_failures = 0;
        }
    }

    /// Replace one or all records with fresh defaults.
    pub fn reset(&mut self, target: ResetTarget) {
        match target {
            ResetTarget::One(backend) => {
                self.records.insert(backend, BackendHealth::new(backend));
            }
            ResetTarget::All => {
                for backend in Backend::ALL {
                    self.records.insert(backend, BackendHealth::new(backend));
                }
            }
        }
        tracing::info!("backend_health_reset: target={:?}", target);
    }

    pub fn health(&self, backend: Backend) -> &BackendHealth {
        // Records exist for every variant from construction onwards.
        &self.records[&backend]
    }

    pub fn is_available(&self, backend: Backend) -> bool {
        self.health(backend).available
    }

    pub fn is_rate_limited_at(&self, backend: Backend, now: DateTime<Utc>) -> bool {
        self.health(backend).is_rate_limited_at(now)
    }

    pub fn is_rate_limited(&self, backend: Backend) -> bool {
        self.is_rate_limited_at(backend, Utc::now())
    }

    /// Earliest rate-limit expiry still in the future, across all backends.
    pub fn next_available_time_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.records
            .values()
            .filter_map(|r| r.rate_limited_until)
            .filter(|until| *until > now)
            .min()
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.records.clone()
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    fn record_mut(&mut self, backend: Backend) -> &mut BackendHealth {
        self.records
            .entry(backend)
            .or_insert_with(|| BackendHealth::new(backend))
    }
}

impl Default for BackendHealthTracker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_availability() {
        let tracker = BackendHealthTracker::default();
        assert!(tracker.is_available(Backend::Claude));
        assert!(tracker.is_available(Backend::OpenAi));
        assert!(!tracker.is_available(Backend::Ollama));
    }

    #[test]
    fn test_three_failures_mark_unavailable() {
        for backend in Backend::CLOUD {
            let mut tracker = BackendHealthTracker::default();
            tracker.record_failure(backend, false, 0);
            tracker.record_failure(backend, false, 0);
            assert!(tracker.is_available(backend));

            tracker.record_failure(backend, false, 0);
            assert!(!tracker.is_available(backend));
            assert_eq!(tracker.health(backend).consecutive_failures, 3);
        }
    }

    #[test]
    fn test_success_restores_availability() {
        let mut tracker = BackendHealthTracker::default();
        for _ in 0..4 {
            tracker.record_failure(Backend::Claude, false, 0);
        }
        tracker.record_success(Backend::Claude);

        let health = tracker.health(Backend::Claude);
        assert!(health.available);
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.last_success.is_some());
    }

    #[test]
    fn test_totals_and_failure_rate() {
        let mut tracker = BackendHealthTracker::default();
        assert_eq!(tracker.health(Backend::OpenAi).failure_rate(), 0.0);

        tracker.record_success(Backend::OpenAi);
        tracker.record_success(Backend::OpenAi);
        tracker.record_success(Backend::OpenAi);
        tracker.record_failure(Backend::OpenAi, false, 0);

        let health = tracker.health(Backend::OpenAi);
        assert_eq!(health.total_requests, 4);
        assert_eq!(health.total_failures, 1);
        assert!((health.failure_rate() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rate_limit_independent_of_threshold() {
        let mut tracker = BackendHealthTracker::default();
        let now = Utc::now();
        tracker.record_failure_at(Backend::Claude, true, 30, now);

        let health = tracker.health(Backend::Claude);
        assert!(health.available);
        assert!(health.is_rate_limited_at(now + Duration::seconds(29)));
        assert!(!health.is_rate_limited_at(now + Duration::seconds(31)));
    }

    #[test]
    fn test_rate_limit_zero_retry_opens_no_window() {
        let mut tracker = BackendHealthTracker::default();
        let now = Utc::now();
        tracker.record_failure_at(Backend::OpenAi, true, 0, now);

        let health = tracker.health(Backend::OpenAi);
        assert_eq!(health.rate_limited_until, Some(now));
        assert!(!health.is_rate_limited_at(now));
        assert_eq!(health.consecutive_failures, 1);
    }

    #[test]
    fn test_success_does_not_clear_rate_limit() {
        let mut tracker = BackendHealthTracker::default();
        tracker.record_failure(Backend::Claude, true, 120);
        tracker.record_success(Backend::Claude);
        assert!(tracker.is_rate_limited(Backend::Claude));
    }

    #[test]
    fn test_reset_single_backend() {
        let mut tracker = BackendHealthTracker::default();
        tracker.mark_available(Backend::Ollama, true);
        for _ in 0..3 {
            tracker.record_failure(Backend::Claude, false, 0);
            tracker.record_failure(Backend::OpenAi, false, 0);
        }

        tracker.reset(ResetTarget::One(Backend::Claude));
        assert_eq!(
            tracker.health(Backend::Claude),
            &BackendHealth::new(Backend::Claude)
        );
        assert!(!tracker.is_available(Backend::OpenAi));
        assert!(tracker.is_available(Backend::Ollama));

        tracker.reset(ResetTarget::One(Backend::Ollama));
        assert!(!tracker.is_available(Backend::Ollama));
    }

    #[test]
    fn test_reset_all() {
        let mut tracker = BackendHealthTracker::default();
        tracker.mark_available(Backend::Ollama, true);
        for backend in Backend::ALL {
            tracker.record_failure(backend, true, 60);
        }

        tracker.reset(ResetTarget::All);
        for backend in Backend::ALL {
            assert_eq!(tracker.health(backend), &BackendHealth::new(backend));
        }
    }

    #[test]
    fn test_next_available_time_picks_earliest_future() {
        let mut tracker = BackendHealthTracker::default();
        let now = Utc::now();
        tracker.record_failure_at(Backend::Claude, true, 90, now);
        tracker.record_failure_at(Backend::OpenAi, true, 30, now);

        assert_eq!(
            tracker.next_available_time_at(now),
            Some(now + Duration::seconds(30))
        );
        // Once the earlier window passes only the later one remains
        assert_eq!(
            tracker.next_available_time_at(now + Duration::seconds(45)),
            Some(now + Duration::seconds(90))
        );
        assert_eq!(tracker.next_available_time_at(now + Duration::seconds(91)), None);
    }

    #[test]
    fn test_custom_threshold() {
        let mut tracker = BackendHealthTracker::new(HealthConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        tracker.record_failure(Backend::OpenAi, false, 0);
        assert!(!tracker.is_available(Backend::OpenAi));
    }
}
