//! Degradation mode computation and backend routing.
//!
//! `compute_mode` is the only place the precedence rules live. It is a pure
//! function of a health snapshot and the last network probe result, so it can
//! be called after every mutation and tested in isolation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::backend::Backend;
use super::health::HealthSnapshot;

/// Single global operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DegradationMode {
    Normal,
    ClaudeUnavailable,
    OpenaiUnavailable,
    CloudUnavailable,
    RateLimited,
    Offline,
}

impl DegradationMode {
    pub fn is_degraded(self) -> bool {
        self != DegradationMode::Normal
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DegradationMode::Normal => "NORMAL",
            DegradationMode::ClaudeUnavailable => "CLAUDE_UNAVAILABLE",
            DegradationMode::OpenaiUnavailable => "OPENAI_UNAVAILABLE",
            DegradationMode::CloudUnavailable => "CLOUD_UNAVAILABLE",
            DegradationMode::RateLimited => "RATE_LIMITED",
            DegradationMode::Offline => "OFFLINE",
        }
    }

    /// Operator-facing explanation of the mode.
    pub fn description(self) -> &'static str {
        match self {
            DegradationMode::Normal => "All services operational",
            DegradationMode::ClaudeUnavailable => "Claude unavailable, using OpenAI",
            DegradationMode::OpenaiUnavailable => "OpenAI unavailable, using Claude",
            DegradationMode::CloudUnavailable => "Cloud backends unavailable, using local model",
            DegradationMode::RateLimited => "Rate limited, requests may be queued",
            DegradationMode::Offline => "Offline, only cached results are available",
        }
    }
}

impl Default for DegradationMode {
    fn default() -> Self {
        DegradationMode::Normal
    }
}

impl fmt::Display for DegradationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute the operating mode from backend health and network state.
///
/// Precedence, first match wins:
/// 1. network unreachable → `Offline`
/// 2. both cloud backends down → `CloudUnavailable` if local is up, else `Offline`
/// 3. one cloud backend down → that backend's `*Unavailable`
/// 4. any cloud backend rate-limited → `RateLimited`
/// 5. `Normal`
pub fn compute_mode(
    health: &HealthSnapshot,
    network_available: bool,
    now: DateTime<Utc>,
) -> DegradationMode {
    if !network_available {
        return DegradationMode::Offline;
    }

    let available = |b: Backend| health.get(&b).is_some_and(|h| h.available);

    match (available(Backend::Claude), available(Backend::OpenAi)) {
        (false, false) => {
            if available(Backend::LOCAL) {
                DegradationMode::CloudUnavailable
            } else {
                DegradationMode::Offline
            }
        }
        (false, true) => DegradationMode::ClaudeUnavailable,
        (true, false) => DegradationMode::OpenaiUnavailable,
        (true, true) => {
            let throttled = Backend::CLOUD
                .into_iter()
                .any(|b| health.get(&b).is_some_and(|h| h.is_rate_limited_at(now)));
            if throttled {
                DegradationMode::RateLimited
            } else {
                DegradationMode::Normal
            }
        }
    }
}

/// Pick the backend to call for a `requested` one.
///
/// Falls back to the other cloud backend, then the local one. When nothing is
/// usable the request is returned unchanged so the caller fails explicitly
/// instead of being routed somewhere with no better odds.
pub fn preferred_backend(
    health: &HealthSnapshot,
    requested: Backend,
    now: DateTime<Utc>,
) -> Backend {
    let usable = |b: Backend| health.get(&b).is_some_and(|h| h.is_usable_at(now));

    if usable(requested) {
        return requested;
    }

    let cloud_fallbacks: Vec<Backend> = match requested.cloud_peer() {
        Some(peer) => vec![peer],
        None => Backend::CLOUD.to_vec(),
    };
    if let Some(fallback) = cloud_fallbacks.into_iter().find(|b| usable(*b)) {
        return fallback;
    }

    let local_up = health.get(&Backend::LOCAL).is_some_and(|h| h.available);
    if requested != Backend::LOCAL && local_up {
        return Backend::LOCAL;
    }

    requested
}

/// Whether callers should avoid `backend` right now.
pub fn should_use_fallback(health: &HealthSnapshot, backend: Backend, now: DateTime<Utc>) -> bool {
    health
        .get(&backend)
        .map_or(true, |h| !h.is_usable_at(now))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::health::BackendHealth;
    use chrono::Duration;
    use proptest::prelude::*;

    fn snapshot(claude: bool, openai: bool, ollama: bool) -> HealthSnapshot {
        let mut snap = HealthSnapshot::new();
        for (backend, available) in [
            (Backend::Claude, claude),
            (Backend::OpenAi, openai),
            (Backend::Ollama, ollama),
        ] {
            let mut h = BackendHealth::new(backend);
            h.available = available;
            snap.insert(backend, h);
        }
        snap
    }

    fn throttle(snap: &mut HealthSnapshot, backend: Backend, now: DateTime<Utc>) {
        if let Some(h) = snap.get_mut(&backend) {
            h.rate_limited_until = Some(now + Duration::seconds(60));
        }
    }

    #[test]
    fn test_all_healthy_is_normal() {
        let now = Utc::now();
        assert_eq!(
            compute_mode(&snapshot(true, true, false), true, now),
            DegradationMode::Normal
        );
    }

    #[test]
    fn test_single_backend_unavailable() {
        let now = Utc::now();
        assert_eq!(
            compute_mode(&snapshot(false, true, false), true, now),
            DegradationMode::ClaudeUnavailable
        );
        assert_eq!(
            compute_mode(&snapshot(true, false, false), true, now),
            DegradationMode::OpenaiUnavailable
        );
    }

    #[test]
    fn test_both_cloud_unavailable() {
        let now = Utc::now();
        assert_eq!(
            compute_mode(&snapshot(false, false, true), true, now),
            DegradationMode::CloudUnavailable
        );
        assert_eq!(
            compute_mode(&snapshot(false, false, false), true, now),
            DegradationMode::Offline
        );
    }

    #[test]
    fn test_rate_limited_when_otherwise_healthy() {
        let now = Utc::now();
        let mut snap = snapshot(true, true, false);
        throttle(&mut snap, Backend::OpenAi, now);
        assert_eq!(compute_mode(&snap, true, now), DegradationMode::RateLimited);

        // Expired windows no longer count
        assert_eq!(
            compute_mode(&snap, true, now + Duration::seconds(61)),
            DegradationMode::Normal
        );
    }

    #[test]
    fn test_unavailable_outranks_rate_limited() {
        let now = Utc::now();
        let mut snap = snapshot(false, true, false);
        throttle(&mut snap, Backend::OpenAi, now);
        assert_eq!(
            compute_mode(&snap, true, now),
            DegradationMode::ClaudeUnavailable
        );
    }

    #[test]
    fn test_local_rate_limit_ignored_for_mode() {
        let now = Utc::now();
        let mut snap = snapshot(true, true, true);
        throttle(&mut snap, Backend::Ollama, now);
        assert_eq!(compute_mode(&snap, true, now), DegradationMode::Normal);
    }

    #[test]
    fn test_preferred_backend_fallback_chain() {
        let now = Utc::now();
        assert_eq!(
            preferred_backend(&snapshot(true, true, false), Backend::Claude, now),
            Backend::Claude
        );
        assert_eq!(
            preferred_backend(&snapshot(false, true, false), Backend::Claude, now),
            Backend::OpenAi
        );
        assert_eq!(
            preferred_backend(&snapshot(false, false, true), Backend::Claude, now),
            Backend::Ollama
        );
        assert_eq!(
            preferred_backend(&snapshot(false, false, false), Backend::Claude, now),
            Backend::Claude
        );
    }

    #[test]
    fn test_preferred_backend_skips_rate_limited() {
        let now = Utc::now();
        let mut snap = snapshot(true, true, false);
        throttle(&mut snap, Backend::Claude, now);
        assert_eq!(preferred_backend(&snap, Backend::Claude, now), Backend::OpenAi);

        throttle(&mut snap, Backend::OpenAi, now);
        assert_eq!(preferred_backend(&snap, Backend::Claude, now), Backend::Claude);
    }

    #[test]
    fn test_preferred_backend_from_local() {
        let now = Utc::now();
        assert_eq!(
            preferred_backend(&snapshot(false, true, false), Backend::Ollama, now),
            Backend::OpenAi
        );
        assert_eq!(
            preferred_backend(&snapshot(true, true, true), Backend::Ollama, now),
            Backend::Ollama
        );
    }

    #[test]
    fn test_should_use_fallback() {
        let now = Utc::now();
        let mut snap = snapshot(true, false, false);
        assert!(!should_use_fallback(&snap, Backend::Claude, now));
        assert!(should_use_fallback(&snap, Backend::OpenAi, now));

        throttle(&mut snap, Backend::Claude, now);
        assert!(should_use_fallback(&snap, Backend::Claude, now));
    }

    #[test]
    fn test_mode_serializes_screaming_snake() {
        let json = serde_json::to_string(&DegradationMode::CloudUnavailable).unwrap();
        assert_eq!(json, "\"CLOUD_UNAVAILABLE\"");
        assert_eq!(DegradationMode::CloudUnavailable.to_string(), "CLOUD_UNAVAILABLE");
    }

    proptest! {
        #[test]
        fn prop_network_down_always_offline(
            claude in any::<bool>(),
            openai in any::<bool>(),
            ollama in any::<bool>(),
        ) {
            let snap = snapshot(claude, openai, ollama);
            prop_assert_eq!(compute_mode(&snap, false, Utc::now()), DegradationMode::Offline);
        }

        #[test]
        fn prop_normal_iff_both_cloud_up_and_unthrottled(
            claude in any::<bool>(),
            openai in any::<bool>(),
            ollama in any::<bool>(),
            throttled in any::<bool>(),
        ) {
            let now = Utc::now();
            let mut snap = snapshot(claude, openai, ollama);
            if throttled {
                throttle(&mut snap, Backend::Claude, now);
            }
            let mode = compute_mode(&snap, true, now);
            prop_assert_eq!(mode == DegradationMode::Normal, claude && openai && !throttled);
        }

        #[test]
        fn prop_preferred_is_requested_or_usable(
            claude in any::<bool>(),
            openai in any::<bool>(),
            ollama in any::<bool>(),
        ) {
            let now = Utc::now();
            let snap = snapshot(claude, openai, ollama);
            for requested in Backend::ALL {
                let chosen = preferred_backend(&snap, requested, now);
                prop_assert!(chosen == requested || snap[&chosen].available);
            }
        }
    }
}
