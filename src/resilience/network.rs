//! Network reachability probe.
//!
//! A cheap DNS resolution of a well-known host decides whether the network is
//! up. Results are reused for `probe_interval` unless a caller forces a fresh
//! check; concurrent callers share one in-flight probe.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::types::NetworkConfig;

/// Something that can tell whether the network is reachable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReachabilityCheck: Send + Sync {
    /// Never errors: any failure means unreachable.
    async fn is_reachable(&self) -> bool;
}

/// Resolves `host:port` through the system resolver.
#[derive(Debug, Clone)]
pub struct DnsReachability {
    host: String,
    timeout: Duration,
}

impl DnsReachability {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            timeout,
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(config.probe_host.clone(), config.probe_timeout)
    }
}

#[async_trait]
impl ReachabilityCheck for DnsReachability {
    async fn is_reachable(&self) -> bool {
        match tokio::time::timeout(self.timeout, tokio::net::lookup_host(self.host.as_str())).await {
            Ok(Ok(mut addrs)) => addrs.next().is_some(),
            Ok(Err(e)) => {
                tracing::debug!("network_probe_failed: host={}, error={}", self.host, e);
                false
            }
            Err(_) => {
                tracing::debug!(
                    "network_probe_timeout: host={}, timeout_ms={}",
                    self.host,
                    self.timeout.as_millis()
                );
                false
            }
        }
    }
}

/// Outcome of [`NetworkProbe::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// Reused a result younger than the probe interval.
    Cached(bool),
    /// Ran the check just now.
    Fresh(bool),
}

impl ProbeResult {
    pub fn is_available(self) -> bool {
        match self {
            ProbeResult::Cached(v) | ProbeResult::Fresh(v) => v,
        }
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    last: Option<(Instant, bool)>,
}

/// Cached network probe.
pub struct NetworkProbe {
    checker: Arc<dyn ReachabilityCheck>,
    interval: Duration,
    state: Mutex<ProbeState>,
}

impl std::fmt::Debug for NetworkProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkProbe")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl NetworkProbe {
    pub fn new(checker: Arc<dyn ReachabilityCheck>, interval: Duration) -> Self {
        Self {
            checker,
            interval,
            state: Mutex::new(ProbeState::default()),
        }
    }

    /// Return the cached result unless `force` is set or it has gone stale.
    pub async fn check(&self, force: bool) -> ProbeResult {
        // Held across the probe so concurrent callers wait for one result.
        let mut state = self.state.lock().await;

        if !force {
            if let Some((at, available)) = state.last {
                if at.elapsed() < self.interval {
                    return ProbeResult::Cached(available);
                }
            }
        }

        let available = self.checker.is_reachable().await;
        state.last = Some((Instant::now(), available));
        tracing::debug!("network_probe_completed: available={}, forced={}", available, force);
        ProbeResult::Fresh(available)
    }

    /// Last known result without probing.
    pub async fn last_result(&self) -> Option<bool> {
        self.state.lock().await.last.map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_with(checker: MockReachabilityCheck, interval: Duration) -> NetworkProbe {
        NetworkProbe::new(Arc::new(checker), interval)
    }

    #[tokio::test]
    async fn test_first_check_probes() {
        let mut checker = MockReachabilityCheck::new();
        checker.expect_is_reachable().times(1).returning(|| true);
        let probe = probe_with(checker, Duration::from_secs(30));

        assert_eq!(probe.check(false).await, ProbeResult::Fresh(true));
        assert_eq!(probe.last_result().await, Some(true));
    }

    #[tokio::test]
    async fn test_second_check_is_cached() {
        let mut checker = MockReachabilityCheck::new();
        checker.expect_is_reachable().times(1).returning(|| false);
        let probe = probe_with(checker, Duration::from_secs(30));

        assert_eq!(probe.check(false).await, ProbeResult::Fresh(false));
        assert_eq!(probe.check(false).await, ProbeResult::Cached(false));
    }

    #[tokio::test]
    async fn test_force_bypasses_cache() {
        let mut checker = MockReachabilityCheck::new();
        checker.expect_is_reachable().times(2).returning(|| true);
        let probe = probe_with(checker, Duration::from_secs(30));

        probe.check(false).await;
        assert_eq!(probe.check(true).await, ProbeResult::Fresh(true));
    }

    #[tokio::test]
    async fn test_stale_cache_reprobes() {
        let mut checker = MockReachabilityCheck::new();
        checker.expect_is_reachable().times(2).returning(|| true);
        let probe = probe_with(checker, Duration::from_millis(10));

        probe.check(false).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(probe.check(false).await, ProbeResult::Fresh(true));
    }

    #[tokio::test]
    async fn test_dns_probe_unresolvable_host() {
        let dns = DnsReachability::new("no-such-host.invalid:443", Duration::from_secs(2));
        assert!(!dns.is_reachable().await);
    }
}
