//! Background queue processor.
//!
//! Drains the request queue opportunistically: on every tick it skips while
//! the queue is empty or a backend is still inside its rate-limit window,
//! otherwise it runs one drain pass. Each tick also re-checks the network
//! (rate-limited by the probe's own cache interval) and purges expired cache
//! entries.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use super::queue::DrainStatus;
use super::service::ResilienceService;

/// Statistics from one processor tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorStats {
    /// Tick was skipped (empty queue or waiting out a rate limit).
    pub skipped: bool,
    /// Seconds left on the rate-limit window when skipped for throttling.
    pub wait_seconds: Option<u64>,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub requeued: usize,
    pub cache_purged: usize,
}

/// QueueProcessor drives [`ResilienceService::drain_queue`] in the background.
#[derive(Debug)]
pub struct QueueProcessor {
    service: Arc<ResilienceService>,
    interval: Duration,
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl QueueProcessor {
    pub fn new(service: Arc<ResilienceService>) -> Self {
        let interval = service.config().queue.processor_interval;
        Self {
            service,
            interval,
            stop_tx: None,
        }
    }

    /// Start the processing loop in the background.
    /// Returns immediately; draining runs in a spawned task.
    pub fn start(&mut self) -> tokio::task::JoinHandle<()> {
        let service = self.service.clone();
        let period = self.interval;
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        self.stop_tx = Some(stop_tx);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = Self::run_once(&service).await;
                        if !stats.skipped {
                            tracing::debug!(
                                "queue_processor_tick: completed={}, failed={}, timed_out={}, requeued={}, cache_purged={}",
                                stats.completed,
                                stats.failed,
                                stats.timed_out,
                                stats.requeued,
                                stats.cache_purged,
                            );
                        }
                    }
                    _ = &mut stop_rx => {
                        tracing::info!("queue_processor_stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Stop the processing loop.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Run a single tick.
    pub async fn run_once(service: &ResilienceService) -> ProcessorStats {
        service.check_network(false).await;

        let mut stats = ProcessorStats {
            cache_purged: service.purge_expired_cache().await,
            ..Default::default()
        };

        if service.queue_len().await == 0 {
            stats.skipped = true;
            return stats;
        }

        if let Some(wait) = service.wait_time().await.filter(|w| *w > 0) {
            tracing::debug!("queue_processor_waiting: wait_seconds={}", wait);
            stats.skipped = true;
            stats.wait_seconds = Some(wait);
            return stats;
        }

        for outcome in service.drain_queue().await {
            match outcome.status {
                DrainStatus::Completed => stats.completed += 1,
                DrainStatus::Failed => stats.failed += 1,
                DrainStatus::TimedOut => stats.timed_out += 1,
                DrainStatus::Requeued => stats.requeued += 1,
            }
        }
        stats
    }
}

impl Drop for QueueProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::backend::Backend;
    use crate::resilience::local::MockLocalBackendProbe;
    use crate::resilience::network::MockReachabilityCheck;
    use crate::resilience::queue::FnWork;
    use crate::types::{Config, Error};
    use crate::resilience::mode::DegradationMode;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn service_with_network(config: Config, up: Arc<AtomicBool>) -> Arc<ResilienceService> {
        let mut reach = MockReachabilityCheck::new();
        reach
            .expect_is_reachable()
            .returning(move || up.load(Ordering::SeqCst));
        Arc::new(ResilienceService::new(
            config,
            Arc::new(reach),
            Arc::new(MockLocalBackendProbe::new()),
        ))
    }

    fn service(config: Config) -> Arc<ResilienceService> {
        service_with_network(config, Arc::new(AtomicBool::new(true)))
    }

    #[tokio::test]
    async fn test_empty_queue_skips() {
        let service = service(Config::default());
        let stats = QueueProcessor::run_once(&service).await;
        assert!(stats.skipped);
        assert_eq!(stats.wait_seconds, None);
    }

    #[tokio::test]
    async fn test_waits_out_rate_limit() {
        let service = service(Config::default());
        service
            .enqueue("a", FnWork::shared(|_| async { Ok(json!(1)) }), json!(null), 0)
            .await;
        service.record_failure(Backend::Claude, true, 30).await;

        let stats = QueueProcessor::run_once(&service).await;
        assert!(stats.skipped);
        assert!(stats.wait_seconds.is_some());
        assert_eq!(service.queue_len().await, 1);
    }

    #[tokio::test]
    async fn test_drains_and_counts() {
        let service = service(Config::default());
        service
            .enqueue("ok", FnWork::shared(|_| async { Ok(json!(1)) }), json!(null), 2)
            .await;
        service
            .enqueue(
                "bad",
                FnWork::shared(|_| async { Err(Error::work("invalid tool input")) }),
                json!(null),
                1,
            )
            .await;
        service
            .enqueue(
                "throttled",
                FnWork::shared(|_| async { Err(Error::rate_limited("claude")) }),
                json!(null),
                0,
            )
            .await;

        let stats = QueueProcessor::run_once(&service).await;
        assert_eq!(
            stats,
            ProcessorStats {
                completed: 1,
                failed: 1,
                requeued: 1,
                ..Default::default()
            }
        );
        assert_eq!(service.queue_len().await, 1);
    }

    #[tokio::test]
    async fn test_tick_recovers_from_offline() {
        let mut config = Config::default();
        config.network.probe_interval = Duration::from_millis(10);
        let up = Arc::new(AtomicBool::new(false));
        let service = service_with_network(config, up.clone());

        assert!(!service.check_network(true).await);
        assert_eq!(service.mode().await, DegradationMode::Offline);

        up.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        QueueProcessor::run_once(&service).await;

        assert!(service.status().network_available);
        assert_eq!(service.mode().await, DegradationMode::Normal);
    }

    #[tokio::test]
    async fn test_tick_reuses_cached_network_result() {
        let mut reach = MockReachabilityCheck::new();
        reach.expect_is_reachable().times(1).returning(|| true);
        let service = ResilienceService::new(
            Config::default(),
            Arc::new(reach),
            Arc::new(MockLocalBackendProbe::new()),
        );

        QueueProcessor::run_once(&service).await;
        QueueProcessor::run_once(&service).await;
        QueueProcessor::run_once(&service).await;
    }

    #[tokio::test]
    async fn test_background_loop_drains() {
        let mut config = Config::default();
        config.queue.processor_interval = Duration::from_millis(20);
        let service = service(config);
        service
            .enqueue("bg", FnWork::shared(|_| async { Ok(json!("done")) }), json!(null), 0)
            .await;

        let mut processor = QueueProcessor::new(service.clone());
        let handle = processor.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        processor.stop();
        handle.await.unwrap();

        assert_eq!(service.queue_len().await, 0);
    }
}
