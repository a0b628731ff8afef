//! Resilience core - backend health, degradation modes, queueing and caching.
//!
//! Chat and tool-execution code reports every upstream outcome here, asks
//! which backend to call, and parks work it cannot run right now:
//!
//! ```text
//!   record_success / record_failure ──▶ BackendHealthTracker
//!                                              │
//!   check_network ──▶ NetworkProbe ──────────▶ compute_mode ──▶ DegradationMode
//!                                              │
//!   preferred_backend / should_use_fallback ◀──┘
//!
//!   enqueue ──▶ RequestQueue ──▶ drain (halts on first rate limit)
//!   cache_tool_result / get_cached_tool_result ──▶ ToolResultCache (24h TTL)
//! ```

pub mod backend;
pub mod cache;
pub mod health;
pub mod local;
pub mod mode;
pub mod network;
pub mod processor;
pub mod queue;
pub mod service;
pub mod state;

pub use backend::{Backend, ResetTarget};
pub use cache::{argument_hash, CacheStats, CachedResult, ToolResultCache};
pub use health::{BackendHealth, BackendHealthReport, BackendHealthTracker, HealthSnapshot};
pub use local::{LocalBackendProbe, OllamaProbe};
pub use mode::{compute_mode, preferred_backend, should_use_fallback, DegradationMode};
pub use network::{DnsReachability, NetworkProbe, ProbeResult, ReachabilityCheck};
pub use processor::{ProcessorStats, QueueProcessor};
pub use queue::{
    DeferredWork, DrainOutcome, DrainStatus, FnWork, InFlight, PendingItem, QueueInfo,
    QueuedRequest, RequestQueue, SharedQueue, SyncFnWork,
};
pub use service::ResilienceService;
pub use state::{ResilienceState, StatusSnapshot};
