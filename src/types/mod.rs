//! Core types for the resilience core.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed request identifiers for the queue
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for health, probes, cache and queue

mod config;
mod errors;
mod ids;

pub use config::{
    CacheConfig, Config, HealthConfig, LocalBackendConfig, NetworkConfig, ObservabilityConfig,
    QueueConfig, ServerConfig,
};
pub use errors::{is_rate_limit_message, Error, Result};
pub use ids::RequestId;
