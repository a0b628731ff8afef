//! # Jeeves Resilience - Failover Core for the Assistant Server
//!
//! Keeps the assistant answering when its LLM backends misbehave:
//! - Per-backend health tracking (consecutive failures, rate-limit windows)
//! - Degradation modes derived from backend health and network reachability
//! - Backend fallback selection (claude ⇄ openai, ollama as local)
//! - Priority request queue drained when backends come back
//! - 24h tool-result cache for offline answers
//! - Admin HTTP surface for status, resets, cache and queue
//!
//! ## Architecture
//!
//! One service owns all mutable state; callers share it behind an `Arc`:
//! ```text
//!                    ┌─────────────────────────────────┐
//!   chat / tools  →  │       ResilienceService         │
//!   admin HTTP    →  │  ┌─────────┐ ┌─────────┐        │
//!                    │  │ Health  │ │ Network │        │
//!                    │  │ Tracker │ │  Probe  │        │
//!                    │  └─────────┘ └─────────┘        │
//!                    │  ┌─────────┐ ┌─────────┐        │
//!                    │  │ Request │ │  Tool   │        │
//!                    │  │  Queue  │ │  Cache  │        │
//!                    │  └─────────┘ └─────────┘        │
//!                    └─────────────────────────────────┘
//!                          ▲ QueueProcessor (ticks)
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod admin;
pub mod resilience;
pub mod types;

// Internal utilities
pub mod observability;
pub mod validation;

pub use types::{Config, Error, Result};
