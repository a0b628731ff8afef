//! TTL cache for idempotent tool results.
//!
//! Keeps the last result per `(tool, argument hash)` so degraded operation can
//! still answer repeated tool calls. Entries expire lazily: a read past the TTL
//! evicts the entry and reports a miss.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::types::CacheConfig;

/// Stable digest of a tool's arguments.
///
/// `serde_json::Map` keeps keys sorted, so logically equal argument objects
/// hash the same regardless of the order the caller built them in.
pub fn argument_hash(args: &Value) -> String {
    let canonical = args.to_string();
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    tool: String,
    arg_hash: String,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: Value,
    cached_at: DateTime<Utc>,
}

/// A cache hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedResult {
    pub result: Value,
    pub cached: bool,
    pub cached_at: DateTime<Utc>,
}

/// Cache summary for the admin surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub ttl_seconds: u64,
    pub tools: Vec<String>,
}

/// TTL-keyed tool result cache.
#[derive(Debug)]
pub struct ToolResultCache {
    ttl: Duration,
    entries: HashMap<CacheKey, CacheEntry>,
}

impl ToolResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: Duration::from_std(config.ttl).unwrap_or_else(|_| Duration::hours(24)),
            entries: HashMap::new(),
        }
    }

    pub fn put(&mut self, tool: &str, arg_hash: &str, result: Value) {
        self.put_at(tool, arg_hash, result, Utc::now());
    }

    pub fn put_at(&mut self, tool: &str, arg_hash: &str, result: Value, now: DateTime<Utc>) {
        self.entries.insert(
            CacheKey {
                tool: tool.to_string(),
                arg_hash: arg_hash.to_string(),
            },
            CacheEntry {
                result,
                cached_at: now,
            },
        );
        tracing::debug!("tool_result_cached: tool={}, arg_hash={}", tool, arg_hash);
    }

    pub fn get(&mut self, tool: &str, arg_hash: &str) -> Option<CachedResult> {
        self.get_at(tool, arg_hash, Utc::now())
    }

    /// Look up an entry, evicting it if it is older than the TTL.
    pub fn get_at(&mut self, tool: &str, arg_hash: &str, now: DateTime<Utc>) -> Option<CachedResult> {
        let key = CacheKey {
            tool: tool.to_string(),
            arg_hash: arg_hash.to_string(),
        };
        let entry = self.entries.get(&key)?;

        if now - entry.cached_at >= self.ttl {
            self.entries.remove(&key);
            tracing::debug!("tool_result_expired: tool={}, arg_hash={}", tool, arg_hash);
            return None;
        }

        Some(CachedResult {
            result: entry.result.clone(),
            cached: true,
            cached_at: entry.cached_at,
        })
    }

    /// Remove every entry; returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        tracing::info!("tool_cache_cleared: removed={}", removed);
        removed
    }

    /// Drop expired entries without waiting for a read.
    pub fn purge_expired_at(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, e| now - e.cached_at < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut tools: Vec<String> = self.entries.keys().map(|k| k.tool.clone()).collect();
        tools.sort();
        tools.dedup();
        CacheStats {
            entries: self.entries.len(),
            ttl_seconds: self.ttl.num_seconds().max(0) as u64,
            tools,
        }
    }
}

impl Default for ToolResultCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
