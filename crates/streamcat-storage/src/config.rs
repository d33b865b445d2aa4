//! Engine configuration.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Knobs for the query executor. Passed by value at construction; there is no
/// process-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Per-statement timeout in milliseconds. `None` means unbounded.
    pub query_timeout_ms: Option<u64>,
    /// Prepared-statement cache capacity. `None` disables statement caching
    /// and every call runs on a fresh connection.
    pub statement_cache_size: Option<usize>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: Some(30_000),
            statement_cache_size: None,
        }
    }
}

/// Knobs for the entity read cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entities held in memory.
    pub capacity: usize,
}

impl CacheConfig {
    /// Capacity as the LRU's required non-zero bound. A configured zero is
    /// treated as one.
    pub fn bounded_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}
