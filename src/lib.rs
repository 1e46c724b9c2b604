//! Shard LRU - A sharded in-memory LRU cache
//!
//! Keys are spread over a fixed number of independently locked shards. Each
//! shard keeps its entries in recency order and evicts the least recently
//! used one once the cache-wide item count reaches its threshold. Entries
//! may carry a TTL; a background task sweeps expired ones.

pub mod cache;
pub mod config;
pub mod error;
pub mod strategy;
pub mod tasks;

pub use cache::{CacheStatus, LruCache, TelemetrySnapshot};
pub use config::{CacheConfig, Hooks};
pub use error::{CacheError, Result};
