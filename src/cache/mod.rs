//! Cache Module
//!
//! Provides a sharded in-memory cache with LRU eviction and TTL sweeping.

use std::fmt::Debug;
use std::hash::Hash;

mod entry;
mod lru;
mod pool;
mod shard;
mod sharded;
mod telemetry;


// Re-export public types
pub use entry::{Entry, NodeId};
pub use lru::{RecencyIter, RecencyList};
pub use pool::NodePool;
pub use shard::{LruShard, SetOutcome};
pub use sharded::{CacheStatus, LruCache};
pub(crate) use sharded::CacheCore;
pub use telemetry::{Counter, Telemetry, TelemetrySnapshot};

// == Key / Value Bounds ==
/// Bounds every cache key satisfies. `K::default()` is the empty key that
/// triggers key generation on `set`.
pub trait CacheKey: Eq + Hash + Clone + Default + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Eq + Hash + Clone + Default + Debug + Send + Sync + 'static {}

/// Bounds every cache value satisfies.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}
