//! Sharded Cache Module
//!
//! The public cache: routes each key to one of a fixed set of lock-guarded
//! shards, gates every operation on the lifecycle status, and keeps an
//! approximate cache-wide item count.
//!
//! # Approximate length
//! The item count is adjusted after the shard lock is released, so under
//! concurrent writes it can briefly over- or under-count. It converges once
//! traffic settles, and it is the value shards compare against `max_items`.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::cache::shard::LruShard;
use crate::cache::telemetry::TelemetrySnapshot;
use crate::cache::{CacheKey, CacheValue};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::strategy::{KeyGenerator, ShardRouter};
use crate::tasks::CleanupScheduler;

// == Cache Status ==
/// Lifecycle of a cache.
///
/// `Opened -> Started -> (Stopped <-> Started) -> Closed`; `Closed` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum CacheStatus {
    Opened = 0,
    Started = 1,
    Stopped = 2,
    Closed = 3,
}

impl CacheStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => CacheStatus::Opened,
            1 => CacheStatus::Started,
            2 => CacheStatus::Stopped,
            _ => CacheStatus::Closed,
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheStatus::Opened => "opened",
            CacheStatus::Started => "started",
            CacheStatus::Stopped => "stopped",
            CacheStatus::Closed => "closed",
        };
        f.write_str(name)
    }
}

// == Cache Core ==
/// State shared between the cache handle and its cleanup task.
pub(crate) struct CacheCore<K, V> {
    pub(crate) shards: Box<[RwLock<LruShard<K, V>>]>,
    len: AtomicI64,
    status: AtomicU8,
    max_items: usize,
    logging_enabled: bool,
    telemetry_enabled: bool,
    default_ttl: Duration,
    generate_key: KeyGenerator<K, V>,
    generate_shard_index: ShardRouter<K>,
}

impl<K: CacheKey, V: CacheValue> CacheCore<K, V> {
    pub(crate) fn new(config: &CacheConfig<K, V>) -> Self {
        let shards = (0..config.shard_count)
            .map(|id| RwLock::new(LruShard::new(id, config)))
            .collect();

        Self {
            shards,
            len: AtomicI64::new(0),
            status: AtomicU8::new(CacheStatus::Opened as u8),
            max_items: config.max_items,
            logging_enabled: config.logging_enabled,
            telemetry_enabled: config.telemetry_enabled,
            default_ttl: config.default_ttl(),
            generate_key: config.generate_key.clone(),
            generate_shard_index: config.generate_shard_index.clone(),
        }
    }

    pub(crate) fn logging_enabled(&self) -> bool {
        self.logging_enabled
    }

    fn status(&self) -> CacheStatus {
        CacheStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: CacheStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn shard_for(&self, key: &K) -> &RwLock<LruShard<K, V>> {
        let index = (self.generate_shard_index)(key, self.max_items) % self.shards.len();
        &self.shards[index]
    }

    // == Cleanup Shards ==
    /// Sweeps every shard concurrently, each under its own write lock, and
    /// subtracts what was evicted from the approximate length.
    ///
    /// Returns the total number of entries evicted.
    pub(crate) async fn cleanup_shards(self: &Arc<Self>) -> usize {
        let now = Instant::now();
        let mut sweeps = JoinSet::new();

        for index in 0..self.shards.len() {
            let core = Arc::clone(self);
            sweeps.spawn(async move {
                let evicted = core.shards[index].write().await.cleanup(now);
                core.len.fetch_sub(evicted as i64, Ordering::Relaxed);
                evicted
            });
        }

        let mut total = 0;
        while let Some(result) = sweeps.join_next().await {
            match result {
                Ok(evicted) => total += evicted,
                Err(err) => warn!(%err, "shard sweep failed"),
            }
        }
        total
    }
}

// == LRU Cache ==
/// Thread-safe sharded LRU cache with TTL sweeping.
///
/// Share it between tasks behind an `Arc`. Building one spawns the background
/// sweep on the current tokio runtime.
pub struct LruCache<K, V> {
    core: Arc<CacheCore<K, V>>,
    scheduler: CleanupScheduler,
}

impl<K: CacheKey, V: CacheValue> LruCache<K, V> {
    // == Constructor ==
    /// Builds a cache from `config` and starts it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: CacheConfig<K, V>) -> Result<Self> {
        Self::with_shutdown(config, std::future::pending::<()>())
    }

    /// Like [`LruCache::new`], and the background sweep also ends once
    /// `signal` completes.
    pub fn with_shutdown<F>(config: CacheConfig<K, V>, signal: F) -> Result<Self>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|err| CacheError::Runtime(err.to_string()))?;

        let core = Arc::new(CacheCore::new(&config));
        let scheduler = CleanupScheduler::spawn(
            &runtime,
            Arc::clone(&core),
            config.cleanup_interval(),
            signal,
        );

        let cache = Self { core, scheduler };
        cache.start()?;
        Ok(cache)
    }

    // == Lifecycle ==
    pub fn status(&self) -> CacheStatus {
        self.core.status()
    }

    /// Allows operations to proceed.
    pub fn start(&self) -> Result<()> {
        self.transition(CacheStatus::Started)?;
        if self.core.logging_enabled {
            info!("cache is started");
        }
        Ok(())
    }

    /// Rejects reads and writes until the cache is started again.
    pub fn stop(&self) -> Result<()> {
        self.transition(CacheStatus::Stopped)?;
        if self.core.logging_enabled {
            info!("cache is stopped");
        }
        Ok(())
    }

    fn transition(&self, to: CacheStatus) -> Result<()> {
        self.core
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                match CacheStatus::from_u8(raw) {
                    CacheStatus::Closed => None,
                    _ => Some(to as u8),
                }
            })
            .map(|_| ())
            .map_err(|_| CacheError::Closed)
    }

    /// Stops the cache, ends the background sweep, drops every entry and
    /// moves to `Closed`. Closing twice is a no-op.
    pub async fn close(&self) {
        if self.status() == CacheStatus::Closed {
            return;
        }
        self.core.set_status(CacheStatus::Stopped);
        self.scheduler.shutdown();

        for shard in self.core.shards.iter() {
            shard.write().await.purge();
        }
        self.core.len.store(0, Ordering::Relaxed);

        self.core.set_status(CacheStatus::Closed);
        if self.core.logging_enabled {
            info!("cache is closed");
        }
    }

    fn ensure_started(&self, op: &'static str) -> Result<()> {
        match self.status() {
            CacheStatus::Started => Ok(()),
            CacheStatus::Closed => Err(CacheError::Closed),
            CacheStatus::Opened | CacheStatus::Stopped => Err(CacheError::Stopped(op)),
        }
    }

    fn ensure_telemetry(&self) -> Result<()> {
        if self.status() == CacheStatus::Closed {
            return Err(CacheError::Closed);
        }
        if !self.core.telemetry_enabled {
            return Err(CacheError::TelemetryDisabled);
        }
        Ok(())
    }

    // == Accessors ==
    pub fn max_shards(&self) -> usize {
        self.core.shards.len()
    }

    pub fn max_items(&self) -> usize {
        self.core.max_items
    }

    /// Approximate number of items across all shards. Always 0 once closed.
    pub fn len(&self) -> i64 {
        if self.status() == CacheStatus::Closed {
            return 0;
        }
        self.core.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0
    }

    /// Exact item count of one shard, or None if `index` is out of range.
    pub async fn shard_len(&self, index: usize) -> Option<usize> {
        let shard = self.core.shards.get(index)?;
        let len = shard.read().await.len();
        Some(len)
    }

    // == Set ==
    /// Stores `value` under `key` without an expiry and returns the key used.
    ///
    /// The empty key (`K::default()`) is replaced by one derived from the
    /// value.
    pub async fn set(&self, key: K, value: V) -> Result<K> {
        self.ensure_started("set")?;
        self.insert("set", key, value, None).await
    }

    /// Stores `value` under `key`, expiring after `ttl_secs` seconds.
    ///
    /// A TTL of 0 uses the configured default. A TTL too large to represent
    /// as an instant stores the entry without an expiry.
    pub async fn set_with_ttl(&self, key: K, value: V, ttl_secs: u64) -> Result<K> {
        self.ensure_started("set_with_ttl")?;
        let ttl = match ttl_secs {
            0 => self.core.default_ttl,
            secs => Duration::from_secs(secs),
        };
        let expires_at = Instant::now().checked_add(ttl);
        self.insert("set_with_ttl", key, value, expires_at).await
    }

    async fn insert(
        &self,
        op: &'static str,
        key: K,
        value: V,
        expires_at: Option<Instant>,
    ) -> Result<K> {
        let key = if key == K::default() {
            (self.core.generate_key)(&value)
        } else {
            key
        };

        let outcome = {
            let mut shard = self.core.shard_for(&key).write().await;
            // close() may have purged this shard while we waited for the lock
            self.ensure_started(op)?;
            shard.set(self.len(), key.clone(), value, expires_at)
        };

        if outcome.evicted {
            self.core.len.fetch_sub(1, Ordering::Relaxed);
        }
        if outcome.evicted || outcome.inserted {
            self.core.len.fetch_add(1, Ordering::Relaxed);
        }
        Ok(key)
    }

    // == Reads ==
    /// Returns the value for `key` and marks it most recently used.
    pub async fn get(&self, key: &K) -> Result<Option<V>> {
        self.ensure_started("get")?;
        let mut shard = self.core.shard_for(key).write().await;
        Ok(shard.get(key))
    }

    /// Checks for `key` without changing its recency.
    pub async fn contains(&self, key: &K) -> Result<bool> {
        self.ensure_started("contains")?;
        let shard = self.core.shard_for(key).read().await;
        Ok(shard.contains(key))
    }

    /// Returns the value for `key` without changing its recency.
    pub async fn peek(&self, key: &K) -> Result<Option<V>> {
        self.ensure_started("peek")?;
        let shard = self.core.shard_for(key).read().await;
        Ok(shard.peek(key))
    }

    // == Remove ==
    /// Removes `key`, returning whether it was present.
    pub async fn remove(&self, key: &K) -> Result<bool> {
        self.ensure_started("remove")?;
        let removed = self.core.shard_for(key).write().await.remove(key);
        if removed {
            self.core.len.fetch_sub(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    // == Purge ==
    /// Drops every entry. Only allowed while the cache is stopped.
    pub async fn purge(&self) -> Result<()> {
        match self.status() {
            CacheStatus::Closed => return Err(CacheError::Closed),
            CacheStatus::Stopped => {}
            CacheStatus::Opened | CacheStatus::Started => return Err(CacheError::NotStopped),
        }

        for shard in self.core.shards.iter() {
            shard.write().await.purge();
        }
        self.core.len.store(0, Ordering::Relaxed);
        Ok(())
    }

    // == Telemetry ==
    /// Sums the counters of every shard.
    pub async fn telemetry(&self) -> Result<TelemetrySnapshot> {
        self.ensure_telemetry()?;
        let mut total = TelemetrySnapshot::default();
        for shard in self.core.shards.iter() {
            let snapshot = shard.read().await.telemetry();
            total.accumulate(&snapshot);
        }
        Ok(total)
    }

    /// Zeroes the counters of every shard.
    pub async fn telemetry_reset(&self) -> Result<()> {
        self.ensure_telemetry()?;
        for shard in self.core.shards.iter() {
            shard.write().await.reset_telemetry();
        }
        Ok(())
    }

    // == Cleanup ==
    /// Runs one sweep right away and returns how many entries expired.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        if self.status() == CacheStatus::Closed {
            return Err(CacheError::Closed);
        }
        Ok(self.core.cleanup_shards().await)
    }

    /// Resumes periodic sweeps.
    pub fn cleanup_start(&self) -> Result<()> {
        if self.status() == CacheStatus::Closed {
            return Err(CacheError::Closed);
        }
        self.scheduler.set_active(true);
        Ok(())
    }

    /// Pauses periodic sweeps without changing the lifecycle status.
    pub fn cleanup_stop(&self) -> Result<()> {
        if self.status() == CacheStatus::Closed {
            return Err(CacheError::Closed);
        }
        self.scheduler.set_active(false);
        Ok(())
    }

    /// Checks the map/list invariant of every shard.
    pub async fn debug_validate_invariants(&self) {
        for shard in self.core.shards.iter() {
            shard.read().await.debug_validate_invariants();
        }
    }
}

impl<K, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("shards", &self.core.shards.len())
            .field("max_items", &self.core.max_items)
            .field("len", &self.core.len.load(Ordering::Relaxed))
            .field(
                "status",
                &CacheStatus::from_u8(self.core.status.load(Ordering::Relaxed)),
            )
            .finish()
    }
}
