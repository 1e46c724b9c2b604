//! Configuration Module
//!
//! Holds the fully resolved settings a cache is built from, the callback
//! hooks it fires, and an optional environment-variable overlay.

use std::env;
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheValue};
use crate::error::{CacheError, Result};
use crate::strategy::{
    default_key_generator, default_shard_router, DigestKey, KeyGenerator, ShardRouter,
};

/// TTL applied by `set_with_ttl` when both the call and the config leave it at zero.
pub const FALLBACK_TTL_SECS: u64 = 60 * 60 * 24;

/// Hook fired with the logging flag and the entry's key and value.
pub type EntryHook<K, V> = Arc<dyn Fn(bool, &K, &V) + Send + Sync>;

/// Hook fired with the logging flag and the key that was not found.
pub type MissHook<K> = Arc<dyn Fn(bool, &K) + Send + Sync>;

// == Hooks ==
/// Observability callbacks invoked by each shard while telemetry is on.
///
/// Hooks never influence the cache: a panicking hook is caught and logged.
#[derive(Clone)]
pub struct Hooks<K, V> {
    pub on_add: EntryHook<K, V>,
    pub on_update: EntryHook<K, V>,
    pub on_hit: EntryHook<K, V>,
    pub on_miss: MissHook<K>,
    pub on_evict: EntryHook<K, V>,
}

impl<K, V> Hooks<K, V> {
    pub(crate) fn added(&self, logging: bool, key: &K, value: &V) {
        guarded("on_add", || (self.on_add)(logging, key, value));
    }

    pub(crate) fn updated(&self, logging: bool, key: &K, value: &V) {
        guarded("on_update", || (self.on_update)(logging, key, value));
    }

    pub(crate) fn hit(&self, logging: bool, key: &K, value: &V) {
        guarded("on_hit", || (self.on_hit)(logging, key, value));
    }

    pub(crate) fn missed(&self, logging: bool, key: &K) {
        guarded("on_miss", || (self.on_miss)(logging, key));
    }

    pub(crate) fn evicted(&self, logging: bool, key: &K, value: &V) {
        guarded("on_evict", || (self.on_evict)(logging, key, value));
    }
}

fn guarded(hook: &'static str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!(hook, "cache hook panicked, ignoring");
    }
}

impl<K: fmt::Debug + 'static, V: 'static> Default for Hooks<K, V> {
    /// Emits a `debug` event per callback when logging is on.
    fn default() -> Self {
        Self {
            on_add: Arc::new(|logging: bool, key: &K, _: &V| {
                if logging {
                    debug!(?key, "cache.add");
                }
            }),
            on_update: Arc::new(|logging: bool, key: &K, _: &V| {
                if logging {
                    debug!(?key, "cache.update");
                }
            }),
            on_hit: Arc::new(|logging: bool, key: &K, _: &V| {
                if logging {
                    debug!(?key, "cache.hit");
                }
            }),
            on_miss: Arc::new(|logging: bool, key: &K| {
                if logging {
                    debug!(?key, "cache.miss");
                }
            }),
            on_evict: Arc::new(|logging: bool, key: &K, _: &V| {
                if logging {
                    debug!(?key, "cache.evict");
                }
            }),
        }
    }
}

impl<K, V> fmt::Debug for Hooks<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

// == Cache Config ==
/// Cache configuration.
///
/// Shard count and capacity are fixed once a cache is built from it.
#[derive(Clone)]
pub struct CacheConfig<K, V> {
    /// Number of independently locked shards
    pub shard_count: usize,
    /// Cache-wide item threshold checked on every insert
    pub max_items: usize,
    /// Emit lifecycle and sweep logs, passed to every hook
    pub logging_enabled: bool,
    /// Count telemetry and fire hooks
    pub telemetry_enabled: bool,
    /// TTL used by `set_with_ttl(.., 0)`, 0 = 24h
    pub default_ttl_secs: u64,
    /// Seconds between background sweeps
    pub cleanup_interval_secs: u64,
    /// Derives a key for `set` calls made with the empty key
    pub generate_key: KeyGenerator<K, V>,
    /// Routes a key to a shard
    pub generate_shard_index: ShardRouter<K>,
    pub hooks: Hooks<K, V>,
}

impl<K: CacheKey, V: CacheValue> CacheConfig<K, V> {
    // == Constructor ==
    /// Creates a config with default settings and the given key generator.
    ///
    /// Use this for key/value types the default generator does not support.
    pub fn new(generate_key: KeyGenerator<K, V>) -> Self {
        Self {
            shard_count: 256,
            max_items: 1_000_000,
            logging_enabled: true,
            telemetry_enabled: true,
            default_ttl_secs: FALLBACK_TTL_SECS,
            cleanup_interval_secs: 60 * 5,
            generate_key,
            generate_shard_index: default_shard_router(),
            hooks: Hooks::default(),
        }
    }

    /// Overlays settings from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_SHARD_COUNT` - Number of shards
    /// - `CACHE_MAX_ITEMS` - Cache-wide item threshold
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds
    /// - `CACHE_CLEANUP_INTERVAL` - Sweep frequency in seconds
    /// - `CACHE_LOGGING` - `true` / `false`
    /// - `CACHE_TELEMETRY` - `true` / `false`
    ///
    /// Missing or unparsable values keep the current setting.
    pub fn with_env_overrides(mut self) -> Self {
        self.shard_count = env_or("CACHE_SHARD_COUNT", self.shard_count);
        self.max_items = env_or("CACHE_MAX_ITEMS", self.max_items);
        self.default_ttl_secs = env_or("CACHE_DEFAULT_TTL", self.default_ttl_secs);
        self.cleanup_interval_secs = env_or("CACHE_CLEANUP_INTERVAL", self.cleanup_interval_secs);
        self.logging_enabled = env_or("CACHE_LOGGING", self.logging_enabled);
        self.telemetry_enabled = env_or("CACHE_TELEMETRY", self.telemetry_enabled);
        self
    }

    pub fn with_shard_router(mut self, router: ShardRouter<K>) -> Self {
        self.generate_shard_index = router;
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks<K, V>) -> Self {
        self.hooks = hooks;
        self
    }

    // == Derived Durations ==
    /// Default TTL, with 0 resolved to 24 hours.
    pub fn default_ttl(&self) -> Duration {
        match self.default_ttl_secs {
            0 => Duration::from_secs(FALLBACK_TTL_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    // == Validate ==
    /// Rejects settings the cache cannot be built from.
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            return Err(CacheError::InvalidConfig(
                "shard_count must be at least 1".to_string(),
            ));
        }
        if self.max_items == 0 {
            return Err(CacheError::InvalidConfig(
                "max_items must be at least 1".to_string(),
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(CacheError::InvalidConfig(
                "cleanup_interval_secs must be greater than 0".to_string(),
            ));
        }
        if !fits_instant(self.cleanup_interval()) {
            return Err(CacheError::InvalidConfig(format!(
                "cleanup_interval_secs {} is out of range",
                self.cleanup_interval_secs
            )));
        }
        if !fits_instant(self.default_ttl()) {
            return Err(CacheError::InvalidConfig(format!(
                "default_ttl_secs {} is out of range",
                self.default_ttl_secs
            )));
        }
        Ok(())
    }
}

/// Whether `duration` can be added to the current instant.
fn fits_instant(duration: Duration) -> bool {
    Instant::now().checked_add(duration).is_some()
}

impl<K, V> CacheConfig<K, V>
where
    K: CacheKey + DigestKey,
    V: CacheValue + Hash,
{
    /// Creates a config using the default xxh3 key generator and router.
    pub fn with_default_strategies() -> Self {
        Self::new(default_key_generator())
    }

    /// Creates a default config and overlays environment variables.
    pub fn from_env() -> Self {
        Self::with_default_strategies().with_env_overrides()
    }
}

impl<K, V> Default for CacheConfig<K, V>
where
    K: CacheKey + DigestKey,
    V: CacheValue + Hash,
{
    fn default() -> Self {
        Self::with_default_strategies()
    }
}

impl<K, V> fmt::Debug for CacheConfig<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("shard_count", &self.shard_count)
            .field("max_items", &self.max_items)
            .field("logging_enabled", &self.logging_enabled)
            .field("telemetry_enabled", &self.telemetry_enabled)
            .field("default_ttl_secs", &self.default_ttl_secs)
            .field("cleanup_interval_secs", &self.cleanup_interval_secs)
            .finish_non_exhaustive()
    }
}

fn env_or<T: std::str::FromStr>(name: &str, current: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(current)
}
