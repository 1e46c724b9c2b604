//! Cache Shard Module
//!
//! One partition of the cache: a hash map from key to node plus the recency
//! list ordering those nodes. The shard has no locking of its own; the cache
//! wraps each shard in a reader/writer lock.

use std::collections::HashMap;

use tokio::time::Instant;

use crate::cache::entry::NodeId;
use crate::cache::lru::RecencyList;
use crate::cache::telemetry::{Counter, Telemetry, TelemetrySnapshot};
use crate::cache::{CacheKey, CacheValue};
use crate::config::{CacheConfig, Hooks};

// == Set Outcome ==
/// What a shard-level `set` did, used by the cache to adjust its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOutcome {
    /// The least recently used entry was evicted for capacity
    pub evicted: bool,
    /// A new key was inserted without an eviction
    pub inserted: bool,
}

// == LRU Shard ==
/// Map + recency list pair. Every key in `nodes` resolves to a node linked in
/// `list`, and `nodes.len() == list.len()` after every operation.
#[derive(Debug)]
pub struct LruShard<K, V> {
    id: usize,
    max_items: usize,
    logging_enabled: bool,
    telemetry_enabled: bool,
    list: RecencyList<K, V>,
    nodes: HashMap<K, NodeId>,
    telemetry: Telemetry,
    hooks: Hooks<K, V>,
}

impl<K: CacheKey, V: CacheValue> LruShard<K, V> {
    // == Constructor ==
    /// Creates an empty shard taking its limits, flags and hooks from `config`.
    pub fn new(id: usize, config: &CacheConfig<K, V>) -> Self {
        Self {
            id,
            max_items: config.max_items,
            logging_enabled: config.logging_enabled,
            telemetry_enabled: config.telemetry_enabled,
            list: RecencyList::new(),
            nodes: HashMap::new(),
            telemetry: Telemetry::new(),
            hooks: config.hooks.clone(),
        }
    }

    // == Set ==
    /// Inserts or overwrites `key`.
    ///
    /// An existing key gets the new value and expiry in place and moves to
    /// the front. A new key is pushed to the front, and if `cache_len` (the
    /// cache-wide item count, not this shard's) has reached `max_items` the
    /// back entry of this shard is evicted.
    pub fn set(
        &mut self,
        cache_len: i64,
        key: K,
        value: V,
        expires_at: Option<Instant>,
    ) -> SetOutcome {
        if let Some(&id) = self.nodes.get(&key) {
            self.list.move_to_front(id);
            let entry = self.list.entry_mut(id);
            entry.value = Some(value);
            entry.expires_at = expires_at;
            self.notify(Counter::Update, id);
            return SetOutcome {
                evicted: false,
                inserted: false,
            };
        }

        let id = self.list.acquire(key.clone(), value, expires_at);
        self.list.push_front(id);
        self.nodes.insert(key, id);
        self.notify(Counter::Add, id);

        if cache_len >= self.max_items as i64 {
            self.evict_oldest();
            return SetOutcome {
                evicted: true,
                inserted: false,
            };
        }

        SetOutcome {
            evicted: false,
            inserted: true,
        }
    }

    // == Get ==
    /// Returns the value for `key` and marks it most recently used.
    ///
    /// Expiry is not checked here; expired entries stay visible until swept.
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.nodes.get(key) {
            Some(&id) => {
                self.list.move_to_front(id);
                self.notify(Counter::Hit, id);
                self.list.entry(id).value().cloned()
            }
            None => {
                self.notify_miss(key);
                None
            }
        }
    }

    // == Peek ==
    /// Returns the value for `key` without touching its recency.
    pub fn peek(&self, key: &K) -> Option<V> {
        match self.nodes.get(key) {
            Some(&id) => {
                self.notify(Counter::Hit, id);
                self.list.entry(id).value().cloned()
            }
            None => {
                self.notify_miss(key);
                None
            }
        }
    }

    // == Contains ==
    /// Checks whether `key` is present without touching its recency.
    pub fn contains(&self, key: &K) -> bool {
        match self.nodes.get(key) {
            Some(&id) => {
                self.notify(Counter::Hit, id);
                true
            }
            None => {
                self.notify_miss(key);
                false
            }
        }
    }

    // == Remove ==
    /// Removes `key`. Not counted as an eviction; an absent key counts a miss.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.nodes.remove(key) {
            Some(id) => {
                self.list.release(id);
                true
            }
            None => {
                self.notify_miss(key);
                false
            }
        }
    }

    // == Cleanup ==
    /// Evicts every entry whose expiry lies strictly before `now`.
    ///
    /// Scans the whole shard. Returns the number of entries removed.
    pub fn cleanup(&mut self, now: Instant) -> usize {
        let expired: Vec<NodeId> = self
            .list
            .iter_ids()
            .filter(|&id| self.list.entry(id).is_expired_at(now))
            .collect();

        for &id in &expired {
            self.evict(id);
        }
        expired.len()
    }

    // == Purge ==
    /// Drops every entry at once by swapping in a fresh list, pool and map.
    pub fn purge(&mut self) {
        self.list = RecencyList::new();
        self.nodes = HashMap::new();
    }

    // == Telemetry ==
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub fn reset_telemetry(&self) {
        self.telemetry.reset();
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns the keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<K> {
        self.list
            .iter_ids()
            .filter_map(|id| self.list.entry(id).key().cloned())
            .collect()
    }

    // == Internals ==
    fn evict_oldest(&mut self) {
        if let Some(id) = self.list.back() {
            self.evict(id);
        }
    }

    fn evict(&mut self, id: NodeId) {
        if let Some((key, value)) = self.list.release(id) {
            self.nodes.remove(&key);
            if self.telemetry_enabled {
                self.telemetry.record(Counter::Evict, 1);
                self.hooks.evicted(self.logging_enabled, &key, &value);
            }
        }
    }

    fn notify(&self, counter: Counter, id: NodeId) {
        if !self.telemetry_enabled {
            return;
        }
        self.telemetry.record(counter, 1);

        let entry = self.list.entry(id);
        let (Some(key), Some(value)) = (entry.key(), entry.value()) else {
            return;
        };
        let logging = self.logging_enabled;
        match counter {
            Counter::Add => self.hooks.added(logging, key, value),
            Counter::Update => self.hooks.updated(logging, key, value),
            Counter::Hit => self.hooks.hit(logging, key, value),
            Counter::Evict => self.hooks.evicted(logging, key, value),
            Counter::Miss => self.hooks.missed(logging, key),
        }
    }

    fn notify_miss(&self, key: &K) {
        if self.telemetry_enabled {
            self.telemetry.record(Counter::Miss, 1);
            self.hooks.missed(self.logging_enabled, key);
        }
    }

    /// Checks the map/list dual index.
    pub fn debug_validate_invariants(&self) {
        self.list.debug_validate_invariants();
        assert_eq!(
            self.nodes.len(),
            self.list.len(),
            "shard {} map and list disagree",
            self.id
        );
        for (key, &id) in &self.nodes {
            let entry = self.list.entry(id);
            assert!(entry.linked, "shard {} maps {:?} to an unlinked node", self.id, key);
            assert_eq!(entry.key(), Some(key), "shard {} node key mismatch", self.id);
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    type Shard = LruShard<String, String>;

    fn config(max_items: usize) -> CacheConfig<String, String> {
        let mut config = CacheConfig::<String, String>::default();
        config.max_items = max_items;
        config.logging_enabled = false;
        config
    }

    fn shard(max_items: usize) -> Shard {
        LruShard::new(0, &config(max_items))
    }

    /// Mirrors the cache's length bookkeeping for a single-shard setup.
    fn set(shard: &mut Shard, key: &str, value: &str) -> SetOutcome {
        let len = shard.len() as i64;
        shard.set(len, key.to_string(), value.to_string(), None)
    }

    fn key(k: &str) -> String {
        k.to_string()
    }

    #[test]
    fn test_shard_new() {
        let shard = shard(100);
        assert_eq!(shard.len(), 0);
        assert!(shard.is_empty());
        shard.debug_validate_invariants();
    }

    #[test]
    fn test_shard_set_and_get() {
        let mut shard = shard(100);

        let outcome = set(&mut shard, "key1", "value1");

        assert_eq!(
            outcome,
            SetOutcome {
                evicted: false,
                inserted: true
            }
        );
        assert_eq!(shard.get(&key("key1")), Some("value1".to_string()));
        assert_eq!(shard.len(), 1);
        shard.debug_validate_invariants();
    }

    #[test]
    fn test_shard_get_nonexistent() {
        let mut shard = shard(100);
        assert_eq!(shard.get(&key("nonexistent")), None);
        assert_eq!(shard.telemetry().miss, 1);
    }

    #[test]
    fn test_shard_overwrite_is_update() {
        let mut shard = shard(100);

        set(&mut shard, "key1", "value1");
        let outcome = set(&mut shard, "key1", "value2");

        assert_eq!(
            outcome,
            SetOutcome {
                evicted: false,
                inserted: false
            }
        );
        assert_eq!(shard.get(&key("key1")), Some("value2".to_string()));
        assert_eq!(shard.len(), 1);

        let telemetry = shard.telemetry();
        assert_eq!(telemetry.add, 1);
        assert_eq!(telemetry.update, 1);
        shard.debug_validate_invariants();
    }

    #[test]
    fn test_shard_overwrite_moves_to_front() {
        let mut shard = shard(100);
        set(&mut shard, "a", "1");
        set(&mut shard, "b", "2");
        set(&mut shard, "a", "3");

        assert_eq!(shard.keys_by_recency(), vec!["a", "b"]);
    }

    #[test]
    fn test_shard_remove() {
        let mut shard = shard(100);

        set(&mut shard, "key1", "value1");
        assert!(shard.remove(&key("key1")));

        assert!(shard.is_empty());
        assert_eq!(shard.get(&key("key1")), None);
        assert_eq!(shard.telemetry().evict, 0, "removal is not an eviction");
        shard.debug_validate_invariants();
    }

    #[test]
    fn test_shard_remove_nonexistent_counts_miss() {
        let mut shard = shard(100);
        assert!(!shard.remove(&key("nonexistent")));
        assert_eq!(shard.telemetry().miss, 1);
    }

    #[test]
    fn test_shard_lru_eviction() {
        let mut shard = shard(2);

        set(&mut shard, "a", "1");
        set(&mut shard, "b", "2");
        let outcome = set(&mut shard, "c", "3");

        assert!(outcome.evicted);
        assert!(!outcome.inserted);
        assert_eq!(shard.len(), 2);
        assert!(!shard.contains(&key("a")));
        assert!(shard.contains(&key("b")));
        assert!(shard.contains(&key("c")));
        assert_eq!(shard.telemetry().evict, 1);
        shard.debug_validate_invariants();
    }

    #[test]
    fn test_shard_lru_touch_on_get() {
        let mut shard = shard(2);

        set(&mut shard, "a", "1");
        set(&mut shard, "b", "2");
        shard.get(&key("a"));
        set(&mut shard, "c", "3");

        assert!(shard.contains(&key("a")));
        assert!(!shard.contains(&key("b")));
        assert!(shard.contains(&key("c")));
    }

    #[test]
    fn test_shard_eviction_follows_cache_len_not_shard_len() {
        let mut shard = shard(2);

        // Cache-wide count already at the threshold, shard itself nearly empty
        shard.set(5, key("a"), "1".to_string(), None);
        assert!(shard.is_empty(), "insert into an otherwise empty shard evicts itself");

        // Cache-wide count below threshold, shard well over it
        for i in 0..10 {
            shard.set(0, format!("k{}", i), "v".to_string(), None);
        }
        assert_eq!(shard.len(), 10);
        shard.debug_validate_invariants();
    }

    #[test]
    fn test_shard_peek_does_not_reorder() {
        let mut shard = shard(2);

        set(&mut shard, "a", "1");
        set(&mut shard, "b", "2");
        assert_eq!(shard.peek(&key("a")), Some("1".to_string()));
        set(&mut shard, "c", "3");

        assert!(!shard.contains(&key("a")), "peek must not refresh recency");
        assert_eq!(shard.telemetry().hit, 1);
    }

    #[test]
    fn test_shard_get_reorders() {
        let mut shard = shard(100);
        set(&mut shard, "a", "1");
        set(&mut shard, "b", "2");
        set(&mut shard, "c", "3");

        shard.get(&key("a"));

        assert_eq!(shard.keys_by_recency(), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_shard_cleanup_expired() {
        let mut shard = shard(100);
        let now = Instant::now();

        shard.set(0, key("short"), "1".to_string(), Some(now + Duration::from_secs(1)));
        shard.set(1, key("long"), "2".to_string(), Some(now + Duration::from_secs(60)));
        shard.set(2, key("forever"), "3".to_string(), None);

        assert_eq!(shard.cleanup(now), 0);

        let removed = shard.cleanup(now + Duration::from_secs(2));

        assert_eq!(removed, 1);
        assert_eq!(shard.len(), 2);
        assert!(shard.contains(&key("long")));
        assert!(shard.contains(&key("forever")));
        assert_eq!(shard.telemetry().evict, 1);
        shard.debug_validate_invariants();
    }

    #[test]
    fn test_shard_expired_entries_visible_until_swept() {
        let mut shard = shard(100);
        let past = Instant::now() - Duration::from_millis(10);

        shard.set(0, key("stale"), "v".to_string(), Some(past));

        assert_eq!(shard.get(&key("stale")), Some("v".to_string()));
        assert!(shard.contains(&key("stale")));

        shard.cleanup(Instant::now());
        assert!(!shard.contains(&key("stale")));
    }

    #[test]
    fn test_shard_cleanup_never_matches_no_expiry() {
        let mut shard = shard(100);
        set(&mut shard, "a", "1");
        let far = Instant::now() + Duration::from_secs(10 * 365 * 24 * 3600);
        assert_eq!(shard.cleanup(far), 0);
        assert_eq!(shard.len(), 1);
    }

    #[test]
    fn test_shard_purge() {
        let mut shard = shard(100);
        for i in 0..10 {
            set(&mut shard, &format!("k{}", i), "v");
        }

        shard.purge();
        assert!(shard.is_empty());
        shard.purge();
        assert!(shard.is_empty());

        set(&mut shard, "after", "v");
        assert_eq!(shard.len(), 1);
        shard.debug_validate_invariants();
    }

    #[test]
    fn test_shard_reuses_pooled_nodes() {
        let mut shard = shard(3);
        for i in 0..50 {
            set(&mut shard, &format!("k{}", i), "v");
        }
        assert_eq!(shard.len(), 3);
        assert!(shard.list.pool().allocated() <= 4);
        shard.debug_validate_invariants();
    }

    #[test]
    fn test_shard_telemetry_disabled() {
        let mut config = config(100);
        config.telemetry_enabled = false;
        let mut shard: Shard = LruShard::new(0, &config);

        shard.set(0, key("a"), "1".to_string(), None);
        shard.get(&key("a"));
        shard.get(&key("missing"));

        assert_eq!(shard.telemetry(), TelemetrySnapshot::default());
    }

    #[test]
    fn test_shard_reset_telemetry() {
        let mut shard = shard(100);
        set(&mut shard, "a", "1");
        shard.get(&key("a"));
        shard.reset_telemetry();
        assert_eq!(shard.telemetry(), TelemetrySnapshot::default());
    }

    #[test]
    fn test_shard_fires_hooks() {
        let evictions = Arc::new(AtomicUsize::new(0));
        let misses = Arc::new(AtomicUsize::new(0));

        let mut config = config(1);
        let seen = evictions.clone();
        config.hooks.on_evict = Arc::new(move |_: bool, _: &String, _: &String| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let seen = misses.clone();
        config.hooks.on_miss = Arc::new(move |_: bool, _: &String| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let mut shard: Shard = LruShard::new(0, &config);

        set(&mut shard, "a", "1");
        set(&mut shard, "b", "2");
        shard.get(&key("a"));

        assert_eq!(evictions.load(Ordering::SeqCst), 1);
        assert_eq!(misses.load(Ordering::SeqCst), 1);
    }
}
