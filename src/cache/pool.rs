//! Node Pool Module
//!
//! Slab of recency-list nodes with a free list, so inserts after an eviction
//! reuse a slot instead of allocating.

use tokio::time::Instant;

use crate::cache::entry::{Entry, NodeId};

// == Node Pool ==
/// Owns every node of one shard, addressed by [`NodeId`].
///
/// Slot 0 always holds the recency list's sentinel root and is never handed
/// out or released.
#[derive(Debug)]
pub struct NodePool<K, V> {
    slots: Vec<Entry<K, V>>,
    free: Vec<NodeId>,
}

impl<K, V> NodePool<K, V> {
    // == Constructor ==
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a pool with room for `capacity` nodes besides the root.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity + 1);
        slots.push(Entry::vacant(NodeId::ROOT));
        Self {
            slots,
            free: Vec::new(),
        }
    }

    // == Acquire ==
    /// Hands out a node holding the given payload.
    ///
    /// A released node is reused when one is pooled; otherwise a new slot is
    /// appended. The node comes back unlinked.
    pub fn acquire(&mut self, key: K, value: V, expires_at: Option<Instant>) -> NodeId {
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                let id = NodeId(self.slots.len());
                self.slots.push(Entry::vacant(id));
                id
            }
        };

        let entry = &mut self.slots[id.0];
        entry.key = Some(key);
        entry.value = Some(value);
        entry.expires_at = expires_at;
        entry.prev = id;
        entry.next = id;
        id
    }

    // == Release ==
    /// Clears the node and returns it to the pool, handing back the key and
    /// value it held.
    ///
    /// Releasing the root or an already pooled node does nothing.
    pub fn release(&mut self, id: NodeId) -> Option<(K, V)> {
        if id == NodeId::ROOT {
            return None;
        }
        let entry = &mut self.slots[id.0];
        let key = entry.key.take()?;
        let value = entry.value.take();
        entry.reset();
        entry.prev = id;
        entry.next = id;
        self.free.push(id);
        value.map(|value| (key, value))
    }

    pub fn get(&self, id: NodeId) -> &Entry<K, V> {
        &self.slots[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Entry<K, V> {
        &mut self.slots[id.0]
    }

    /// Number of released nodes waiting for reuse.
    pub fn pooled(&self) -> usize {
        self.free.len()
    }

    /// Number of nodes ever allocated, excluding the root.
    pub fn allocated(&self) -> usize {
        self.slots.len() - 1
    }
}

impl<K, V> Default for NodePool<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_new() {
        let pool: NodePool<String, String> = NodePool::new();
        assert_eq!(pool.pooled(), 0);
        assert_eq!(pool.allocated(), 0);
    }

    #[test]
    fn test_acquire_allocates_fresh_slots() {
        let mut pool = NodePool::new();
        let a = pool.acquire("a".to_string(), 1, None);
        let b = pool.acquire("b".to_string(), 2, None);

        assert_ne!(a, b);
        assert_ne!(a, NodeId::ROOT);
        assert_eq!(pool.allocated(), 2);
        assert_eq!(pool.get(a).key(), Some(&"a".to_string()));
        assert_eq!(pool.get(b).value(), Some(&2));
    }

    #[test]
    fn test_release_then_acquire_reuses_slot() {
        let mut pool = NodePool::new();
        let a = pool.acquire("a".to_string(), 1, None);
        assert_eq!(pool.release(a), Some(("a".to_string(), 1)));
        assert_eq!(pool.pooled(), 1);

        let b = pool.acquire("b".to_string(), 2, None);
        assert_eq!(a, b);
        assert_eq!(pool.pooled(), 0);
        assert_eq!(pool.allocated(), 1);
        assert_eq!(pool.get(b).key(), Some(&"b".to_string()));
    }

    #[test]
    fn test_release_clears_previous_value() {
        let mut pool = NodePool::new();
        let a = pool.acquire("secret".to_string(), vec![0xAAu8; 8], Some(Instant::now()));
        pool.release(a);

        let entry = pool.get(a);
        assert!(entry.key().is_none());
        assert!(entry.value().is_none());
        assert!(entry.expires_at().is_none());
    }

    #[test]
    fn test_double_release_is_ignored() {
        let mut pool = NodePool::new();
        let a = pool.acquire("a".to_string(), 1, None);
        pool.release(a);
        assert_eq!(pool.release(a), None);
        assert_eq!(pool.pooled(), 1);
    }

    #[test]
    fn test_root_is_never_released() {
        let mut pool: NodePool<String, u32> = NodePool::new();
        assert_eq!(pool.release(NodeId::ROOT), None);
        assert_eq!(pool.pooled(), 0);

        let a = pool.acquire("a".to_string(), 1, None);
        assert_ne!(a, NodeId::ROOT);
    }
}
