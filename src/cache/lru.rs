//! Recency List Module
//!
//! Implements the doubly linked list that orders a shard's entries for LRU
//! eviction. Links are [`NodeId`]s into the shard's [`NodePool`], and a
//! sentinel root in slot 0 closes the ring so the empty and non-empty cases
//! share one code path.
//!
//! ```text
//!   root ─► [front / MRU] ◄──► ... ◄──► [back / LRU] ─► root
//! ```

use tokio::time::Instant;

use crate::cache::entry::{Entry, NodeId};
use crate::cache::pool::NodePool;

// == Recency List ==
/// Orders entries from most recently used (front) to least recently used
/// (back). Every operation is O(1) and reordering never allocates.
#[derive(Debug)]
pub struct RecencyList<K, V> {
    pool: NodePool<K, V>,
    len: usize,
}

impl<K, V> RecencyList<K, V> {
    // == Constructor ==
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty list with room for `capacity` nodes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pool: NodePool::with_capacity(capacity),
            len: 0,
        }
    }

    // == Node Lifecycle ==
    /// Takes a node from the pool. The node is not linked yet.
    pub fn acquire(&mut self, key: K, value: V, expires_at: Option<Instant>) -> NodeId {
        self.pool.acquire(key, value, expires_at)
    }

    /// Unlinks the node if needed and hands it back to the pool, returning
    /// the payload it held.
    pub fn release(&mut self, id: NodeId) -> Option<(K, V)> {
        self.remove(id);
        self.pool.release(id)
    }

    // == Push Front ==
    /// Links a node right after the root. A node already in the list is
    /// moved instead.
    pub fn push_front(&mut self, id: NodeId) -> NodeId {
        if id == NodeId::ROOT {
            return id;
        }
        if self.pool.get(id).linked {
            self.move_to_front(id);
            return id;
        }
        self.link_after(id, NodeId::ROOT);
        self.len += 1;
        id
    }

    // == Remove ==
    /// Unlinks a node. Nodes not in this list are left untouched.
    pub fn remove(&mut self, id: NodeId) {
        if id == NodeId::ROOT || !self.pool.get(id).linked {
            return;
        }
        self.unlink(id);
        self.len -= 1;
    }

    // == Move To Front ==
    /// Marks a node as most recently used.
    pub fn move_to_front(&mut self, id: NodeId) {
        if id == NodeId::ROOT || !self.pool.get(id).linked {
            return;
        }
        if self.pool.get(NodeId::ROOT).next == id {
            return;
        }
        self.unlink(id);
        self.link_after(id, NodeId::ROOT);
    }

    // == Accessors ==
    /// Returns the most recently used node.
    pub fn front(&self) -> Option<NodeId> {
        if self.len == 0 {
            return None;
        }
        Some(self.pool.get(NodeId::ROOT).next)
    }

    /// Returns the least recently used node.
    pub fn back(&self) -> Option<NodeId> {
        if self.len == 0 {
            return None;
        }
        Some(self.pool.get(NodeId::ROOT).prev)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn entry(&self, id: NodeId) -> &Entry<K, V> {
        self.pool.get(id)
    }

    pub fn entry_mut(&mut self, id: NodeId) -> &mut Entry<K, V> {
        self.pool.get_mut(id)
    }

    pub fn pool(&self) -> &NodePool<K, V> {
        &self.pool
    }

    /// Iterates node ids from front (MRU) to back (LRU).
    pub fn iter_ids(&self) -> RecencyIter<'_, K, V> {
        RecencyIter {
            list: self,
            current: self.pool.get(NodeId::ROOT).next,
            remaining: self.len,
        }
    }

    // == Link Algebra ==
    fn link_after(&mut self, id: NodeId, at: NodeId) {
        let next = self.pool.get(at).next;
        {
            let entry = self.pool.get_mut(id);
            entry.prev = at;
            entry.next = next;
            entry.linked = true;
        }
        self.pool.get_mut(at).next = id;
        self.pool.get_mut(next).prev = id;
    }

    fn unlink(&mut self, id: NodeId) {
        let (prev, next) = {
            let entry = self.pool.get(id);
            (entry.prev, entry.next)
        };
        self.pool.get_mut(prev).next = next;
        self.pool.get_mut(next).prev = prev;

        let entry = self.pool.get_mut(id);
        entry.prev = id;
        entry.next = id;
        entry.linked = false;
    }

    /// Walks the ring front to back, checking back links and `len`.
    pub fn debug_validate_invariants(&self) {
        let mut count = 0;
        let mut prev = NodeId::ROOT;
        let mut current = self.pool.get(NodeId::ROOT).next;
        while current != NodeId::ROOT {
            let entry = self.pool.get(current);
            assert!(entry.linked, "node {:?} reachable but not linked", current);
            assert!(entry.key.is_some(), "linked node {:?} has no key", current);
            assert_eq!(entry.prev, prev, "broken back link at {:?}", current);
            prev = current;
            current = entry.next;
            count += 1;
            assert!(count <= self.len, "list longer than len {}", self.len);
        }
        assert_eq!(self.pool.get(NodeId::ROOT).prev, prev);
        assert_eq!(count, self.len);
    }
}

impl<K, V> Default for RecencyList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// == Iterator ==
/// Front-to-back iterator over node ids.
pub struct RecencyIter<'a, K, V> {
    list: &'a RecencyList<K, V>,
    current: NodeId,
    remaining: usize,
}

impl<K, V> Iterator for RecencyIter<'_, K, V> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.current == NodeId::ROOT {
            return None;
        }
        let id = self.current;
        self.current = self.list.pool.get(id).next;
        self.remaining -= 1;
        Some(id)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &RecencyList<String, u32>) -> Vec<String> {
        list.iter_ids()
            .filter_map(|id| list.entry(id).key().cloned())
            .collect()
    }

    fn push(list: &mut RecencyList<String, u32>, key: &str) -> NodeId {
        let id = list.acquire(key.to_string(), 0, None);
        list.push_front(id)
    }

    #[test]
    fn test_list_new() {
        let list: RecencyList<String, u32> = RecencyList::new();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert_eq!(list.front(), None);
        assert_eq!(list.back(), None);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_push_front_orders_mru_first() {
        let mut list = RecencyList::new();
        let a = push(&mut list, "a");
        push(&mut list, "b");
        let c = push(&mut list, "c");

        assert_eq!(list.len(), 3);
        assert_eq!(list.front(), Some(c));
        assert_eq!(list.back(), Some(a));
        assert_eq!(keys(&list), vec!["c", "b", "a"]);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_move_to_front() {
        let mut list = RecencyList::new();
        let a = push(&mut list, "a");
        let b = push(&mut list, "b");
        push(&mut list, "c");

        list.move_to_front(a);

        assert_eq!(list.front(), Some(a));
        assert_eq!(list.back(), Some(b));
        assert_eq!(keys(&list), vec!["a", "c", "b"]);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_move_to_front_of_front_is_noop() {
        let mut list = RecencyList::new();
        push(&mut list, "a");
        let b = push(&mut list, "b");

        list.move_to_front(b);

        assert_eq!(keys(&list), vec!["b", "a"]);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_remove_middle() {
        let mut list = RecencyList::new();
        push(&mut list, "a");
        let b = push(&mut list, "b");
        push(&mut list, "c");

        list.remove(b);

        assert_eq!(list.len(), 2);
        assert_eq!(keys(&list), vec!["c", "a"]);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_remove_unlinked_is_noop() {
        let mut list = RecencyList::new();
        push(&mut list, "a");
        let stray = list.acquire("stray".to_string(), 0, None);

        list.remove(stray);
        list.remove(stray);

        assert_eq!(list.len(), 1);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_remove_last_empties_list() {
        let mut list = RecencyList::new();
        let a = push(&mut list, "a");

        list.remove(a);

        assert!(list.is_empty());
        assert_eq!(list.front(), None);
        assert_eq!(list.back(), None);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_push_front_of_linked_node_moves_it() {
        let mut list = RecencyList::new();
        let a = push(&mut list, "a");
        push(&mut list, "b");

        list.push_front(a);

        assert_eq!(list.len(), 2);
        assert_eq!(keys(&list), vec!["a", "b"]);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_release_returns_payload_and_recycles() {
        let mut list = RecencyList::new();
        let a = push(&mut list, "a");
        push(&mut list, "b");

        let payload = list.release(a);

        assert_eq!(payload, Some(("a".to_string(), 0)));
        assert_eq!(list.len(), 1);
        assert_eq!(list.pool().pooled(), 1);

        let c = push(&mut list, "c");
        assert_eq!(c, a, "released slot should be reused");
        assert_eq!(keys(&list), vec!["c", "b"]);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_evict_back_repeatedly() {
        let mut list = RecencyList::new();
        for key in ["a", "b", "c", "d"] {
            push(&mut list, key);
        }
        let a = list.entry(list.back().unwrap()).key().cloned();
        assert_eq!(a.as_deref(), Some("a"));

        let mut evicted = Vec::new();
        while let Some(id) = list.back() {
            if let Some((key, _)) = list.release(id) {
                evicted.push(key);
            }
        }
        assert_eq!(evicted, vec!["a", "b", "c", "d"]);
        list.debug_validate_invariants();
    }
}
