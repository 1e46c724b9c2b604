//! Cache Entry Module
//!
//! Defines the recency-list node holding one key, its value and its expiry.

use tokio::time::Instant;

// == Node Id ==
/// Stable index of an entry inside a shard's node pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Slot reserved for the recency list's sentinel root.
    pub(crate) const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

// == Cache Entry ==
/// A single cache entry linked into a recency list.
///
/// `key` and `value` are `None` only while the node sits in the pool (or for
/// the sentinel root).
#[derive(Debug)]
pub struct Entry<K, V> {
    pub(crate) key: Option<K>,
    pub(crate) value: Option<V>,
    /// Absolute expiry, None = never expires
    pub(crate) expires_at: Option<Instant>,
    pub(crate) prev: NodeId,
    pub(crate) next: NodeId,
    /// Set while the node is threaded into the list
    pub(crate) linked: bool,
}

impl<K, V> Entry<K, V> {
    // == Constructor ==
    /// Creates an empty, unlinked entry pointing at itself.
    pub(crate) fn vacant(id: NodeId) -> Self {
        Self {
            key: None,
            value: None,
            expires_at: None,
            prev: id,
            next: id,
            linked: false,
        }
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    // == Is Expired ==
    /// Checks whether the entry expired strictly before `now`.
    ///
    /// Entries without an expiry never match.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => expires < now,
            None => false,
        }
    }

    // == Reset ==
    /// Drops the key, value and expiry so a pooled node retains nothing.
    pub(crate) fn reset(&mut self) {
        self.key = None;
        self.value = None;
        self.expires_at = None;
        self.linked = false;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_vacant_entry() {
        let entry: Entry<String, String> = Entry::vacant(NodeId(3));
        assert!(entry.key().is_none());
        assert!(entry.value().is_none());
        assert!(entry.expires_at().is_none());
        assert_eq!(entry.prev, NodeId(3));
        assert_eq!(entry.next, NodeId(3));
        assert!(!entry.linked);
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let entry: Entry<String, String> = Entry::vacant(NodeId(1));
        let far = Instant::now() + Duration::from_secs(365 * 24 * 3600);
        assert!(!entry.is_expired_at(far));
    }

    #[test]
    fn test_expiration_is_strict() {
        let now = Instant::now();
        let mut entry: Entry<String, String> = Entry::vacant(NodeId(1));
        entry.expires_at = Some(now);

        assert!(!entry.is_expired_at(now), "expiry equal to now is not expired");
        assert!(entry.is_expired_at(now + Duration::from_millis(1)));
    }

    #[test]
    fn test_reset_clears_payload() {
        let mut entry = Entry::vacant(NodeId(1));
        entry.key = Some("k".to_string());
        entry.value = Some(vec![1u8, 2, 3]);
        entry.expires_at = Some(Instant::now());
        entry.linked = true;

        entry.reset();

        assert!(entry.key().is_none());
        assert!(entry.value().is_none());
        assert!(entry.expires_at().is_none());
        assert!(!entry.linked);
    }
}
