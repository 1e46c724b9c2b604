//! Key Strategies
//!
//! Pluggable functions that derive a key from a value and route a key to a
//! shard. The defaults hash with xxh3; any deterministic function works.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use xxhash_rust::xxh3::Xxh3;

/// Derives a key from a value when `set` is called with the empty key.
pub type KeyGenerator<K, V> = Arc<dyn Fn(&V) -> K + Send + Sync>;

/// Maps a key and the configured `max_items` to a shard index.
///
/// The cache reduces the result modulo its shard count, so a router only
/// needs to be deterministic.
pub type ShardRouter<K> = Arc<dyn Fn(&K, usize) -> usize + Send + Sync>;

// == Digest Key ==
/// Key types that can be built from a 128-bit digest.
///
/// Only key types implementing this trait get the default key generator.
pub trait DigestKey: Sized {
    fn from_digest(digest: u128) -> Self;
}

impl DigestKey for String {
    /// Lowercase hex, always 32 characters.
    fn from_digest(digest: u128) -> Self {
        format!("{:032x}", digest)
    }
}

impl DigestKey for Vec<u8> {
    fn from_digest(digest: u128) -> Self {
        digest.to_be_bytes().to_vec()
    }
}

impl DigestKey for u128 {
    fn from_digest(digest: u128) -> Self {
        digest
    }
}

impl DigestKey for u64 {
    fn from_digest(digest: u128) -> Self {
        digest as u64
    }
}

// == Default Key Generator ==
/// Hashes `value` with 128-bit xxh3 and converts the digest into a key.
pub fn generate_key<K, V>(value: &V) -> K
where
    K: DigestKey,
    V: Hash + ?Sized,
{
    let mut hasher = Xxh3::new();
    value.hash(&mut hasher);
    K::from_digest(hasher.digest128())
}

// == Default Shard Router ==
/// Hashes `key` with xxh3 and reduces it modulo `max_items`.
pub fn generate_shard_index<K>(key: &K, max_items: usize) -> usize
where
    K: Hash + ?Sized,
{
    let mut hasher = Xxh3::new();
    key.hash(&mut hasher);
    (hasher.finish() % max_items.max(1) as u64) as usize
}

/// Boxes [`generate_key`] as a [`KeyGenerator`].
pub fn default_key_generator<K, V>() -> KeyGenerator<K, V>
where
    K: DigestKey + 'static,
    V: Hash + 'static,
{
    Arc::new(|value: &V| generate_key::<K, V>(value))
}

/// Boxes [`generate_shard_index`] as a [`ShardRouter`].
pub fn default_shard_router<K>() -> ShardRouter<K>
where
    K: Hash + 'static,
{
    Arc::new(|key: &K, max_items: usize| generate_shard_index(key, max_items))
}
