use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use xxhash_rust::xxh3::Xxh3;

/// Hash function seam for a given key type. The index truncates the 64-bit
/// result to its 32-bit fingerprint; tests substitute deterministic
/// implementations to steer routing.
pub trait HashFunction<K>: Send + Sync {
    /// Returns the hash value of the given key.
    fn get_hash(&self, key: &K) -> u64;
}

/// Default hash function backed by xxh3.
#[derive(Debug)]
pub struct Xxh3HashFunction<K> {
    _marker: PhantomData<K>,
}

impl<K> Xxh3HashFunction<K> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K> Default for Xxh3HashFunction<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Send + Sync> HashFunction<K> for Xxh3HashFunction<K> {
    fn get_hash(&self, key: &K) -> u64 {
        let mut hasher = Xxh3::new();
        key.hash(&mut hasher);
        hasher.finish()
    }
}
