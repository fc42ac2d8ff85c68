//! Strict LRU eviction backend. No LFU/FIFO variants (out of scope).

use std::hash::Hash;
use std::num::NonZeroUsize;

/// Thin wrapper over [`lru::LruCache`] giving us promotion-on-access and a `peek` that does
/// not count as a recency touch (used by `Scan`/`Keys`, which must not disturb order).
pub(crate) struct LruStore<K, V> {
    cache: lru::LruCache<K, V>,
}

impl<K: Hash + Eq, V> LruStore<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            cache: lru::LruCache::new(cap),
        }
    }

    pub(crate) fn get(&mut self, key: &K) -> Option<&V> {
        self.cache.get(key)
    }

    pub(crate) fn peek(&self, key: &K) -> Option<&V> {
        self.cache.peek(key)
    }

    /// Inserts `value`, returning the evicted `(key, value)` pair if the store was full.
    pub(crate) fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.cache.push(key, value)
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<V> {
        self.cache.pop(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.cache.len()
    }

    pub(crate) fn clear(&mut self) {
        self.cache.clear();
    }

    /// Least-to-most-recently-used key iterator, used by `Keys`/`Scan`.
    pub(crate) fn keys_lru_order(&self) -> impl Iterator<Item = &K> {
        self.cache.iter().rev().map(|(k, _)| k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut store = LruStore::new(2);
        store.insert("a", 1);
        store.insert("b", 2);
        assert_eq!(store.get(&"a"), Some(&1)); // promotes "a"

        let evicted = store.insert("c", 3);
        assert_eq!(evicted, Some(("b", 2)));
        assert_eq!(store.get(&"b"), None);
        assert_eq!(store.get(&"a"), Some(&1));
        assert_eq!(store.get(&"c"), Some(&3));
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut store = LruStore::new(3);
        for i in 0..10 {
            store.insert(i, i);
        }
        assert_eq!(store.len(), 3);
    }

    proptest! {
        #[test]
        fn len_never_exceeds_capacity_for_any_insert_sequence(capacity in 1usize..16, keys in prop::collection::vec(0u32..32, 0..64)) {
            let mut store = LruStore::new(capacity);
            for k in keys {
                store.insert(k, k);
                prop_assert!(store.len() <= capacity);
            }
        }

        #[test]
        fn evicted_key_is_unreachable_afterwards(capacity in 1usize..8, extra in 0u32..64) {
            let mut store = LruStore::new(capacity);
            for k in 0..capacity as u32 {
                store.insert(k, k);
            }
            // Pushing one more key when already at capacity must evict exactly one entry,
            // and that entry must no longer be retrievable.
            if let Some((evicted_key, _)) = store.insert(capacity as u32 + extra, capacity as u32 + extra) {
                prop_assert_eq!(store.get(&evicted_key), None);
                prop_assert!(store.len() <= capacity);
            }
        }
    }
}
