//! Cache entry and TTL bookkeeping: a three-way fresh/stale/expired freshness split
//! (SPEC_FULL §3) with per-key-prefix default TTLs (§4.1).

use crate::cache::eviction::LruStore;
use std::time::{Duration, Instant};

/// Freshness classification of a cache entry relative to `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// `age < ttl * 0.5`
    Fresh,
    /// `ttl * 0.5 <= age < ttl`
    Stale,
    /// `age >= ttl`
    Expired,
}

/// The fraction of TTL below which an entry is still considered fully fresh (α in §3).
const FRESH_FRACTION: f64 = 0.5;

#[derive(Clone, Debug)]
pub(crate) struct CacheEntry<V> {
    pub(crate) value: V,
    pub(crate) created_at: Instant,
    pub(crate) ttl: Duration,
    pub(crate) hit_count: u64,
    pub(crate) size_estimate: usize,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(value: V, ttl: Duration, size_estimate: usize) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
            hit_count: 0,
            size_estimate,
        }
    }

    pub(crate) fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn freshness(&self) -> Freshness {
        let age = self.age();
        let fresh_cutoff = self.ttl.mul_f64(FRESH_FRACTION);
        if age >= self.ttl {
            Freshness::Expired
        } else if age >= fresh_cutoff {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    pub(crate) fn touch(&mut self, ttl: Option<Duration>) {
        self.created_at = Instant::now();
        if let Some(ttl) = ttl {
            self.ttl = ttl;
        }
    }
}

/// Resolves the default TTL for a fingerprint based on its `<prefix>:...` key-prefix
/// convention (§4.1: quote/historical/financial/news/analysis).
#[derive(Debug, Clone)]
pub struct TtlTable {
    pub quote: Duration,
    pub historical: Duration,
    pub financial: Duration,
    pub news: Duration,
    pub analysis: Duration,
    pub default: Duration,
}

impl Default for TtlTable {
    fn default() -> Self {
        Self {
            quote: Duration::from_secs(15),
            historical: Duration::from_secs(3600),
            financial: Duration::from_secs(86_400),
            news: Duration::from_secs(300),
            analysis: Duration::from_secs(1800),
            default: Duration::from_secs(60),
        }
    }
}

impl TtlTable {
    pub fn resolve(&self, fingerprint: &str) -> Duration {
        let prefix = fingerprint.split(':').next().unwrap_or("");
        match prefix {
            "quote" => self.quote,
            "historical" => self.historical,
            "financial" => self.financial,
            "news" => self.news,
            "analysis" => self.analysis,
            _ => self.default,
        }
    }
}

/// Per-key metadata surfaced by `GetStats`.
#[derive(Debug, Clone)]
pub struct EntryMeta {
    pub key: String,
    pub created_at: Instant,
    pub ttl: Duration,
}

/// Single-threaded cache storage: LRU eviction + TTL freshness. Locking is the caller's
/// responsibility (see `cache::Cache`, which wraps this in a `parking_lot::Mutex`).
pub(crate) struct CacheStore<V> {
    store: LruStore<String, CacheEntry<V>>,
    max_entries: usize,
}

impl<V: Clone> CacheStore<V> {
    pub(crate) fn new(max_entries: usize) -> Self {
        Self {
            store: LruStore::new(max_entries.max(1)),
            max_entries,
        }
    }

    /// `None` if absent or expired (expired entries are evicted on read).
    pub(crate) fn get(&mut self, key: &str) -> Option<V> {
        let expired = matches!(
            self.store.get(&key.to_string()).map(|e| e.freshness()),
            Some(Freshness::Expired)
        );
        if expired {
            self.store.remove(&key.to_string());
            return None;
        }
        self.store.get(&key.to_string()).map(|e| e.value.clone())
    }

    /// Returns the entry (without treating the read as a recency touch), for SWR logic
    /// that needs to see staleness without promoting an about-to-be-discarded entry.
    pub(crate) fn peek_entry(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.store.peek(&key.to_string())
    }

    pub(crate) fn set(&mut self, key: String, value: V, ttl: Duration) -> bool {
        let was_full = self.store.len() >= self.max_entries;
        let size_estimate = std::mem::size_of::<V>();
        self.store
            .insert(key, CacheEntry::new(value, ttl, size_estimate));
        was_full
    }

    pub(crate) fn delete(&mut self, key: &str) -> bool {
        self.store.remove(&key.to_string()).is_some()
    }

    pub(crate) fn has(&self, key: &str) -> bool {
        matches!(
            self.store.peek(&key.to_string()).map(|e| e.freshness()),
            Some(Freshness::Fresh) | Some(Freshness::Stale)
        )
    }

    pub(crate) fn touch(&mut self, key: &str, ttl: Option<Duration>) -> bool {
        if let Some(entry) = self.store.get(&key.to_string()) {
            if entry.freshness() == Freshness::Expired {
                return false;
            }
        } else {
            return false;
        }
        if let Some(entry) = self.store.get(&key.to_string()) {
            entry.touch(ttl);
            true
        } else {
            false
        }
    }

    pub(crate) fn clear(&mut self) {
        self.store.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.store.len()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.store.keys_lru_order().cloned().collect()
    }

    pub(crate) fn total_bytes(&self) -> usize {
        self.store
            .keys_lru_order()
            .filter_map(|k| self.store.peek(k))
            .map(|e| e.size_estimate)
            .sum()
    }
}
