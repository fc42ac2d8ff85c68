//! Result cache: LRU + per-key TTL + stale-while-revalidate + request coalescing.
//!
//! Ties together [`eviction::LruStore`] (eviction backend), [`store::CacheStore`] (TTL /
//! freshness bookkeeping) and [`swr::PendingRevalidations`] (coalesced background refresh)
//! into the public surface named in SPEC_FULL §4.1.

mod eviction;
mod store;
mod swr;

pub use store::{Freshness, TtlTable};

use crate::events::{EventListeners, ResilienceEvent};
use crate::types::Fingerprint;
use parking_lot::Mutex as SyncMutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use store::CacheStore;
use swr::{PendingRevalidations, RevalidationRole};

/// Observability events emitted by the cache: the Hit/Miss/Eviction trio plus the
/// SWR-specific revalidation pair.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Hit { key: String },
    Miss { key: String },
    Stale { key: String },
    Set { key: String },
    Delete { key: String },
    Eviction { key: String },
    RevalidationStarted { key: String },
    RevalidationCompleted { key: String },
    RevalidationFailed { key: String },
}

impl ResilienceEvent for CacheEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "hit",
            CacheEvent::Miss { .. } => "miss",
            CacheEvent::Stale { .. } => "stale",
            CacheEvent::Set { .. } => "set",
            CacheEvent::Delete { .. } => "delete",
            CacheEvent::Eviction { .. } => "eviction",
            CacheEvent::RevalidationStarted { .. } => "revalidation_started",
            CacheEvent::RevalidationCompleted { .. } => "revalidation_completed",
            CacheEvent::RevalidationFailed { .. } => "revalidation_failed",
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_hits: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time cache statistics (`GetStats`, SPEC_FULL §4.1).
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_hits: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub entries: usize,
    pub total_bytes: usize,
}

/// The result cache. Cloning shares the underlying store (`Arc`), so one instance can be
/// reused across call sites.
#[derive(Clone)]
pub struct Cache<V> {
    store: Arc<SyncMutex<CacheStore<V>>>,
    ttl_table: Arc<TtlTable>,
    revalidations: Arc<PendingRevalidations>,
    counters: Arc<Counters>,
    events: Arc<EventListeners<CacheEvent>>,
}

impl<V: Clone + Send + Sync + 'static> Cache<V> {
    pub fn new(max_entries: usize, ttl_table: TtlTable) -> Self {
        Self {
            store: Arc::new(SyncMutex::new(CacheStore::new(max_entries))),
            ttl_table: Arc::new(ttl_table),
            revalidations: Arc::new(PendingRevalidations::new()),
            counters: Arc::new(Counters::default()),
            events: Arc::new(EventListeners::new()),
        }
    }

    pub fn with_listener(mut self, listener: impl crate::events::EventListener<CacheEvent> + 'static) -> Self {
        Arc::get_mut(&mut self.events)
            .expect("with_listener must run before the cache is cloned/shared")
            .add(listener);
        self
    }

    /// Plain read. `None` on miss or expiry; does not distinguish stale from fresh (use
    /// [`Cache::get_with_revalidation`] for SWR semantics).
    pub fn get(&self, key: &Fingerprint) -> Option<V> {
        let result = self.store.lock().get(key.as_str());
        if result.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            self.events.emit(&CacheEvent::Hit { key: key.to_string() });
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            self.events.emit(&CacheEvent::Miss { key: key.to_string() });
        }
        result
    }

    pub fn set(&self, key: &Fingerprint, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or_else(|| self.ttl_table.resolve(key.as_str()));
        let was_full = self.store.lock().set(key.as_str().to_string(), value, ttl);
        if was_full {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            self.events.emit(&CacheEvent::Eviction { key: key.to_string() });
        }
        self.events.emit(&CacheEvent::Set { key: key.to_string() });
    }

    pub fn delete(&self, key: &Fingerprint) -> bool {
        let removed = self.store.lock().delete(key.as_str());
        if removed {
            self.events.emit(&CacheEvent::Delete { key: key.to_string() });
        }
        removed
    }

    pub fn clear(&self) {
        self.store.lock().clear();
    }

    pub fn has(&self, key: &Fingerprint) -> bool {
        self.store.lock().has(key.as_str())
    }

    pub fn touch(&self, key: &Fingerprint, ttl: Option<Duration>) -> bool {
        self.store.lock().touch(key.as_str(), ttl)
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.lock().keys()
    }

    /// Glob match over `Keys()`; only `*` is treated as a wildcard (SPEC_FULL §4.1 "Scan
    /// supports a single trailing/leading/interior `*`").
    pub fn scan(&self, pattern: &str) -> Vec<String> {
        self.keys()
            .into_iter()
            .filter(|k| glob_match(pattern, k))
            .collect()
    }

    pub fn mget(&self, keys: &[Fingerprint]) -> Vec<Option<V>> {
        keys.iter().map(|k| self.get(k)).collect()
    }

    pub fn mset(&self, entries: Vec<(Fingerprint, V, Option<Duration>)>) {
        for (key, value, ttl) in entries {
            self.set(&key, value, ttl);
        }
    }

    pub fn mdelete(&self, keys: &[Fingerprint]) -> usize {
        keys.iter().filter(|k| self.delete(k)).count()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let store = self.store.lock();
        CacheStats {
            hits,
            misses,
            stale_hits: self.counters.stale_hits.load(Ordering::Relaxed),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: store.len(),
            total_bytes: store.total_bytes(),
        }
    }

    /// Pre-populates the cache by calling `produce` for each fingerprint, `10` at a time, so
    /// a large warm set does not open thousands of concurrent upstream calls at once. A
    /// single producer error is forwarded to `on_error` and does not abort the remaining
    /// batches (SPEC_FULL §4.1 "Warm ... best-effort, non-aborting").
    pub async fn warm<F, Fut, E>(&self, keys: Vec<Fingerprint>, produce: F, mut on_error: impl FnMut(&Fingerprint, E))
    where
        F: Fn(&Fingerprint) -> Fut + Send + Sync,
        Fut: Future<Output = Result<V, E>> + Send,
    {
        const BATCH: usize = 10;
        for chunk in keys.chunks(BATCH) {
            let results = futures::future::join_all(chunk.iter().map(|k| async {
                let result = produce(k).await;
                (k.clone(), result)
            }))
            .await;
            for (key, result) in results {
                match result {
                    Ok(value) => self.set(&key, value, None),
                    Err(err) => on_error(&key, err),
                }
            }
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Cache<V> {
    /// Fresh → return cached value. Stale → return cached value immediately and kick off a
    /// coalesced background revalidation (at most one per fingerprint). Expired or missing →
    /// await `produce`, coalescing concurrent callers onto a single in-flight call.
    pub async fn get_with_revalidation<F, Fut, E>(
        &self,
        key: &Fingerprint,
        produce: F,
    ) -> Result<V, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Clone + Send + Sync + 'static,
    {
        let freshness_and_value = {
            let store = self.store.lock();
            store
                .peek_entry(key.as_str())
                .map(|e| (e.freshness(), e.value.clone()))
        };

        match freshness_and_value {
            Some((Freshness::Fresh, value)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                self.events.emit(&CacheEvent::Hit { key: key.to_string() });
                Ok(value)
            }
            Some((Freshness::Stale, value)) => {
                self.counters.stale_hits.fetch_add(1, Ordering::Relaxed);
                self.events.emit(&CacheEvent::Stale { key: key.to_string() });
                self.spawn_revalidation(key.clone(), produce);
                Ok(value)
            }
            Some((Freshness::Expired, _)) | None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.events.emit(&CacheEvent::Miss { key: key.to_string() });
                self.fetch_coalesced(key, produce).await
            }
        }
    }

    fn spawn_revalidation<F, Fut, E>(&self, key: Fingerprint, produce: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Send + Sync + 'static,
    {
        let role = self.revalidations.join(key.as_str());
        let guard = match role {
            RevalidationRole::Leader(guard) => guard,
            RevalidationRole::Follower(_) => return,
        };

        let cache = self.clone();
        let ttl = self.ttl_table.resolve(key.as_str());
        tokio::spawn(async move {
            let _guard = guard;
            cache.events.emit(&CacheEvent::RevalidationStarted { key: key.to_string() });
            match produce().await {
                Ok(value) => {
                    cache.store.lock().set(key.as_str().to_string(), value, ttl);
                    cache
                        .events
                        .emit(&CacheEvent::RevalidationCompleted { key: key.to_string() });
                }
                Err(_) => {
                    cache
                        .events
                        .emit(&CacheEvent::RevalidationFailed { key: key.to_string() });
                }
            }
        });
    }

    /// Coalesces concurrent callers onto one `produce` call per fingerprint, sharing the
    /// leader/follower registry used by background revalidation (§4.1 "exactly one upstream
    /// call in flight per fingerprint"). Followers observe the leader's published outcome,
    /// success or failure, rather than re-producing when it fails.
    async fn fetch_coalesced<F, Fut, E>(&self, key: &Fingerprint, produce: F) -> Result<V, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Clone + Send + Sync + 'static,
    {
        loop {
            if let Some(value) = self.store.lock().get(key.as_str()) {
                return Ok(value);
            }
            match self.revalidations.join(key.as_str()) {
                RevalidationRole::Leader(guard) => {
                    let result = produce().await;
                    if let Ok(value) = &result {
                        let ttl = self.ttl_table.resolve(key.as_str());
                        self.store.lock().set(key.as_str().to_string(), value.clone(), ttl);
                    }
                    guard.publish(&result);
                    drop(guard);
                    return result;
                }
                RevalidationRole::Follower(mut rx, outcome) => {
                    let _ = rx.recv().await;
                    if let Some(value) = self.store.lock().get(key.as_str()) {
                        return Ok(value);
                    }
                    if let Some(published) = outcome.get() {
                        if let Some(result) = published.downcast_ref::<Result<V, E>>() {
                            return result.clone();
                        }
                    }
                }
            }
        }
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(rest) = pattern.strip_prefix('*') {
        if let Some(inner) = rest.strip_suffix('*') {
            return text.contains(inner);
        }
        return text.ends_with(rest);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return text.starts_with(prefix);
    }
    pattern == text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> Cache<i32> {
        Cache::new(10, TtlTable::default())
    }

    #[test]
    fn set_then_get_hits() {
        let cache = cache();
        let key = Fingerprint::new("quote:AAPL");
        cache.set(&key, 42, Some(Duration::from_secs(60)));
        assert_eq!(cache.get(&key), Some(42));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn miss_increments_counter() {
        let cache = cache();
        assert_eq!(cache.get(&Fingerprint::new("missing")), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn scan_supports_glob_star() {
        let cache = cache();
        cache.set(&Fingerprint::new("quote:AAPL"), 1, Some(Duration::from_secs(60)));
        cache.set(&Fingerprint::new("quote:MSFT"), 2, Some(Duration::from_secs(60)));
        cache.set(&Fingerprint::new("historical:AAPL"), 3, Some(Duration::from_secs(60)));

        let mut matches = cache.scan("quote:*");
        matches.sort();
        assert_eq!(matches, vec!["quote:AAPL".to_string(), "quote:MSFT".to_string()]);
    }

    #[test]
    fn mset_then_mget_round_trips() {
        let cache = cache();
        let a = Fingerprint::new("a");
        let b = Fingerprint::new("b");
        cache.mset(vec![
            (a.clone(), 1, Some(Duration::from_secs(60))),
            (b.clone(), 2, Some(Duration::from_secs(60))),
        ]);
        assert_eq!(cache.mget(&[a, b]), vec![Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn get_with_revalidation_fetches_on_miss() {
        let cache = cache();
        let key = Fingerprint::new("quote:AAPL");
        let result: Result<i32, String> = cache
            .get_with_revalidation(&key, || async { Ok::<i32, String>(7) })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(cache.get(&key), Some(7));
    }

    #[tokio::test]
    async fn concurrent_miss_fetches_coalesce_to_one_call() {
        let cache = cache();
        let key = Fingerprint::new("quote:AAPL");
        let calls = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let key = key.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_with_revalidation(&key, move || {
                        let calls = Arc::clone(&calls);
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<i32, String>(1)
                        }
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_miss_fetches_coalesce_to_one_call_even_on_failure() {
        let cache = cache();
        let key = Fingerprint::new("quote:AAPL");
        let calls = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let key = key.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_with_revalidation(&key, move || {
                        let calls = Arc::clone(&calls);
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Err::<i32, String>("upstream exploded".to_string())
                        }
                    })
                    .await
            }));
        }
        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "followers must observe the leader's failure, not re-produce");
        assert!(results.iter().all(|r| matches!(r, Err(e) if e == "upstream exploded")));
    }
}
