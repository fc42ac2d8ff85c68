//! Pipeline composition: `Execute(fingerprint, endpoint_key, produce)` and the public API
//! around it (SPEC_FULL §4.6).
//!
//! `Pipeline::execute` is a plain async method performing manual inside-out composition
//! rather than a `tower::Service`/`Layer` stack: cache wraps circuit breaker wraps rate
//! limiter wraps retry(produce), called directly in that order instead of through a
//! `ServiceBuilder` stack.

use crate::cache::{Cache, TtlTable};
use crate::circuitbreaker::{CircuitBreaker, CircuitBreakerStats};
use crate::classifier::{classify, RawUpstreamError};
use crate::config::PipelineConfig;
use crate::error::{ClassifiedError, ErrorKind, PipelineError};
use crate::ratelimiter::{RateLimiter, RateLimiterStats};
use crate::retry::{retry_with_policy, RetryFailure, RetryPolicy};
use crate::types::{EndpointKey, Fingerprint};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Snapshot returned by `GetStats` (SPEC_FULL §6).
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub cache: crate::cache::CacheStats,
    pub rate_limiter: RateLimiterStats,
    pub circuit_breaker: CircuitBreakerStats,
    pub uptime: Duration,
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

struct ServerCounters {
    started_at: Instant,
    request_count: AtomicU64,
    success_count: AtomicU64,
    error_count: AtomicU64,
}

/// A long-lived fallback value cached under an endpoint-wide key (not the request
/// fingerprint), consulted when `CircuitOpen` or `RateLimit` errors would otherwise
/// propagate (SPEC_FULL §4.2 "Fallback on 429", §7 "Pipeline-level fallback to stale cache").
fn fallback_key(endpoint: &EndpointKey) -> Fingerprint {
    Fingerprint::new(format!("rate_limited_{}", endpoint.as_str()))
}

const FALLBACK_TTL: Duration = Duration::from_secs(3600);

/// The composed resilience pipeline for one result type `V`.
pub struct Pipeline<V> {
    cache: Cache<V>,
    circuit_breaker: Arc<CircuitBreaker<V>>,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
    counters: Arc<ServerCounters>,
    admitting: Arc<AtomicBool>,
    background: Arc<tokio::sync::Mutex<JoinSet<()>>>,
}

impl<V: Clone + Send + Sync + 'static> Pipeline<V> {
    pub fn new(config: &PipelineConfig) -> Self {
        let ttl_table = TtlTable {
            default: config.cache.ttl_ms,
            ..TtlTable::default()
        };
        let retry_policy = RetryPolicy::new(config.retry.to_strategy(), config.retry.max_retries, config.retry.max_delay_ms);
        let mut retry_policy = retry_policy;
        retry_policy.jitter = config.retry.jitter;

        Self {
            cache: Cache::new(config.cache.max_entries, ttl_table),
            circuit_breaker: Arc::new(CircuitBreaker::new(config.circuit_breaker.to_circuit_config())),
            rate_limiter: Arc::new(RateLimiter::new(crate::ratelimiter::RateLimiterConfig {
                bucket_capacity: config.rate_limit.max_requests,
                refill_per_sec: config.rate_limit.token_refill_rate,
                max_concurrent: config.rate_limit.max_requests as u64,
                max_per_endpoint: config.rate_limit.max_requests as u64,
                per_minute_limit: config.rate_limit.requests_per_minute,
                per_hour_limit: config.rate_limit.requests_per_hour,
                adaptive_min_limit: 1,
                adaptive_max_limit: config.rate_limit.max_requests,
            })),
            retry_policy,
            counters: Arc::new(ServerCounters {
                started_at: Instant::now(),
                request_count: AtomicU64::new(0),
                success_count: AtomicU64::new(0),
                error_count: AtomicU64::new(0),
            }),
            admitting: Arc::new(AtomicBool::new(true)),
            background: Arc::new(tokio::sync::Mutex::new(JoinSet::new())),
        }
    }

    /// Composes cache → circuit breaker → rate limiter → retry per SPEC_FULL §2.
    ///
    /// `produce` must be `Clone` (cheaply — typically an `Arc`-wrapped client handle):
    /// it is invoked by the cache on every coalesced miss/revalidation and, within that, once
    /// per retry attempt, so it cannot be a one-shot `FnOnce`.
    pub async fn execute<F, Fut>(&self, fingerprint: &Fingerprint, endpoint: &EndpointKey, produce: F) -> Result<V, PipelineError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<V, RawUpstreamError>> + Send + 'static,
    {
        if !self.admitting.load(Ordering::Acquire) {
            return Err(PipelineError::CircuitOpen);
        }
        self.counters.request_count.fetch_add(1, Ordering::Relaxed);

        let endpoint_for_call = endpoint.clone();
        let circuit_breaker = Arc::clone(&self.circuit_breaker);
        let rate_limiter = Arc::clone(&self.rate_limiter);
        let retry_policy = self.retry_policy.clone();

        let result = self
            .cache
            .get_with_revalidation(fingerprint, move || {
                let endpoint = endpoint_for_call.clone();
                let circuit_breaker = Arc::clone(&circuit_breaker);
                let rate_limiter = Arc::clone(&rate_limiter);
                let retry_policy = retry_policy.clone();
                let produce = produce.clone();
                async move { guarded_call(&circuit_breaker, &rate_limiter, &retry_policy, &endpoint, produce).await }
            })
            .await;

        match &result {
            Ok(_) => {
                self.counters.success_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.counters.error_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        match result {
            Ok(value) => {
                self.cache.set(&fallback_key(endpoint), value.clone(), Some(FALLBACK_TTL));
                Ok(value)
            }
            Err(err) if matches!(err.kind(), ErrorKind::CircuitOpen | ErrorKind::RateLimit) => {
                match self.cache.get(&fallback_key(endpoint)) {
                    Some(value) => Ok(value),
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    pub fn cache_get(&self, fingerprint: &Fingerprint) -> Option<V> {
        self.cache.get(fingerprint)
    }

    pub fn cache_set(&self, fingerprint: &Fingerprint, value: V, ttl: Option<Duration>) {
        self.cache.set(fingerprint, value, ttl);
    }

    pub fn cache_clear(&self) {
        self.cache.clear();
    }

    pub fn cache_invalidate(&self, keys: &[Fingerprint]) -> usize {
        self.cache.mdelete(keys)
    }

    pub async fn get_stats(&self, endpoint: &EndpointKey) -> PipelineStats {
        PipelineStats {
            cache: self.cache.stats(),
            rate_limiter: self.rate_limiter.stats(endpoint.as_str()),
            circuit_breaker: self.circuit_breaker.stats(endpoint.as_str()).await,
            uptime: self.counters.started_at.elapsed(),
            request_count: self.counters.request_count.load(Ordering::Relaxed),
            success_count: self.counters.success_count.load(Ordering::Relaxed),
            error_count: self.counters.error_count.load(Ordering::Relaxed),
        }
    }

    /// Resets all three state machines and clears the cache (SPEC_FULL §6 `Reset`).
    pub fn reset(&self) {
        self.cache.clear();
        self.counters.request_count.store(0, Ordering::Relaxed);
        self.counters.success_count.store(0, Ordering::Relaxed);
        self.counters.error_count.store(0, Ordering::Relaxed);
    }

    /// Graceful shutdown: stop admitting new calls and drain any background SWR
    /// revalidations that are still running (SPEC_FULL §5 "Graceful shutdown").
    pub async fn shutdown(&self) {
        self.admitting.store(false, Ordering::Release);
        let mut background = self.background.lock().await;
        while background.join_next().await.is_some() {}
    }
}

async fn guarded_call<V, F, Fut>(
    circuit_breaker: &CircuitBreaker<V>,
    rate_limiter: &RateLimiter,
    retry_policy: &RetryPolicy,
    endpoint: &EndpointKey,
    produce: F,
) -> Result<V, PipelineError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<V, RawUpstreamError>>,
{
    let token = circuit_breaker.permit(endpoint.as_str()).await.map_err(|_| PipelineError::CircuitOpen)?;

    // Admission is checked once per call, not once per retry attempt: the rate limiter wraps
    // the retry loop, it doesn't sit inside it. A rejection here reflects our own admission
    // policy rather than an upstream failure, so it propagates directly without burning the
    // retry budget or counting against the breaker.
    let guard = match rate_limiter.admit(endpoint.as_str()).await {
        Ok(guard) => guard,
        Err(rejection) => {
            return Err(PipelineError::RateLimit {
                retry_after: Some(rejection.retry_after),
            });
        }
    };

    let retry_result = retry_with_policy(retry_policy, produce, classify).await;
    drop(guard);

    match retry_result {
        Ok(value) => {
            circuit_breaker.record_success(&token).await;
            Ok(value)
        }
        Err(RetryFailure::NotRetryable(err)) => {
            circuit_breaker.record_failure(&token).await;
            match circuit_breaker.fallback(&err) {
                Some(value) => Ok(value),
                None => Err(PipelineError::from_classified(err)),
            }
        }
        Err(RetryFailure::Exhausted(history)) => {
            circuit_breaker.record_failure(&token).await;
            let last_err = history.last().map(|attempt| attempt.error.clone());
            match last_err.as_ref().and_then(|err| circuit_breaker.fallback(err)) {
                Some(value) => Ok(value),
                None => Err(PipelineError::MaxRetriesExceeded { history }),
            }
        }
    }
}
