//! Resilience pipeline wrapping calls to a flaky, rate-limited upstream financial data
//! provider: a result cache (LRU + TTL + stale-while-revalidate + request coalescing), a
//! rate limiter (token bucket + sliding window + concurrency caps + adaptive throttling), a
//! per-endpoint circuit breaker, and an error-sensitive retry policy, composed behind one
//! [`Pipeline::execute`] entry point.
//!
//! The four middlewares are composed as plain async methods rather than a
//! `tower::Service`/`Layer` stack — see [`pipeline`] for why.

mod cache;
mod circuitbreaker;
mod classifier;
mod config;
mod error;
mod events;
mod pipeline;
mod ratelimiter;
mod retry;
mod types;

pub use cache::{Cache, CacheEvent, CacheStats, Freshness, TtlTable};
pub use circuitbreaker::{
    CallToken, CircuitBreaker, CircuitBreakerEvent, CircuitBreakerStats, CircuitConfig, CircuitOpenError, CircuitState,
};
pub use classifier::{classify, RawUpstreamError};
pub use config::{
    CacheConfig, CacheStoreKind, CircuitBreakerConfigOptions, ConfigError, DataCompletionConfig, DataCompletionLevel,
    PipelineConfig, QueueConfig, QueueStrategy, RateLimitConfig, RateLimitStrategy, RetryConfig, RetryStrategyKind,
};
pub use error::{AttemptRecord, ClassifiedError, ErrorKind, PipelineError};
pub use events::{EventListener, EventListeners, FnListener, ResilienceEvent};
pub use pipeline::{Pipeline, PipelineStats};
pub use ratelimiter::{
    AdmissionGuard, RateLimitRejection, RateLimiter, RateLimiterConfig, RateLimiterEvent, RateLimiterStats, WindowCheck,
};
pub use retry::{apply_jitter, BackoffStrategy, RetryEvent, RetryFailure, RetryPolicy, JITTER_FLOOR};
pub use types::{EndpointKey, Fingerprint};
