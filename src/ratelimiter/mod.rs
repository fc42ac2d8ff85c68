//! Rate limiter: global token bucket, per-endpoint sliding windows, concurrency caps with a
//! wait queue, and adaptive throttling — the admission algorithm of SPEC_FULL §4.2. The
//! per-endpoint concurrency cap and wait queue are one admission step here, not a standalone
//! bulkhead module.

mod adaptive;
mod sliding_window;
mod token_bucket;

pub use sliding_window::WindowCheck;

use adaptive::AdaptiveThrottle;
use crate::events::{EventListeners, ResilienceEvent};
use parking_lot::Mutex;
use sliding_window::SlidingWindow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use token_bucket::TokenBucket;
use tokio::sync::Notify;

/// Why admission was refused. `retry_after` is the caller's best estimate of how long to
/// wait before trying again.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRejection {
    pub retry_after: Duration,
}

#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    Admitted { endpoint: String },
    Rejected { endpoint: String, retry_after: Duration },
}

impl ResilienceEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::Admitted { .. } => "admitted",
            RateLimiterEvent::Rejected { .. } => "rejected",
        }
    }
}

struct EndpointState {
    in_flight: AtomicU64,
    window: SlidingWindow,
    adaptive: AdaptiveThrottle,
    consecutive_failures: AtomicU64,
}

impl EndpointState {
    fn new(per_minute: u64, per_hour: u64, initial_limit: u32, min_limit: u32, max_limit: u32) -> Self {
        Self {
            in_flight: AtomicU64::new(0),
            window: SlidingWindow::new(per_minute, per_hour),
            adaptive: AdaptiveThrottle::new(initial_limit, min_limit, max_limit),
            consecutive_failures: AtomicU64::new(0),
        }
    }
}

#[derive(Default)]
struct GlobalCounters {
    total_requests: AtomicU64,
    total_rejected: AtomicU64,
    queue_len: AtomicU64,
}

/// Configuration for one [`RateLimiter`] instance (one per pipeline, covering all endpoints).
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub bucket_capacity: u32,
    pub refill_per_sec: f64,
    pub max_concurrent: u64,
    pub max_per_endpoint: u64,
    pub per_minute_limit: u64,
    pub per_hour_limit: u64,
    pub adaptive_min_limit: u32,
    pub adaptive_max_limit: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            bucket_capacity: 10,
            refill_per_sec: 2.0,
            max_concurrent: 20,
            max_per_endpoint: 5,
            per_minute_limit: 60,
            per_hour_limit: 2000,
            adaptive_min_limit: 1,
            adaptive_max_limit: 100,
        }
    }
}

/// Point-in-time rate limiter statistics (SPEC_FULL §4.2 Metrics).
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub tokens_available: f64,
    pub global_in_flight: u64,
    pub queue_length: u64,
    pub total_requests: u64,
    pub total_rejected: u64,
    pub is_rate_limited: bool,
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: TokenBucket,
    global_in_flight: AtomicU64,
    queue_notify: Notify,
    counters: GlobalCounters,
    endpoints: Mutex<HashMap<String, Arc<EndpointState>>>,
    events: EventListeners<RateLimiterEvent>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            bucket: TokenBucket::new(config.bucket_capacity, config.refill_per_sec),
            global_in_flight: AtomicU64::new(0),
            queue_notify: Notify::new(),
            counters: GlobalCounters::default(),
            endpoints: Mutex::new(HashMap::new()),
            events: EventListeners::new(),
            config,
        }
    }

    pub fn with_listener(mut self, listener: impl crate::events::EventListener<RateLimiterEvent> + 'static) -> Self {
        self.events.add(listener);
        self
    }

    fn endpoint_state(&self, endpoint: &str) -> Arc<EndpointState> {
        let mut guard = self.endpoints.lock();
        guard
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                Arc::new(EndpointState::new(
                    self.config.per_minute_limit,
                    self.config.per_hour_limit,
                    self.config.max_per_endpoint as u32,
                    self.config.adaptive_min_limit,
                    self.config.adaptive_max_limit,
                ))
            })
            .clone()
    }

    /// Runs the admission algorithm (§4.2 steps 1-6). On success, the returned guard must be
    /// held for the duration of the call and dropped once it completes so in-flight counters
    /// are released and a waiter (if any) is woken.
    pub async fn admit(&self, endpoint: &str) -> Result<AdmissionGuard<'_>, RateLimitRejection> {
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);
        let state = self.endpoint_state(endpoint);

        // Step 1: per-endpoint concurrency cap, fail fast (no queue wait).
        if state.in_flight.load(Ordering::Acquire) >= self.config.max_per_endpoint {
            return self.reject(endpoint, Duration::from_secs(1));
        }

        // Step 2: sliding window.
        let window_check = state.window.record_and_check();
        if window_check.exceeded() {
            return self.reject(endpoint, Duration::from_secs(60));
        }

        // Step 3: global concurrency cap with wait queue.
        loop {
            if self.global_in_flight.load(Ordering::Acquire) < self.config.max_concurrent {
                break;
            }
            self.counters.queue_len.fetch_add(1, Ordering::Relaxed);
            self.queue_notify.notified().await;
            self.counters.queue_len.fetch_sub(1, Ordering::Relaxed);
        }

        // Step 4: token bucket.
        if !self.bucket.try_consume() {
            let wait = self.bucket.time_until_available();
            return self.reject(endpoint, wait.max(Duration::from_secs(1)));
        }

        // Step 5: predictive check. `u = 1 - (adaptive.remaining / adaptive.current_limit)`,
        // both quantities owned by the adaptive controller itself, fed by `observe_headers`.
        let remaining_fraction = state.adaptive.remaining_fraction();
        let usage_ratio = 1.0 - remaining_fraction;
        let consecutive_failures = state.consecutive_failures.load(Ordering::Relaxed);
        let predicted_danger = remaining_fraction < 0.2 || consecutive_failures >= 2;
        if usage_ratio > 0.7 || predicted_danger {
            return self.reject(endpoint, Duration::from_secs(1));
        }

        // Step 6: admit.
        state.in_flight.fetch_add(1, Ordering::AcqRel);
        self.global_in_flight.fetch_add(1, Ordering::AcqRel);
        self.events.emit(&RateLimiterEvent::Admitted {
            endpoint: endpoint.to_string(),
        });
        Ok(AdmissionGuard {
            limiter: self,
            state,
            endpoint: endpoint.to_string(),
            released: false,
        })
    }

    fn reject(&self, endpoint: &str, retry_after: Duration) -> Result<AdmissionGuard<'_>, RateLimitRejection> {
        self.counters.total_rejected.fetch_add(1, Ordering::Relaxed);
        self.events.emit(&RateLimiterEvent::Rejected {
            endpoint: endpoint.to_string(),
            retry_after,
        });
        Err(RateLimitRejection { retry_after })
    }

    /// Applies upstream `x-ratelimit-*` signals to the endpoint's adaptive controller.
    pub fn observe_headers(&self, endpoint: &str, remaining: Option<u64>, limit: Option<u64>, retry_after: Option<Duration>) {
        let state = self.endpoint_state(endpoint);
        if retry_after.is_some() {
            state.adaptive.record_rejection();
            state.consecutive_failures.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if let (Some(remaining), Some(limit)) = (remaining, limit) {
            let fraction = if limit == 0 { 0.0 } else { remaining as f64 / limit as f64 };
            state.adaptive.record_outcome(fraction);
            if fraction < 0.2 {
                state.consecutive_failures.fetch_add(1, Ordering::Relaxed);
            } else {
                state.consecutive_failures.store(0, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self, endpoint: &str) -> RateLimiterStats {
        let state = self.endpoint_state(endpoint);
        let global_in_flight = self.global_in_flight.load(Ordering::Relaxed);
        RateLimiterStats {
            tokens_available: self.bucket.available(),
            global_in_flight,
            queue_length: self.counters.queue_len.load(Ordering::Relaxed),
            total_requests: self.counters.total_requests.load(Ordering::Relaxed),
            total_rejected: self.counters.total_rejected.load(Ordering::Relaxed),
            is_rate_limited: state.in_flight.load(Ordering::Relaxed) >= self.config.max_per_endpoint
                || global_in_flight >= self.config.max_concurrent,
        }
    }
}

/// Held by an admitted caller; releasing it (via `Drop` or explicit [`AdmissionGuard::release`])
/// decrements in-flight counters and wakes one queued waiter.
pub struct AdmissionGuard<'a> {
    limiter: &'a RateLimiter,
    state: Arc<EndpointState>,
    endpoint: String,
    released: bool,
}

impl<'a> AdmissionGuard<'a> {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn release_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.state.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.limiter.global_in_flight.fetch_sub(1, Ordering::AcqRel);
        self.limiter.queue_notify.notify_one();
    }
}

impl<'a> Drop for AdmissionGuard<'a> {
    fn drop(&mut self) {
        self.release_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_within_per_endpoint_cap() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_per_endpoint: 2,
            ..Default::default()
        });
        let g1 = limiter.admit("quote").await;
        assert!(g1.is_ok());
        let g2 = limiter.admit("quote").await;
        assert!(g2.is_ok());
        let g3 = limiter.admit("quote").await;
        assert!(g3.is_err());
    }

    #[tokio::test]
    async fn releasing_a_guard_frees_the_endpoint_slot() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_per_endpoint: 1,
            ..Default::default()
        });
        {
            let _g = limiter.admit("quote").await.unwrap();
            assert!(limiter.admit("quote").await.is_err());
        }
        assert!(limiter.admit("quote").await.is_ok());
    }

    #[tokio::test]
    async fn exhausting_token_bucket_rejects() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            bucket_capacity: 1,
            refill_per_sec: 0.001,
            max_per_endpoint: 100,
            per_minute_limit: 100,
            ..Default::default()
        });
        assert!(limiter.admit("quote").await.is_ok());
        assert!(limiter.admit("quote").await.is_err());
    }

    #[tokio::test]
    async fn sliding_window_rejects_after_per_minute_limit() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            per_minute_limit: 2,
            max_per_endpoint: 100,
            bucket_capacity: 100,
            refill_per_sec: 1000.0,
            ..Default::default()
        });
        assert!(limiter.admit("quote").await.is_ok());
        assert!(limiter.admit("quote").await.is_ok());
        assert!(limiter.admit("quote").await.is_err());
    }

    #[tokio::test]
    async fn emits_admitted_then_rejected_events() {
        use crate::events::FnListener;
        use std::sync::atomic::AtomicU32;

        let admitted = Arc::new(AtomicU32::new(0));
        let rejected = Arc::new(AtomicU32::new(0));
        let a = Arc::clone(&admitted);
        let r = Arc::clone(&rejected);
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_per_endpoint: 1,
            ..Default::default()
        })
        .with_listener(FnListener::new(move |event: &RateLimiterEvent| match event {
            RateLimiterEvent::Admitted { .. } => {
                a.fetch_add(1, Ordering::SeqCst);
            }
            RateLimiterEvent::Rejected { .. } => {
                r.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let _g = limiter.admit("quote").await.unwrap();
        assert!(limiter.admit("quote").await.is_err());
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
        assert_eq!(rejected.load(Ordering::SeqCst), 1);
    }
}
