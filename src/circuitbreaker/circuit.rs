//! Three-state circuit breaker with a rolling failure-count window.
//!
//! State is mirrored in a lock-free `Arc<AtomicU8>` for cheap reads. The gating predicate
//! uses an absolute failure *count* within `monitoring_window_ms` (SPEC_FULL §4.3) rather
//! than a failure rate over a minimum-calls volume floor, since the threshold table names
//! `threshold_failures`, not a rate.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CircuitTransition {
    Opened,
    HalfOpened,
    Closed,
}

struct Inner {
    state: CircuitState,
    failures: Vec<Instant>,
    half_open_successes: u64,
    opened_at: Option<Instant>,
    last_transition: Instant,
}

/// Configuration for one [`Circuit`] (one per endpoint).
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    pub threshold_failures: usize,
    pub threshold_successes: u64,
    pub monitoring_window: Duration,
    pub reset_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            threshold_failures: 5,
            threshold_successes: 2,
            monitoring_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-endpoint circuit breaker. `state_sync` gives a lock-free snapshot for metrics/fast
/// rejection paths; the authoritative state transitions happen under `inner`'s async lock.
pub struct Circuit {
    config: CircuitConfig,
    inner: Mutex<Inner>,
    state_atomic: Arc<AtomicU8>,
    failure_count: AtomicU64,
    success_count: AtomicU64,
}

impl Circuit {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: Vec::new(),
                half_open_successes: 0,
                opened_at: None,
                last_transition: Instant::now(),
            }),
            state_atomic: Arc::new(AtomicU8::new(CircuitState::Closed as u8)),
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
        }
    }

    /// Lock-free snapshot, safe to call from a hot path that only needs to fast-reject.
    pub fn state_sync(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(Ordering::Acquire))
    }

    /// Call before attempting a call. Returns `Err` if the call should be rejected; may
    /// transition OPEN → HALF_OPEN if `reset_timeout` has elapsed.
    pub async fn permit(&self) -> Result<(), ()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or_else(Instant::now);
                if opened_at.elapsed() >= self.config.reset_timeout {
                    self.transition_to(&mut inner, CircuitState::HalfOpen);
                    Ok(())
                } else {
                    Err(())
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        self.success_count.fetch_add(1, Ordering::Relaxed);
        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.threshold_successes {
                    self.transition_to(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        match inner.state {
            CircuitState::HalfOpen => {
                self.transition_to(&mut inner, CircuitState::Open);
            }
            CircuitState::Closed => {
                inner.failures.push(now);
                self.prune_window(&mut inner, now);
                if inner.failures.len() >= self.config.threshold_failures {
                    self.transition_to(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn prune_window(&self, inner: &mut Inner, now: Instant) {
        let window = self.config.monitoring_window;
        inner.failures.retain(|t| now.duration_since(*t) <= window);
    }

    fn transition_to(&self, inner: &mut Inner, next: CircuitState) {
        inner.state = next;
        inner.last_transition = Instant::now();
        self.state_atomic.store(next as u8, Ordering::Release);
        match next {
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                inner.failures.clear();
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes = 0;
            }
            CircuitState::Closed => {
                inner.failures.clear();
                inner.half_open_successes = 0;
                inner.opened_at = None;
            }
        }
    }

    pub async fn failure_window_len(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        self.prune_window(&mut inner, now);
        inner.failures.len()
    }

    pub async fn time_since_last_transition(&self) -> Duration {
        self.inner.lock().await.last_transition.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: usize) -> CircuitConfig {
        CircuitConfig {
            threshold_failures: threshold,
            threshold_successes: 2,
            monitoring_window: Duration::from_secs(60),
            reset_timeout: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let circuit = Circuit::new(config(3));
        for _ in 0..3 {
            circuit.record_failure().await;
        }
        assert_eq!(circuit.state_sync(), CircuitState::Open);
        assert!(circuit.permit().await.is_err());
    }

    #[tokio::test]
    async fn half_opens_after_reset_timeout_then_closes_on_successes() {
        let circuit = Circuit::new(config(1));
        circuit.record_failure().await;
        assert_eq!(circuit.state_sync(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(circuit.permit().await.is_ok());
        assert_eq!(circuit.state_sync(), CircuitState::HalfOpen);

        circuit.record_success().await;
        circuit.record_success().await;
        assert_eq!(circuit.state_sync(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_immediately() {
        let circuit = Circuit::new(config(1));
        circuit.record_failure().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        circuit.permit().await.unwrap();
        assert_eq!(circuit.state_sync(), CircuitState::HalfOpen);

        circuit.record_failure().await;
        assert_eq!(circuit.state_sync(), CircuitState::Open);
    }

    #[tokio::test]
    async fn failures_outside_window_are_pruned() {
        let mut cfg = config(2);
        cfg.monitoring_window = Duration::from_millis(10);
        let circuit = Circuit::new(cfg);
        circuit.record_failure().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        circuit.record_failure().await;
        assert_eq!(circuit.state_sync(), CircuitState::Closed);
        assert_eq!(circuit.failure_window_len().await, 1);
    }
}
