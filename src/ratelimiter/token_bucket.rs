//! Token bucket admission control: a single lock guarding a float counter that is topped up
//! by elapsed-time-times-rate before each consume.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

struct State {
    tokens: f64,
    last_refill: Instant,
}

/// Classic token bucket: capacity `C`, refill rate `r` tokens/sec, atomic refill-then-consume
/// under one lock so concurrent callers never observe a torn refill.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<State>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec,
            state: Mutex::new(State {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Refills based on elapsed time, then attempts to consume one token. Returns `true` if
    /// the request is admitted.
    pub fn try_consume(&self) -> bool {
        self.try_consume_n(1.0)
    }

    pub fn try_consume_n(&self, n: f64) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
        state.tokens
    }

    /// Time until at least one token is available, `Duration::ZERO` if already available.
    pub fn time_until_available(&self) -> Duration {
        let available = self.available();
        if available >= 1.0 {
            return Duration::ZERO;
        }
        let deficit = 1.0 - available;
        Duration::from_secs_f64(deficit / self.refill_per_sec)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }
}
