//! AIMD-style adaptive throttling: back off proactively before the upstream's hard limit
//! bites, ramp back up slowly once things are quiet.
//!
//! Multiplicative decrease by a fixed fraction on a warning signal, additive increase after a
//! run of consecutive successes, clamped to `[min_limit, max_limit]`.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const DECREASE_FACTOR: f64 = 0.9;
const INCREASE_FACTOR: f64 = 1.1;
const SUCCESSES_BEFORE_INCREASE: u64 = 5;
/// Remaining-capacity fraction below which the controller treats the endpoint as "close to
/// the upstream limit" and decreases the effective limit.
const LOW_HEADROOM_FRACTION: f64 = 0.2;

/// Adaptive effective-limit controller layered on top of a fixed configured limit.
pub struct AdaptiveThrottle {
    min_limit: u32,
    max_limit: u32,
    current_limit: AtomicU32,
    consecutive_successes: AtomicU64,
    /// Last observed headroom fraction (remaining / limit) relative to this controller's own
    /// `current_limit`, used by the predictive admission check. Defaults to full headroom
    /// until the first real observation arrives.
    remaining_fraction_bits: AtomicU64,
}

impl AdaptiveThrottle {
    pub fn new(initial_limit: u32, min_limit: u32, max_limit: u32) -> Self {
        Self {
            min_limit,
            max_limit,
            current_limit: AtomicU32::new(initial_limit.clamp(min_limit, max_limit)),
            consecutive_successes: AtomicU64::new(0),
            remaining_fraction_bits: AtomicU64::new(1.0_f64.to_bits()),
        }
    }

    pub fn current_limit(&self) -> u32 {
        self.current_limit.load(Ordering::Relaxed)
    }

    /// The last observed headroom fraction relative to this controller's own `current_limit`
    /// (SPEC_FULL §4.2 predictive check: `u = 1 − (adaptive.remaining / adaptive.current_limit)`).
    pub fn remaining_fraction(&self) -> f64 {
        f64::from_bits(self.remaining_fraction_bits.load(Ordering::Relaxed))
    }

    /// Call after a successful request with the endpoint's remaining headroom (tokens or
    /// window slots left) relative to its currently configured limit. Decreases the limit
    /// when headroom is low; after enough consecutive calls without a decrease, increases it.
    pub fn record_outcome(&self, remaining_fraction: f64) {
        self.remaining_fraction_bits
            .store(remaining_fraction.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);

        if remaining_fraction < LOW_HEADROOM_FRACTION {
            self.decrease();
            self.consecutive_successes.store(0, Ordering::Relaxed);
            return;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= SUCCESSES_BEFORE_INCREASE {
            self.increase();
            self.consecutive_successes.store(0, Ordering::Relaxed);
        }
    }

    /// Call on a rejection or upstream rate-limit signal: always decreases, regardless of the
    /// success streak.
    pub fn record_rejection(&self) {
        self.remaining_fraction_bits.store(0.0_f64.to_bits(), Ordering::Relaxed);
        self.decrease();
        self.consecutive_successes.store(0, Ordering::Relaxed);
    }

    fn decrease(&self) {
        self.current_limit
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                let next = (current as f64 * DECREASE_FACTOR) as u32;
                Some(next.max(self.min_limit))
            })
            .ok();
    }

    fn increase(&self) {
        self.current_limit
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                let next = ((current as f64 * INCREASE_FACTOR) as u32).max(current + 1);
                Some(next.min(self.max_limit))
            })
            .ok();
    }
}
