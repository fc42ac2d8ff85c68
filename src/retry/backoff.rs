//! Backoff delay strategies and decorrelated jitter (SPEC_FULL §4.4).

use rand::Rng;
use std::time::Duration;

/// The 100ms floor decorrelated jitter must never go below (SPEC_FULL §4.4, invariant).
pub const JITTER_FLOOR: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub enum BackoffStrategy {
    Exponential { initial: Duration, multiplier: f64 },
    Linear { initial: Duration, increment: Duration },
    Fixed { delay: Duration },
}

impl BackoffStrategy {
    /// `attempt` is 1-indexed (the first retry is attempt 1).
    pub fn base_delay(&self, attempt: u32, max_delay: Duration) -> Duration {
        let raw = match *self {
            BackoffStrategy::Exponential { initial, multiplier } => {
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                initial.mul_f64(factor)
            }
            BackoffStrategy::Linear { initial, increment } => {
                initial + increment.mul_f64(attempt.saturating_sub(1) as f64)
            }
            BackoffStrategy::Fixed { delay } => delay,
        };
        raw.min(max_delay)
    }
}

/// Additive decorrelated jitter at 25% amplitude, floored at [`JITTER_FLOOR`].
pub fn apply_jitter(delay: Duration) -> Duration {
    let mut rng = rand::rng();
    let sign: f64 = rng.random_range(-1.0..=1.0);
    let jittered_secs = delay.as_secs_f64() + sign * delay.as_secs_f64() * 0.25;
    Duration::from_secs_f64(jittered_secs.max(0.0)).max(JITTER_FLOOR)
}
