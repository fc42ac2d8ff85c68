//! Per-minute and per-hour sliding-window request trackers: each window is a fixed-size ring
//! of per-bucket counters keyed by `now / bucket_width`, with stale buckets zeroed as the
//! clock advances past them instead of being pruned one entry at a time.

use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

struct Ring {
    buckets: Vec<u64>,
    bucket_width_ms: u64,
    bucket_index: Vec<u64>,
}

impl Ring {
    fn new(num_buckets: usize, bucket_width_ms: u64) -> Self {
        Self {
            buckets: vec![0; num_buckets],
            bucket_width_ms,
            bucket_index: vec![0; num_buckets],
        }
    }

    fn slot(&self, now_ms: u64) -> usize {
        let bucket = now_ms / self.bucket_width_ms;
        (bucket as usize) % self.buckets.len()
    }

    fn record(&mut self, now_ms: u64) {
        let bucket = now_ms / self.bucket_width_ms;
        let slot = self.slot(now_ms);
        if self.bucket_index[slot] != bucket {
            self.buckets[slot] = 0;
            self.bucket_index[slot] = bucket;
        }
        self.buckets[slot] += 1;
    }

    fn count(&self, now_ms: u64) -> u64 {
        let current_bucket = now_ms / self.bucket_width_ms;
        let span_buckets = self.buckets.len() as u64;
        self.buckets
            .iter()
            .zip(self.bucket_index.iter())
            .filter(|(_, &idx)| idx > current_bucket.saturating_sub(span_buckets) && idx <= current_bucket)
            .map(|(count, _)| *count)
            .sum()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

/// Tracks request counts over a trailing minute and a trailing hour for one endpoint.
pub struct SlidingWindow {
    minute: Mutex<Ring>,
    hour: Mutex<Ring>,
    per_minute_limit: u64,
    per_hour_limit: u64,
}

impl SlidingWindow {
    pub fn new(per_minute_limit: u64, per_hour_limit: u64) -> Self {
        Self {
            // 60 one-second buckets covers a trailing minute.
            minute: Mutex::new(Ring::new(60, 1_000)),
            // 60 one-minute buckets covers a trailing hour.
            hour: Mutex::new(Ring::new(60, 60_000)),
            per_minute_limit,
            per_hour_limit,
        }
    }

    /// Records the request and reports whether either window's limit was exceeded by it.
    pub fn record_and_check(&self) -> WindowCheck {
        let now = now_ms();
        self.minute.lock().record(now);
        self.hour.lock().record(now);

        let minute_count = self.minute.lock().count(now);
        let hour_count = self.hour.lock().count(now);

        WindowCheck {
            minute_count,
            hour_count,
            minute_exceeded: minute_count > self.per_minute_limit,
            hour_exceeded: hour_count > self.per_hour_limit,
        }
    }

    pub fn minute_count(&self) -> u64 {
        self.minute.lock().count(now_ms())
    }

    pub fn hour_count(&self) -> u64 {
        self.hour.lock().count(now_ms())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WindowCheck {
    pub minute_count: u64,
    pub hour_count: u64,
    pub minute_exceeded: bool,
    pub hour_exceeded: bool,
}

impl WindowCheck {
    pub fn exceeded(&self) -> bool {
        self.minute_exceeded || self.hour_exceeded
    }
}
