//! Retry policy module: re-exports the backoff strategy, jitter, and the policy-driven retry
//! loop (SPEC_FULL §4.4).

mod backoff;
mod policy;

pub use backoff::{apply_jitter, BackoffStrategy, JITTER_FLOOR};
pub use policy::{retry_with_policy, RetryEvent, RetryFailure, RetryPolicy};
