//! Retry policy: error-classification-driven delay on top of a [`BackoffStrategy`]. The
//! retry loop itself is a free function over `produce: impl Fn() -> Future`.

use crate::error::{AttemptRecord, ClassifiedError, ErrorKind};
use crate::events::{EventListeners, ResilienceEvent};
use crate::retry::backoff::{apply_jitter, BackoffStrategy};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub enum RetryEvent {
    Retrying { attempt: u32 },
    GaveUp { attempt: u32 },
}

impl ResilienceEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retrying { .. } => "retrying",
            RetryEvent::GaveUp { .. } => "gave_up",
        }
    }
}

/// Applies the error-kind-sensitive delay adjustment table (SPEC_FULL §4.4).
fn adjust_for_error(base: Duration, max_delay: Duration, err: &ClassifiedError) -> Duration {
    match err.kind {
        ErrorKind::RateLimit => match err.retry_after {
            Some(retry_after) => base.max(retry_after),
            None => base.mul_f64(2.0).min(max_delay),
        },
        ErrorKind::CookieSession => base.mul_f64(0.5).min(max_delay),
        ErrorKind::Server if err.is_transient_server() => base.mul_f64(1.5).min(max_delay),
        _ => base,
    }
}

/// Configuration for [`retry_with_policy`].
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub strategy: BackoffStrategy,
    pub max_delay: Duration,
    pub jitter: bool,
    /// Called with `(err, attempt)` before sleeping and retrying.
    pub on_retry: Option<Arc<dyn Fn(&ClassifiedError, u32) + Send + Sync>>,
    /// Called with `(err, attempt)` on terminal failure.
    pub on_give_up: Option<Arc<dyn Fn(&ClassifiedError, u32) + Send + Sync>>,
    /// Extra predicate to force-skip retrying a classified error even if its kind is
    /// otherwise retryable.
    pub skip_retry: Option<Arc<dyn Fn(&ClassifiedError) -> bool + Send + Sync>>,
    pub events: EventListeners<RetryEvent>,
}

impl RetryPolicy {
    pub fn new(strategy: BackoffStrategy, max_retries: u32, max_delay: Duration) -> Self {
        Self {
            max_retries,
            strategy,
            max_delay,
            jitter: true,
            on_retry: None,
            on_give_up: None,
            skip_retry: None,
            events: EventListeners::new(),
        }
    }

    pub fn with_listener(mut self, listener: impl crate::events::EventListener<RetryEvent> + 'static) -> Self {
        self.events.add(listener);
        self
    }

    fn should_retry(&self, err: &ClassifiedError) -> bool {
        if !err.is_retryable() {
            return false;
        }
        if let Some(predicate) = &self.skip_retry {
            if predicate(err) {
                return false;
            }
        }
        true
    }

    fn delay_for(&self, attempt: u32, err: &ClassifiedError) -> Duration {
        let base = self.strategy.base_delay(attempt, self.max_delay);
        let adjusted = adjust_for_error(base, self.max_delay, err);
        if self.jitter {
            apply_jitter(adjusted)
        } else {
            adjusted
        }
    }
}

/// Why the retry loop gave up.
#[derive(Debug, Clone)]
pub enum RetryFailure {
    /// The error wasn't retryable, or `skip_retry` vetoed it — propagated as-is, not wrapped
    /// in `MaxRetriesExceeded` (SPEC_FULL §4.4 "Not retryable → propagate").
    NotRetryable(ClassifiedError),
    /// The retry budget was exhausted.
    Exhausted(Vec<AttemptRecord>),
}

/// Runs `produce` under `policy`, retrying on retryable classified failures. `classify` maps
/// the raw error from `produce` into a [`ClassifiedError`].
pub async fn retry_with_policy<F, Fut, T, Raw>(
    policy: &RetryPolicy,
    mut produce: F,
    classify: impl Fn(&Raw) -> ClassifiedError,
) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Raw>>,
{
    let mut history = Vec::new();
    for attempt in 0..=policy.max_retries {
        match produce().await {
            Ok(value) => return Ok(value),
            Err(raw) => {
                let classified = classify(&raw);

                if !policy.should_retry(&classified) {
                    if let Some(on_give_up) = &policy.on_give_up {
                        on_give_up(&classified, attempt);
                    }
                    policy.events.emit(&RetryEvent::GaveUp { attempt });
                    return Err(RetryFailure::NotRetryable(classified));
                }

                if attempt >= policy.max_retries {
                    if let Some(on_give_up) = &policy.on_give_up {
                        on_give_up(&classified, attempt);
                    }
                    policy.events.emit(&RetryEvent::GaveUp { attempt });
                    history.push(AttemptRecord {
                        attempt,
                        delay: Duration::ZERO,
                        error: classified,
                        timestamp: Instant::now(),
                    });
                    return Err(RetryFailure::Exhausted(history));
                }

                let delay = policy.delay_for(attempt + 1, &classified);
                if let Some(on_retry) = &policy.on_retry {
                    on_retry(&classified, attempt);
                }
                policy.events.emit(&RetryEvent::Retrying { attempt });
                history.push(AttemptRecord {
                    attempt,
                    delay,
                    error: classified,
                    timestamp: Instant::now(),
                });
                tokio::time::sleep(delay).await;
            }
        }
    }
    unreachable!("loop always returns via success or exhaustion");
}
