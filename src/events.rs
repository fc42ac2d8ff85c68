//! Shared observability primitives used by every pipeline component.
//!
//! Each component defines its own event enum (`CacheEvent`, `RateLimiterEvent`,
//! `CircuitBreakerEvent`, `RetryEvent`) and reuses [`EventListeners`] to dispatch it to zero
//! or more registered listeners.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Marker trait for pipeline event types.
pub trait ResilienceEvent: std::fmt::Debug + Send + Sync {
    /// Short machine-readable name for the event variant, used in metrics labels.
    fn event_type(&self) -> &'static str;
}

/// Something that wants to observe events of type `E`.
pub trait EventListener<E>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// A closure-backed [`EventListener`].
pub struct FnListener<E, F> {
    f: F,
    _marker: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: 'static,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event);
    }
}

/// A collection of listeners for events of type `E`.
///
/// A listener that panics is caught and logged rather than allowed to unwind into the
/// pipeline's own control flow — a misbehaving `on_hit` callback must never take down a
/// cache lookup.
#[derive(Clone)]
pub struct EventListeners<E> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E> EventListeners<E>
where
    E: ResilienceEvent + 'static,
{
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add(&mut self, listener: impl EventListener<E> + 'static) {
        self.listeners.push(Arc::new(listener));
    }

    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let result = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            if result.is_err() {
                #[cfg(feature = "metrics")]
                {
                    metrics::counter!("resilient_client_listener_panics_total", "event" => event.event_type()).increment(1);
                }
                tracing::warn!(
                    event = event.event_type(),
                    "event listener panicked; event delivery to it was skipped"
                );
            }
        }
    }
}

impl<E> Default for EventListeners<E>
where
    E: ResilienceEvent + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
