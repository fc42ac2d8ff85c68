//! Circuit breaker registry: one [`circuit::Circuit`] per endpoint, plus the lifecycle-hook
//! event system and optional fallback (SPEC_FULL §4.3).

mod circuit;

pub use circuit::{CircuitConfig, CircuitState};

use crate::error::ClassifiedError;
use crate::events::{EventListeners, ResilienceEvent};
use circuit::Circuit;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    Opened { endpoint: String },
    HalfOpened { endpoint: String },
    Closed { endpoint: String },
    CallRejected { endpoint: String },
}

impl ResilienceEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::Opened { .. } => "opened",
            CircuitBreakerEvent::HalfOpened { .. } => "half_opened",
            CircuitBreakerEvent::Closed { .. } => "closed",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
        }
    }
}

/// Rejected because the breaker for this endpoint is open.
#[derive(Debug, Clone, Copy)]
pub struct CircuitOpenError;

#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count_in_window: usize,
    pub time_since_last_transition: std::time::Duration,
}

pub struct CircuitBreaker<V> {
    config: CircuitConfig,
    circuits: Mutex<HashMap<String, Arc<Circuit>>>,
    events: EventListeners<CircuitBreakerEvent>,
    fallback: Option<Arc<dyn Fn(&ClassifiedError) -> V + Send + Sync>>,
}

impl<V> CircuitBreaker<V> {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
            events: EventListeners::new(),
            fallback: None,
        }
    }

    pub fn with_listener(mut self, listener: impl crate::events::EventListener<CircuitBreakerEvent> + 'static) -> Self {
        self.events.add(listener);
        self
    }

    /// Registers a fallback invoked in place of propagating a classified failure from the
    /// wrapped call. The failure is still recorded against the breaker (SPEC_FULL §4.3
    /// "Optional fallback").
    pub fn with_fallback(mut self, fallback: impl Fn(&ClassifiedError) -> V + Send + Sync + 'static) -> Self {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// Invokes the configured fallback, if any, for a classified failure from the wrapped
    /// call.
    pub fn fallback(&self, err: &ClassifiedError) -> Option<V> {
        self.fallback.as_ref().map(|f| f(err))
    }

    async fn circuit_for(&self, endpoint: &str) -> Arc<Circuit> {
        let mut guard = self.circuits.lock().await;
        guard
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(Circuit::new(self.config.clone())))
            .clone()
    }

    /// Checks admission for `endpoint`, transitioning OPEN → HALF_OPEN if the reset timeout
    /// has elapsed.
    pub async fn permit(&self, endpoint: &str) -> Result<CallToken, CircuitOpenError> {
        let circuit = self.circuit_for(endpoint).await;
        let before = circuit.state_sync();
        let result = circuit.permit().await;
        let after = circuit.state_sync();
        if before != after {
            self.emit_transition(endpoint, after);
        }
        match result {
            Ok(()) => Ok(CallToken {
                endpoint: endpoint.to_string(),
            }),
            Err(()) => {
                self.events.emit(&CircuitBreakerEvent::CallRejected {
                    endpoint: endpoint.to_string(),
                });
                Err(CircuitOpenError)
            }
        }
    }

    pub async fn record_success(&self, token: &CallToken) {
        let circuit = self.circuit_for(&token.endpoint).await;
        let before = circuit.state_sync();
        circuit.record_success().await;
        let after = circuit.state_sync();
        if before != after {
            self.emit_transition(&token.endpoint, after);
        }
    }

    pub async fn record_failure(&self, token: &CallToken) {
        let circuit = self.circuit_for(&token.endpoint).await;
        let before = circuit.state_sync();
        circuit.record_failure().await;
        let after = circuit.state_sync();
        if before != after {
            self.emit_transition(&token.endpoint, after);
        }
    }

    fn emit_transition(&self, endpoint: &str, state: CircuitState) {
        let event = match state {
            CircuitState::Open => CircuitBreakerEvent::Opened {
                endpoint: endpoint.to_string(),
            },
            CircuitState::HalfOpen => CircuitBreakerEvent::HalfOpened {
                endpoint: endpoint.to_string(),
            },
            CircuitState::Closed => CircuitBreakerEvent::Closed {
                endpoint: endpoint.to_string(),
            },
        };
        self.events.emit(&event);
    }

    pub async fn stats(&self, endpoint: &str) -> CircuitBreakerStats {
        let circuit = self.circuit_for(endpoint).await;
        CircuitBreakerStats {
            state: circuit.state_sync(),
            failure_count_in_window: circuit.failure_window_len().await,
            time_since_last_transition: circuit.time_since_last_transition().await,
        }
    }
}

/// Proof of an admitted call, required by `record_success`/`record_failure` so callers
/// cannot report an outcome for an endpoint they never got a permit for.
pub struct CallToken {
    endpoint: String,
}
