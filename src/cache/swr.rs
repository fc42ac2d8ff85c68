//! Stale-while-revalidate coalescing.
//!
//! Ensures at most one background revalidation (and at most one coalesced miss-fetch) runs
//! per fingerprint at a time (§4.1 "Coalescing ... exactly one upstream call in flight per
//! fingerprint"). The first caller for a key becomes the leader and runs `produce`; everyone
//! else subscribes to the leader's outcome, success or failure, instead of re-producing.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;

type Outcome = Arc<OnceLock<Box<dyn Any + Send + Sync>>>;

struct Slot {
    sender: broadcast::Sender<()>,
    outcome: Outcome,
}

/// Tracks in-flight revalidations so concurrent `GetWithRevalidation` callers for the same
/// fingerprint share one upstream call instead of issuing one each.
pub(crate) struct PendingRevalidations {
    inner: Mutex<HashMap<String, Slot>>,
}

impl PendingRevalidations {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `Leader` if this caller should perform the revalidation, or `Follower` with a
    /// receiver that resolves once the leader's revalidation completes, plus the slot the
    /// leader will publish its outcome into.
    pub(crate) fn join(self: &Arc<Self>, key: &str) -> RevalidationRole {
        let mut guard = self.inner.lock();
        if let Some(slot) = guard.get(key) {
            return RevalidationRole::Follower(slot.sender.subscribe(), Arc::clone(&slot.outcome));
        }
        let (tx, _rx) = broadcast::channel(1);
        let outcome: Outcome = Arc::new(OnceLock::new());
        guard.insert(
            key.to_string(),
            Slot {
                sender: tx,
                outcome: Arc::clone(&outcome),
            },
        );
        RevalidationRole::Leader(LeaderGuard {
            registry: Arc::clone(self),
            key: key.to_string(),
            outcome,
        })
    }
}

pub(crate) enum RevalidationRole {
    Leader(LeaderGuard),
    Follower(broadcast::Receiver<()>, Outcome),
}

/// Held by the leader for the duration of its revalidation call. Dropping it (whether the
/// call succeeded, failed, or the leader's task was cancelled) always releases the slot and
/// wakes any followers.
pub(crate) struct LeaderGuard {
    registry: Arc<PendingRevalidations>,
    key: String,
    outcome: Outcome,
}

impl LeaderGuard {
    /// Publishes the leader's result so followers observe the same success or failure
    /// instead of becoming producers themselves. Must be called before the guard drops.
    pub(crate) fn publish<V, E>(&self, result: &Result<V, E>)
    where
        V: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        let _ = self.outcome.set(Box::new(result.clone()));
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if let Some(slot) = self.registry.inner.lock().remove(&self.key) {
            let _ = slot.sender.send(());
        }
    }
}
