//! Pending-count observers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Callback invoked with the number of pending requests.
pub type PendingCountListener = Arc<dyn Fn(usize) + Send + Sync>;

type Listeners = RwLock<HashMap<u64, PendingCountListener>>;

/// Registry of pending-count listeners.
#[derive(Clone, Default)]
pub struct PendingCountNotifier {
    listeners: Arc<Listeners>,
    next_id: Arc<AtomicU64>,
}

impl PendingCountNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe(&self, listener: impl Fn(usize) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(listener));

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Invoke every registered listener with `count`.
    ///
    /// Listeners run outside the registry lock, so a listener may subscribe
    /// or unsubscribe without deadlocking.
    pub fn notify(&self, count: usize) {
        let snapshot: Vec<PendingCountListener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        tracing::debug!(
            "Notifying {} listener(s) of {count} pending request(s)",
            snapshot.len()
        );
        for listener in snapshot {
            listener(count);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Handle for a registered listener; unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
