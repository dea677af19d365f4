//! Event handler registry and scoped subscriptions.
//!
//! Handlers are keyed by event name. Dispatch snapshots the matching handlers
//! and releases the registry lock before invoking them, so a handler may
//! register or unregister listeners without deadlocking.

#[cfg(test)]
#[path = "listeners_test.rs"]
mod listeners_test;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;

/// Callback invoked with the payload of a matching event.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifies one registered handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    by_event: HashMap<String, Vec<(HandlerId, Handler)>>,
}

impl Listeners {
    pub(crate) fn add(&mut self, event: &str, handler: Handler) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.by_event.entry(event.to_owned()).or_default().push((id, handler));
        id
    }

    pub(crate) fn remove(&mut self, event: &str, id: HandlerId) -> bool {
        let Some(handlers) = self.by_event.get_mut(event) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            self.by_event.remove(event);
        }
        removed
    }

    pub(crate) fn handlers_for(&self, event: &str) -> Vec<Handler> {
        self.by_event
            .get(event)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, event: &str) -> usize {
        self.by_event.get(event).map_or(0, Vec::len)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cleanup handle returned by `ConnectionManager::on`.
///
/// Dropping the subscription (or calling [`Subscription::cancel`]) unregisters
/// the handler, so a view that holds its subscriptions for its own lifetime
/// can never leak handlers past unmount.
#[must_use = "dropping a Subscription immediately unregisters its handler"]
pub struct Subscription {
    event: String,
    id: HandlerId,
    registry: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub(crate) fn new(event: &str, id: HandlerId, registry: &Arc<Mutex<Listeners>>) -> Self {
        Self { event: event.to_owned(), id, registry: Arc::downgrade(registry) }
    }

    #[must_use]
    pub fn id(&self) -> HandlerId {
        self.id
    }

    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Unregister now. Equivalent to dropping the handle.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(&self.event, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
