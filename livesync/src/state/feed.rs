//! Bridge from the shared connection to a single-owner live list.
//!
//! Handlers run on the connection's task; they only parse the payload and
//! forward the delta over a channel, so the list itself is mutated by its
//! owner alone. Dropping the feed unregisters its handlers.

#[cfg(test)]
#[path = "feed_test.rs"]
mod feed_test;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::entity::{ChangeKind, Delta, Entity};
use super::live_list::LiveList;
use crate::net::connection::ConnectionManager;
use crate::net::listeners::Subscription;

pub struct DeltaFeed<E: Entity> {
    rx: mpsc::UnboundedReceiver<Delta<E>>,
    subscriptions: Vec<Subscription>,
}

impl<E: Entity> DeltaFeed<E> {
    /// Listen for `<kind>Created`, `<kind>Updated` and `<kind>Deleted`.
    #[must_use]
    pub fn subscribe(connection: &ConnectionManager) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = ChangeKind::ALL
            .into_iter()
            .map(|change| {
                let tx = tx.clone();
                let event = E::KIND.event_name(change);
                connection.on(&event, move |payload| match Delta::<E>::from_event(change, payload) {
                    Ok(delta) => {
                        if tx.send(delta).is_err() {
                            debug!(kind = %E::KIND, "delta feed closed; dropping delta");
                        }
                    }
                    Err(error) => {
                        warn!(kind = %E::KIND, ?change, error = %error, "skipping malformed delta");
                    }
                })
            })
            .collect();
        Self { rx, subscriptions }
    }

    /// Next delta. `None` once the connection manager is gone and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<Delta<E>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Delta<E>> {
        self.rx.try_recv().ok()
    }

    /// Apply every queued delta to `list`. Returns how many were applied.
    pub fn drain_into(&mut self, list: &mut LiveList<E>) -> usize {
        let mut applied = 0;
        while let Some(delta) = self.try_recv() {
            list.apply(delta);
            applied += 1;
        }
        applied
    }
}

impl<E: Entity> std::fmt::Debug for DeltaFeed<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaFeed")
            .field("kind", &E::KIND)
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}
