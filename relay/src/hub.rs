//! Registry of connected sessions.
//!
//! Each session registers a bounded sender for outgoing frames. Broadcast is
//! best effort: a session whose queue is full or closed is skipped.

#[cfg(test)]
#[path = "hub_test.rs"]
mod hub_test;

use std::collections::HashMap;
use std::sync::Arc;

use frames::Frame;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

/// Outgoing queue depth per session.
pub const CLIENT_QUEUE_CAPACITY: usize = 256;

/// Shared relay state, injected into handlers via the `State` extractor.
#[derive(Clone, Default)]
pub struct Hub {
    clients: Arc<RwLock<HashMap<Uuid, mpsc::Sender<Frame>>>>,
}

impl Hub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, client_id: Uuid, tx: mpsc::Sender<Frame>) {
        self.clients.write().await.insert(client_id, tx);
    }

    pub async fn part(&self, client_id: Uuid) -> bool {
        self.clients.write().await.remove(&client_id).is_some()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Queue `frame` for every session except `exclude`. Returns how many
    /// sessions accepted it.
    pub async fn broadcast(&self, frame: &Frame, exclude: Option<Uuid>) -> usize {
        let clients = self.clients.read().await;
        clients
            .iter()
            .filter(|(client_id, _)| exclude != Some(**client_id))
            .filter(|(_, tx)| tx.try_send(frame.clone()).is_ok())
            .count()
    }
}
