//! Shared notification connection.
//!
//! The `ConnectionManager` owns the single transport to the notification
//! server: connection, reconnection with exponential backoff, inbound event
//! dispatch, and outbound emits. It is a cheap cloneable handle; one instance
//! is created per session and passed to every view that needs live deltas.
//!
//! LIFECYCLE
//! =========
//! `Disconnected → Connecting → Connected`. A transport drop moves to
//! `Reconnecting` and retries with `min(base * 2^attempt, max)` delays until
//! `max_attempts` reconnects have failed, which ends in `Disconnected` until
//! `connect()` is called again. `disconnect()` cancels the supervisor task,
//! which also cancels any pending reconnect timer.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures never escape the manager. They are recorded in the
//! status `last_error`, logged, and delivered to lifecycle listeners.

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use frames::{Frame, Status};
use futures::{FutureExt, SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::listeners::{HandlerId, Listeners, Subscription, lock};
use super::transport::{Connector, Transport, TransportError, WsConnector};
use crate::config::SyncConfig;

/// Lifecycle events delivered to listeners. They are observed locally and
/// never sent over the wire.
pub mod lifecycle {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const CONNECT_ERROR: &str = "connect_error";
    pub const RECONNECT: &str = "reconnect";
    pub const RECONNECT_ATTEMPT: &str = "reconnect_attempt";
    pub const RECONNECT_ERROR: &str = "reconnect_error";
    pub const RECONNECT_FAILED: &str = "reconnect_failed";
}

/// Reason reported with `disconnect` when the client closed the connection.
pub const CLIENT_DISCONNECT_REASON: &str = "io client disconnect";

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport and no reconnect pending.
    #[default]
    Disconnected,
    /// First connect attempt in progress.
    Connecting,
    /// Transport is open.
    Connected,
    /// Transport dropped; retrying with backoff.
    Reconnecting,
}

/// Observable snapshot of the connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Most recent transport error, cleared on successful connect.
    pub last_error: Option<String>,
    /// Reconnect attempts spent since the last successful connect.
    pub attempt: u32,
}

impl ConnectionStatus {
    #[must_use]
    pub fn connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Options the transport supervisor runs with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Start connecting as soon as the manager is constructed.
    pub auto_connect: bool,
    /// Retry after drops and failed attempts.
    pub reconnection: bool,
    pub backoff: Backoff,
    /// Deadline for a single connect attempt.
    pub timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_connect: true,
            reconnection: true,
            backoff: Backoff::default(),
            timeout: Duration::from_secs(20),
        }
    }
}

/// Invoked once with the server's reply to an emitted event.
pub type AckCallback = Box<dyn FnOnce(Value) + Send>;

/// Handle to the session-wide notification connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    options: ConnectionOptions,
    connector: Arc<dyn Connector>,
    listeners: Arc<Mutex<Listeners>>,
    status: watch::Sender<ConnectionStatus>,
    inner: Mutex<Inner>,
    wake: Notify,
}

#[derive(Default)]
struct Inner {
    /// Bumped by every `connect` that starts a supervisor and every
    /// `disconnect`; a supervisor only touches state for its own generation.
    generation: u64,
    supervisor: Option<JoinHandle<()>>,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    pending_acks: HashMap<String, AckCallback>,
    /// Set only while the supervisor sleeps between attempts. `wake` is
    /// signalled only then, so no permit survives into a later wait.
    backing_off: bool,
}

impl ConnectionManager {
    /// Create a manager. With `auto_connect` set this starts connecting right
    /// away.
    ///
    /// # Panics
    ///
    /// Panics if `auto_connect` is set and no tokio runtime is running.
    pub fn new(options: ConnectionOptions, connector: impl Connector) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        let manager = Self {
            shared: Arc::new(Shared {
                options,
                connector: Arc::new(connector),
                listeners: Arc::new(Mutex::new(Listeners::default())),
                status,
                inner: Mutex::new(Inner::default()),
                wake: Notify::new(),
            }),
        };
        if options.auto_connect {
            manager.connect();
        }
        manager
    }

    /// Create a manager speaking WebSocket to `config.socket_url`.
    ///
    /// # Panics
    ///
    /// Panics if `config.auto_connect` is set and no tokio runtime is running.
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.connection_options(), WsConnector::new(config.socket_url.clone()))
    }

    /// Start connecting, or hurry up a pending reconnect. Idempotent.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn connect(&self) {
        let mut inner = lock(&self.shared.inner);
        if let Some(handle) = &inner.supervisor
            && !handle.is_finished()
        {
            match self.shared.status.borrow().state {
                ConnectionState::Connecting | ConnectionState::Connected => return,
                ConnectionState::Reconnecting => {
                    if inner.backing_off {
                        debug!("connect: waking pending reconnect");
                        self.shared.wake.notify_one();
                    }
                    return;
                }
                ConnectionState::Disconnected => {}
            }
        }
        if let Some(stale) = inner.supervisor.take() {
            stale.abort();
        }
        inner.backing_off = false;

        inner.generation += 1;
        let generation = inner.generation;
        self.shared.status.send_modify(|s| {
            s.state = ConnectionState::Connecting;
            s.attempt = 0;
        });
        inner.supervisor = Some(tokio::spawn(supervise(Arc::clone(&self.shared), generation)));
    }

    /// Tear down the transport and cancel any pending reconnect. Safe to call
    /// when already disconnected.
    pub fn disconnect(&self) {
        let (handle, previous) = {
            let mut inner = lock(&self.shared.inner);
            inner.generation += 1;
            inner.outbound = None;
            inner.pending_acks.clear();
            inner.backing_off = false;
            let previous = self.shared.status.borrow().state;
            self.shared.status.send_modify(|s| {
                s.state = ConnectionState::Disconnected;
                s.attempt = 0;
            });
            (inner.supervisor.take(), previous)
        };

        if let Some(handle) = handle {
            handle.abort();
        }
        if previous == ConnectionState::Connected {
            info!("notification channel disconnected by client");
            self.shared.dispatch(lifecycle::DISCONNECT, &json!(CLIENT_DISCONNECT_REASON));
        }
    }

    /// Send `payload` tagged with `event`, only while connected.
    ///
    /// Returns `false` when the frame was dropped. Dropped emits are not
    /// queued or retried.
    pub fn emit(&self, event: &str, payload: Value, ack: Option<AckCallback>) -> bool {
        let frame = Frame::event(event, payload);
        let mut inner = lock(&self.shared.inner);
        let connected = self.shared.status.borrow().connected();
        let Some(tx) = inner.outbound.clone().filter(|_| connected) else {
            warn!(event, "emit dropped: notification channel not connected");
            return false;
        };

        let frame_id = frame.id.clone();
        if let Some(callback) = ack {
            inner.pending_acks.insert(frame_id.clone(), callback);
        }
        if tx.send(frame).is_err() {
            inner.pending_acks.remove(&frame_id);
            warn!(event, "emit dropped: transport closed");
            return false;
        }
        debug!(event, id = %frame_id, "emit");
        true
    }

    /// Register `handler` for `event`. The returned [`Subscription`]
    /// unregisters it when cancelled or dropped.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = lock(&self.shared.listeners).add(event, Arc::new(handler));
        Subscription::new(event, id, &self.shared.listeners)
    }

    /// Unregister a handler by id. Returns whether it was registered.
    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        lock(&self.shared.listeners).remove(event, id)
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        lock(&self.shared.listeners).count(event)
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.status.borrow().connected()
    }

    /// Receiver that observes every status change.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Wait until connected or until `timeout` elapses.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.watch_status();
        let waited = tokio::time::timeout(timeout, rx.wait_for(ConnectionStatus::connected)).await;
        matches!(waited, Ok(Ok(_)))
    }

    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.shared.options
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &*self.shared.status.borrow())
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// SUPERVISOR
// =============================================================================

impl Shared {
    fn dispatch(&self, event: &str, payload: &Value) {
        let handlers = lock(&self.listeners).handlers_for(event);
        for handler in handlers {
            handler(payload);
        }
    }

    /// Apply `f` to the status if `generation` is still current.
    fn update_status(&self, generation: u64, f: impl FnOnce(&mut ConnectionStatus)) -> bool {
        let inner = lock(&self.inner);
        if inner.generation != generation {
            return false;
        }
        self.status.send_modify(f);
        true
    }

    /// Enter the backoff wait. Drops any permit left by an aborted
    /// generation before arming the flag.
    fn begin_backoff(&self, generation: u64) -> bool {
        let mut inner = lock(&self.inner);
        if inner.generation != generation {
            return false;
        }
        self.drain_wake();
        inner.backing_off = true;
        self.status.send_modify(|s| s.state = ConnectionState::Reconnecting);
        true
    }

    /// Leave the backoff wait. A wake that raced the timer is discarded.
    fn end_backoff(&self, generation: u64) {
        let mut inner = lock(&self.inner);
        if inner.generation == generation {
            inner.backing_off = false;
        }
        self.drain_wake();
    }

    fn drain_wake(&self) {
        if self.wake.notified().now_or_never().is_some() {
            debug!("discarded stale reconnect wake");
        }
    }

    fn handle_inbound(&self, frame: Frame) {
        match frame.status {
            Status::Event => {
                debug!(event = %frame.event, "recv event");
                self.dispatch(&frame.event, &frame.data);
            }
            Status::Ack | Status::Error => {
                if frame.status == Status::Error {
                    warn!(event = %frame.event, data = %frame.data, "server rejected event");
                }
                let callback = frame
                    .parent_id
                    .as_deref()
                    .and_then(|parent| lock(&self.inner).pending_acks.remove(parent));
                if let Some(callback) = callback {
                    callback(frame.data);
                }
            }
        }
    }

    /// Pump one transport until it drops. Returns the drop reason, or `None`
    /// if the manager moved on to another generation meanwhile.
    async fn run_transport(&self, generation: u64, transport: Transport, reconnected_after: Option<u32>) -> Option<String> {
        let Transport { mut sink, mut stream } = transport;
        let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
        {
            let mut inner = lock(&self.inner);
            if inner.generation != generation {
                return None;
            }
            // Replacing the sender releases whatever transport came before.
            inner.outbound = Some(tx);
            inner.pending_acks.clear();
            self.status.send_modify(|s| {
                s.state = ConnectionState::Connected;
                s.attempt = 0;
                s.last_error = None;
            });
        }
        info!("notification channel connected");
        self.dispatch(lifecycle::CONNECT, &Value::Null);
        if let Some(attempts) = reconnected_after {
            self.dispatch(lifecycle::RECONNECT, &json!(attempts));
        }

        let reason = loop {
            tokio::select! {
                outbound = rx.recv() => {
                    let Some(frame) = outbound else {
                        break "outbound channel closed".to_owned();
                    };
                    if let Err(error) = sink.send(frame).await {
                        break error.to_string();
                    }
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(frame)) => self.handle_inbound(frame),
                    Some(Err(TransportError::Decode(error))) => {
                        warn!(error = %error, "dropping undecodable frame");
                    }
                    Some(Err(error)) => break error.to_string(),
                    None => break TransportError::Closed.to_string(),
                },
            }
        };

        {
            let mut inner = lock(&self.inner);
            if inner.generation != generation {
                return None;
            }
            inner.outbound = None;
            inner.pending_acks.clear();
            self.status.send_modify(|s| {
                s.state = ConnectionState::Reconnecting;
                s.last_error = Some(reason.clone());
            });
        }
        warn!(reason = %reason, "notification channel dropped");
        self.dispatch(lifecycle::DISCONNECT, &json!(reason));
        Some(reason)
    }

    fn give_up(&self, generation: u64, attempt: u32) {
        let mut inner = lock(&self.inner);
        if inner.generation != generation {
            return;
        }
        inner.supervisor = None;
        self.status.send_modify(|s| {
            s.state = ConnectionState::Disconnected;
            s.attempt = attempt;
        });
    }
}

/// Connect/reconnect loop for one generation.
async fn supervise(shared: Arc<Shared>, generation: u64) {
    let backoff = shared.options.backoff;
    let mut attempt: u32 = 0;
    let mut reconnecting = false;

    loop {
        if reconnecting {
            if !shared.update_status(generation, |s| {
                s.state = ConnectionState::Reconnecting;
                s.attempt = attempt;
            }) {
                return;
            }
            info!(attempt, "reconnect attempt");
            shared.dispatch(lifecycle::RECONNECT_ATTEMPT, &json!(attempt));
        }

        let timeout = shared.options.timeout;
        let result = tokio::time::timeout(timeout, shared.connector.connect())
            .await
            .unwrap_or(Err(TransportError::Timeout(timeout)));

        match result {
            Ok(transport) => {
                let reconnected_after = reconnecting.then_some(attempt);
                if shared.run_transport(generation, transport, reconnected_after).await.is_none() {
                    return;
                }
                attempt = 0;
                if !shared.options.reconnection {
                    shared.give_up(generation, attempt);
                    return;
                }
            }
            Err(error) => {
                let message = error.to_string();
                warn!(error = %message, attempt, "notification connect failed");
                if !shared.update_status(generation, |s| s.last_error = Some(message.clone())) {
                    return;
                }
                shared.dispatch(lifecycle::CONNECT_ERROR, &json!({ "message": message }));
                if reconnecting {
                    shared.dispatch(lifecycle::RECONNECT_ERROR, &json!({ "message": message }));
                }
                if !shared.options.reconnection {
                    shared.give_up(generation, attempt);
                    return;
                }
            }
        }

        if backoff.exhausted(attempt) {
            warn!(attempts = attempt, "giving up on notification channel");
            shared.give_up(generation, attempt);
            shared.dispatch(lifecycle::RECONNECT_FAILED, &Value::Null);
            return;
        }

        let delay = backoff.delay(attempt);
        attempt += 1;
        reconnecting = true;
        if !shared.begin_backoff(generation) {
            return;
        }
        debug!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), attempt, "reconnect scheduled");
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = shared.wake.notified() => {}
        }
        shared.end_backoff(generation);
    }
}
